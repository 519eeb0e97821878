use std::net::SocketAddr;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Serving the push status failed: {0}")]
    Serve(#[source] std::io::Error),
}
