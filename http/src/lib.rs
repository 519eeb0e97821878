//! Optional HTTP endpoint reporting whether stats are still being pushed.

#[macro_use]
extern crate tracing;

pub mod error;
pub mod router;
mod status;

use error::AppError;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use router::{
    create_router,
    AppState,
};

/// Binds the status endpoint. Binding happens before the returned future is polled so a taken
/// port is reported at startup.
pub async fn bind(port: u16) -> Result<TcpListener, AppError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::Bind { addr, source })
}

/// Serves `state` on `listener` until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: AppState, shutdown: CancellationToken) -> Result<(), AppError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Push status endpoint listening on {addr}");
    }
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(AppError::Serve)
}
