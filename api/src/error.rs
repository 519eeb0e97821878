use reqwest::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: StatusCode },
    #[error("{endpoint} rejected the credentials")]
    Unauthorized { endpoint: String },
    #[error("{endpoint} is rate limited")]
    RateLimited { endpoint: String },
    #[error("Undecodable payload from {endpoint}: {source}")]
    Payload {
        endpoint: String,
        #[source]
        source: PayloadError,
    },
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PayloadError {
    #[error("compressed payload lacks the `gz:` prefix")]
    MissingPrefix,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("corrupt gzip stream: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}
