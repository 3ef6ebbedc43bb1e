use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unknown client id: {0}")]
    UnknownClient(String),

    #[error("backend '{backend}' failed: {message}")]
    Backend { backend: String, message: String },
}
