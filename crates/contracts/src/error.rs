//! Layered error definitions, categorized by the component that raises them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WhiskerError {
    #[error("config error at '{field}': {message}")]
    Config { field: String, message: String },

    #[error("transport error on backend '{backend}': {message}")]
    Transport { backend: String, message: String },

    #[error("unknown client id: {0}")]
    UnknownClient(String),

    #[error("message log error: {message}")]
    MessageLog {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("message log header mismatch: expected {expected:#x}, found {found:#x}")]
    LogHeaderMismatch { expected: u64, found: u64 },

    #[error("resource path '{name}' escapes the resource directory")]
    PathEscape { name: String },

    #[error("unknown map: {0}")]
    UnknownMap(String),

    #[error("unknown vehicle: {0}")]
    UnknownVehicle(String),

    #[error("slam adapter error: {message}")]
    SlamAdapter { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl WhiskerError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn transport(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn message_log(message: impl Into<String>) -> Self {
        Self::MessageLog {
            message: message.into(),
            source: None,
        }
    }

    pub fn slam_adapter(message: impl Into<String>) -> Self {
        Self::SlamAdapter {
            message: message.into(),
        }
    }
}
