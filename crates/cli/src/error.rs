//! Error types for CLI-level operations. Every crate below this one has
//! its own `thiserror` enum; here they collapse behind `anyhow::Error`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("no transport backend configured; set transport.routing_broker or transport.websocket")]
    NoTransportBackend,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
