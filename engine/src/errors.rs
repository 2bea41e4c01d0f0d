//! Error types for the slipway engine

use thiserror::Error;

/// Main error type for the slipway engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source error: {0}")]
    SourceError(String),

    #[error("Build error: {0}")]
    BuildError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Transfer error: {0}")]
    TransferError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}
