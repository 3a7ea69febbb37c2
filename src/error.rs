//! Crate-level error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("{0}")]
    Other(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
