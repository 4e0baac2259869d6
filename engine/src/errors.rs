//! Error types for the execution engine

use thiserror::Error;

/// Main error type for the execution engine
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resolution error: {0}")]
    ResolutionError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    /// A prompt or response pattern did not show up in time.
    #[error("Pattern not detected: {0}")]
    PatternNotDetected(String),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Configuration transaction failed: {0}")]
    ConfigTransactionError(String),

    #[error("Topology error: {0}")]
    TopologyError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ExecError {
    fn from(err: anyhow::Error) -> Self {
        ExecError::Internal(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ExecError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ExecError::Timeout(err.to_string())
    }
}
