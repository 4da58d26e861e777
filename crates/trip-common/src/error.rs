//! Error types shared across the trip archive crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid trip identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid processing status: {0}")]
    InvalidStatus(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommonError {
    pub fn invalid_identity(msg: impl Into<String>) -> Self {
        Self::InvalidIdentity(msg.into())
    }
}
