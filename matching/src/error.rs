//! Error types for the matching engine

use thiserror::Error;

/// Result type for matching operations
pub type Result<T> = std::result::Result<T, Error>;

/// Matching errors
#[derive(Error, Debug)]
pub enum Error {
    /// Registry error (lifecycle rejection or storage failure)
    #[error("Registry error: {0}")]
    Registry(#[from] registry_core::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
