//! Error types for the registry

use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Registry errors.
///
/// The first five variants are the caller-facing rejection taxonomy; the
/// rest are internal failures. Rejections are never retried by the
/// registry itself — the caller corrects and resubmits.
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced entity id does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller does not own or administer the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// State transition invalid given current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed or missing required fields
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// External gateway failure (payment verification)
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (guard poisoned, runtime shut down)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status the transport layer should map this error to.
    ///
    /// The registry exposes no HTTP surface itself; this keeps the
    /// mapping in one place for whichever gateway sits in front.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::Forbidden(_) => 403,
            Error::Conflict(_) => 400,
            Error::Unprocessable(_) => 422,
            Error::UpstreamUnavailable(_) => 502,
            _ => 500,
        }
    }

    /// Caller-facing response envelope for this error.
    ///
    /// Rejections expose their bare reason ("Slot not available");
    /// internal failures expose the classified form only.
    pub fn to_envelope(&self) -> serde_json::Value {
        let message = match self {
            Error::NotFound(m)
            | Error::Forbidden(m)
            | Error::Conflict(m)
            | Error::Unprocessable(m)
            | Error::UpstreamUnavailable(m) => m.clone(),
            other => other.to_string(),
        };
        serde_json::json!({
            "success": false,
            "message": message,
        })
    }

    /// Whether this is a caller-facing rejection rather than an
    /// internal failure
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::Forbidden(_)
                | Error::Conflict(_)
                | Error::Unprocessable(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::Forbidden("x".into()).status_code(), 403);
        assert_eq!(Error::Conflict("x".into()).status_code(), 400);
        assert_eq!(Error::Unprocessable("x".into()).status_code(), 422);
        assert_eq!(Error::UpstreamUnavailable("x".into()).status_code(), 502);
        assert_eq!(Error::Storage("x".into()).status_code(), 500);
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = Error::Conflict("Slot not available".into()).to_envelope();
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["message"], "Slot not available");
    }

    #[test]
    fn test_rejection_classification() {
        assert!(Error::Conflict("slot taken".into()).is_rejection());
        assert!(!Error::Storage("disk".into()).is_rejection());
        assert!(!Error::UpstreamUnavailable("gateway".into()).is_rejection());
    }
}
