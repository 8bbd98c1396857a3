//! Error types for the context store

use thiserror::Error;

/// Result type alias for context store operations
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors that can occur in context store operations
///
/// `Usage` and `Unsupported` are caller mistakes and are raised before any
/// backend I/O. Everything else is an operational failure reported through
/// the async result of the operation.
#[derive(Error, Debug)]
pub enum ContextError {
    /// Caller violated an operation precondition
    #[error("Usage error: {0}")]
    Usage(String),

    /// Requested mode is not available for this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Store was used while no backend connection was open
    #[error("Context store is not connected")]
    NotConnected,

    /// Backend connection could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend rejected the query
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ContextError {
    /// Check if this error was raised synchronously for a caller mistake
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::Unsupported(_))
    }

    /// Check if this error means the backend could not be reached
    pub fn is_connectivity_error(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Connection(_))
    }

    /// Check if this is an operational failure from the backend side
    pub fn is_backend_error(&self) -> bool {
        !self.is_usage_error()
    }
}

#[cfg(feature = "persistence")]
impl From<sled::Error> for ContextError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io) => Self::Io(io),
            other => Self::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ContextError::Usage("no callback".into()).is_usage_error());
        assert!(ContextError::Unsupported("batch get".into()).is_usage_error());
        assert!(!ContextError::NotConnected.is_usage_error());

        assert!(ContextError::NotConnected.is_connectivity_error());
        assert!(ContextError::Connection("refused".into()).is_connectivity_error());
        assert!(!ContextError::InvalidQuery("bad".into()).is_connectivity_error());

        assert!(ContextError::InvalidQuery("bad".into()).is_backend_error());
        assert!(!ContextError::Usage("x".into()).is_backend_error());
    }
}
