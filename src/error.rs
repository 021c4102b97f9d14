use thiserror::Error;

use crate::storage::{StoreError, StoreOperation};

/// Result type for rate limit operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors that can occur while deciding on a request
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("invalid limit type: {0}")]
    InvalidLimitType(String),

    #[error("store error during {operation} on {key}: {source}")]
    Store {
        operation: StoreOperation,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("cancelled during {operation} on {key}: {source}")]
    Cancelled {
        operation: StoreOperation,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RateLimitError {
    /// Wrap a store failure with the operation and key it happened on.
    ///
    /// Cancellation and deadline expiry are kept apart from other store
    /// failures so callers can tell a slow client from a broken backend.
    pub fn from_store(operation: StoreOperation, key: &str, source: StoreError) -> Self {
        let key = key.to_string();
        if source.is_cancellation() {
            RateLimitError::Cancelled {
                operation,
                key,
                source,
            }
        } else {
            RateLimitError::Store {
                operation,
                key,
                source,
            }
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RateLimitError::InvalidLimitType(_) => "invalid_limit_type",
            RateLimitError::Store { .. } => "store",
            RateLimitError::Cancelled { .. } => "cancelled",
            RateLimitError::Config(_) => "config",
            RateLimitError::Io(_) => "io",
        }
    }
}

impl From<config::ConfigError> for RateLimitError {
    fn from(err: config::ConfigError) -> Self {
        RateLimitError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_wrapping() {
        let err = RateLimitError::from_store(
            StoreOperation::Increment,
            "rate_limit:ip:1.2.3.4",
            StoreError::Closed,
        );
        assert_eq!(err.kind(), "store");
        let msg = err.to_string();
        assert!(msg.contains("increment"));
        assert!(msg.contains("rate_limit:ip:1.2.3.4"));
    }

    #[test]
    fn test_cancellation_is_separate() {
        let err =
            RateLimitError::from_store(StoreOperation::Exists, "block:ip:x", StoreError::Cancelled);
        assert!(matches!(err, RateLimitError::Cancelled { .. }));

        let err = RateLimitError::from_store(
            StoreOperation::Set,
            "block:ip:x",
            StoreError::DeadlineExceeded,
        );
        assert_eq!(err.kind(), "cancelled");
    }
}
