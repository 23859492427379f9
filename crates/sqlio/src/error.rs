//! Error types for sqlio
//!
//! Provides kind-based error classification so callers can branch on
//! [`ErrorCategory`] instead of matching messages:
//! - Retriable errors (connection, timeout)
//! - Non-retriable errors (mapping, binding, unsupported, merge)
//! - Cancellation, which is never swallowed

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for sqlio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error source
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection-related errors (retriable)
    Connection,
    /// Database returned an error
    Driver,
    /// Transaction framing errors
    Transaction,
    /// Timeout errors (retriable)
    Timeout,
    /// Invalid configuration
    Configuration,
    /// Operation not available in the dialect
    Unsupported,
    /// Column to field resolution failed
    Mapping,
    /// Value cannot be written into the output slice or a record field
    Binding,
    /// Identity reservation failed
    Sequencer,
    /// Merge diff or merge configuration error
    Merge,
    /// Caller's context was cancelled
    Cancelled,
    /// Unknown/other errors
    Other,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout)
    }
}

/// Main error type for sqlio
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Connection failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Statement execution failed in the driver
    #[error("driver error: {message}")]
    Driver {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// Transaction error
    #[error("transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Operation timed out
    #[error("timeout: {message}")]
    Timeout { message: String },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Unsupported operation for this dialect
    #[error("unsupported: {message}")]
    Unsupported { message: String },

    /// Column to field resolution failed
    #[error("mapping error: {message}")]
    Mapping { message: String },

    /// Value conversion failed
    #[error("binding error: {message}")]
    Binding { message: String },

    /// Identity reservation failed
    #[error("sequencer error: {message}")]
    Sequencer { message: String },

    /// Merge failed
    #[error("merge error: {message}")]
    Merge { message: String },

    /// Caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// An operation failed and so did the rollback that followed it
    #[error("{source}; rollback failed: {rollback}")]
    Rollback {
        source: Box<Error>,
        rollback: Box<Error>,
    },

    /// Error shared by every participant of a batch
    #[error(transparent)]
    Shared(Arc<Error>),

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Driver { .. } => ErrorCategory::Driver,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            Self::Mapping { .. } => ErrorCategory::Mapping,
            Self::Binding { .. } => ErrorCategory::Binding,
            Self::Sequencer { .. } => ErrorCategory::Sequencer,
            Self::Merge { .. } => ErrorCategory::Merge,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Rollback { source, .. } => source.category(),
            Self::Shared(inner) => inner.category(),
            Self::Internal { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Whether this error (or the error it wraps) is a cancellation
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.category() == ErrorCategory::Cancelled
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a driver error carrying the failing SQL
    pub fn driver_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a driver error wrapping the driver's own error
    pub fn driver_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Driver {
            message: message.into(),
            sql: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: None,
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a mapping error
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }

    /// Create a binding error
    pub fn binding(message: impl Into<String>) -> Self {
        Self::Binding {
            message: message.into(),
        }
    }

    /// Create a sequencer error
    pub fn sequencer(message: impl Into<String>) -> Self {
        Self::Sequencer {
            message: message.into(),
        }
    }

    /// Create a merge error
    pub fn merge(message: impl Into<String>) -> Self {
        Self::Merge {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Combine an operation error with the error of the rollback that followed it
    pub fn with_rollback(self, rollback: Error) -> Self {
        Self::Rollback {
            source: Box::new(self),
            rollback: Box::new(rollback),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Driver => write!(f, "driver"),
            Self::Transaction => write!(f, "transaction"),
            Self::Timeout => write!(f, "timeout"),
            Self::Configuration => write!(f, "configuration"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Mapping => write!(f, "mapping"),
            Self::Binding => write!(f, "binding"),
            Self::Sequencer => write!(f, "sequencer"),
            Self::Merge => write!(f, "merge"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retriable() {
        assert!(ErrorCategory::Connection.is_retriable());
        assert!(ErrorCategory::Timeout.is_retriable());

        assert!(!ErrorCategory::Mapping.is_retriable());
        assert!(!ErrorCategory::Sequencer.is_retriable());
        assert!(!ErrorCategory::Cancelled.is_retriable());
    }

    #[test]
    fn test_shared_error_keeps_category() {
        let err = Error::Shared(Arc::new(Error::Cancelled));
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "operation cancelled");
    }

    #[test]
    fn test_rollback_error_reports_both() {
        let err = Error::driver("duplicate key").with_rollback(Error::connection("gone"));
        assert_eq!(err.category(), ErrorCategory::Driver);
        let text = err.to_string();
        assert!(text.contains("duplicate key"));
        assert!(text.contains("gone"));
    }
}
