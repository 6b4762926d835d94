//! Error taxonomy shared by every kubelink crate.
//!
//! Each failure surfaced to the tool layer is a single descriptive message
//! naming the failing precondition (cluster, namespace, pod, container).

use std::fmt;

use thiserror::Error;

/// A result type using `KubelinkError`.
pub type Result<T> = std::result::Result<T, KubelinkError>;

/// Errors that can occur while managing cluster sessions or executing
/// resource operations.
#[derive(Debug, Clone, Error)]
pub enum KubelinkError {
    /// Missing, unreadable or malformed connection descriptor.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unreachable cluster, authentication failure, or no cluster configured.
    #[error("connection error: {0}")]
    Connection(String),

    /// A cluster, namespace, pod, container or resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Empty required field, value outside an enumerated set, or an
    /// ineligible object state.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network-level failure that may succeed on a later attempt.
    #[error("transient error: {0}")]
    Transient(String),

    /// A retried operation kept failing until the attempt limit was reached.
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// The operation that was retried.
        operation: String,
        /// The number of attempts made.
        attempts: u32,
        /// Message of the final underlying cause.
        last: String,
    },

    /// The caller cancelled the operation.
    #[error("{operation} was cancelled")]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
    },
}

/// Coarse classification of a [`KubelinkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`KubelinkError::Config`].
    Config,
    /// See [`KubelinkError::Connection`].
    Connection,
    /// See [`KubelinkError::NotFound`].
    NotFound,
    /// See [`KubelinkError::Validation`].
    Validation,
    /// See [`KubelinkError::Transient`] and [`KubelinkError::RetriesExhausted`].
    Transient,
    /// See [`KubelinkError::Cancelled`].
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::Connection => "connection",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Transient => "transient",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl KubelinkError {
    /// Build a [`KubelinkError::Config`] error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`KubelinkError::Connection`] error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Build a [`KubelinkError::NotFound`] error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a [`KubelinkError::Validation`] error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`KubelinkError::Transient`] error.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Return the coarse classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Connection(_) => ErrorKind::Connection,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Transient(_) | Self::RetriesExhausted { .. } => ErrorKind::Transient,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns true if the error is a not-found condition, either by kind or
    /// because its message says so.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
            || self.to_string().to_ascii_lowercase().contains("not found")
    }

    /// Returns true if retrying can never change the outcome.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Connection(_)
                | Self::NotFound(_)
                | Self::Validation(_)
                | Self::Cancelled { .. }
        )
    }

    /// Returns true if the caller cancelled the operation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(KubelinkError::config("x").kind(), ErrorKind::Config);
        assert_eq!(KubelinkError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(
            KubelinkError::RetriesExhausted {
                operation: "get pod".into(),
                attempts: 3,
                last: "boom".into(),
            }
            .kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn not_found_by_message() {
        assert!(KubelinkError::not_found("pod 'a' missing").is_not_found());
        assert!(KubelinkError::transient("pods \"a\" not found").is_not_found());
        assert!(!KubelinkError::transient("connection reset").is_not_found());
    }

    #[test]
    fn terminal_errors() {
        assert!(KubelinkError::validation("bad").is_terminal());
        assert!(KubelinkError::Cancelled {
            operation: "list".into()
        }
        .is_terminal());
        assert!(!KubelinkError::transient("timeout").is_terminal());
        assert!(KubelinkError::connection("401 Unauthorized").is_terminal());
    }

    #[test]
    fn exhausted_message_keeps_last_cause() {
        let err = KubelinkError::RetriesExhausted {
            operation: "list pods".into(),
            attempts: 3,
            last: "transient error: connection reset by peer".into(),
        };
        assert_eq!(
            err.to_string(),
            "list pods failed after 3 attempts: transient error: connection reset by peer"
        );
    }
}
