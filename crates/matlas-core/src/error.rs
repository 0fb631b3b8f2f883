//! error taxonomy shared by every matlas crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// coarse error classification used for retry, reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    Transient,
    Unavailable,
    Consistency,
    Execution,
    Cancelled,
    Unsupported,
    Http,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Transient => "Transient",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Consistency => "ConsistencyError",
            ErrorKind::Execution => "ExecutionError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::Http => "HttpError",
            ErrorKind::Other => "Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// typed error surfaced by services, planner and executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("ValidationError: {0}")]
    Validation(String),
    #[error("NotFound: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Transient: {0}")]
    Transient(String),
    #[error("Unavailable: {0}")]
    Unavailable(String),
    #[error("ConsistencyError: {0}")]
    Consistency(String),
    #[error("ExecutionError: {0}")]
    Execution(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("HttpError: {0}")]
    Http(String),
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// build an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Validation => Error::Validation(message),
            ErrorKind::NotFound => Error::NotFound(message),
            ErrorKind::Conflict => Error::Conflict(message),
            ErrorKind::Unauthorized => Error::Unauthorized(message),
            ErrorKind::Transient => Error::Transient(message),
            ErrorKind::Unavailable => Error::Unavailable(message),
            ErrorKind::Consistency => Error::Consistency(message),
            ErrorKind::Execution => Error::Execution(message),
            ErrorKind::Cancelled => Error::Cancelled(message),
            ErrorKind::Unsupported => Error::Unsupported(message),
            ErrorKind::Http => Error::Http(message),
            ErrorKind::Other => Error::Other(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Unavailable(_) => ErrorKind::Unavailable,
            Error::Consistency(_) => ErrorKind::Consistency,
            Error::Execution(_) => ErrorKind::Execution,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Http(_) => ErrorKind::Http,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    /// message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Error::Validation(m)
            | Error::NotFound(m)
            | Error::Conflict(m)
            | Error::Unauthorized(m)
            | Error::Transient(m)
            | Error::Unavailable(m)
            | Error::Consistency(m)
            | Error::Execution(m)
            | Error::Cancelled(m)
            | Error::Unsupported(m)
            | Error::Http(m)
            | Error::Other(m) => m,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// actionable hint shown next to the error, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Unauthorized => Some("check credentials (API_PUB_KEY / API_PRIV_KEY)"),
            ErrorKind::Transient | ErrorKind::Http => Some("check connectivity"),
            ErrorKind::Unavailable => Some("declare the referenced resource or create it first"),
            ErrorKind::Conflict => Some("resource is busy or already exists; retry later"),
            ErrorKind::Cancelled => Some("increase --timeout or re-run the command"),
            _ => None,
        }
    }

    /// prefix the message with extra context, keeping the kind.
    pub fn context(self, context: impl fmt::Display) -> Self {
        Error::new(self.kind(), format!("{context}: {}", self.message()))
    }
}

/// result alias for typed matlas errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_kind_prefix() {
        let err = Error::Validation("pitEnabled requires backupEnabled".to_string());
        assert_eq!(
            err.to_string(),
            "ValidationError: pitEnabled requires backupEnabled"
        );
        assert_eq!(err.message(), "pitEnabled requires backupEnabled");
    }

    #[test]
    fn context_keeps_kind() {
        let err = Error::NotFound("cluster c1".to_string()).context("get cluster");
        assert!(err.is_not_found());
        assert_eq!(err.message(), "get cluster: cluster c1");
    }

    #[test]
    fn hints_for_common_kinds() {
        assert!(Error::Unauthorized("x".into())
            .hint()
            .unwrap()
            .contains("credentials"));
        assert!(Error::Transient("x".into())
            .hint()
            .unwrap()
            .contains("connectivity"));
        assert!(Error::Validation("x".into()).hint().is_none());
    }
}
