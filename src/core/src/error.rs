//! Unified error taxonomy for the DAAN network core
//!
//! Every manager surfaces its own typed error at its public boundary, but
//! all of them classify into one of these stable kinds. Callers may retry
//! `Io` and `Timeout`; every other kind is permanent for the offered inputs.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Stable error classification shared by every manager error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The referenced entity does not exist
    NotFound,
    /// The entity already exists and may not be recreated
    AlreadyExists,
    /// The requested status transition is not legal from the current state
    IllegalTransition,
    /// The caller is not permitted to perform the operation
    Unauthorized,
    /// A time bound has passed (invitation, collateral, audit)
    Expired,
    /// The offered input is malformed or out of range
    InvalidInput,
    /// Not enough committee members are available to decide
    QuorumUnavailable,
    /// A structural invariant was found violated (chain break, bad hash)
    InvariantViolation,
    /// The operation did not complete in time
    Timeout,
    /// Persistence or filesystem failure
    Io,
}

/// Core error type for cross-manager plumbing.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Cryptographic errors (signing, verification, key handling)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Transport layer errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation timeout
    #[error("Timeout")]
    Timeout,

    /// Invalid input/state
    #[error("Invalid: {0}")]
    Invalid(String),

    /// I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Create a crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        CoreError::Crypto(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        CoreError::Transport(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        CoreError::Serialization(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        CoreError::NotFound(msg.into())
    }

    /// Create an invalid error
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        CoreError::Invalid(msg.into())
    }

    /// Stable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Crypto(_) => ErrorKind::Unauthorized,
            CoreError::Transport(_) => ErrorKind::Timeout,
            CoreError::Serialization(_) => ErrorKind::InvalidInput,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Timeout => ErrorKind::Timeout,
            CoreError::Invalid(_) => ErrorKind::InvalidInput,
            CoreError::Io(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = CoreError::crypto("bad key");
        assert!(matches!(err, CoreError::Crypto(_)));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = CoreError::not_found("node abc");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::transport("peer unreachable");
        assert_eq!(err.to_string(), "Transport error: peer unreachable");

        let err = CoreError::Timeout;
        assert_eq!(err.to_string(), "Timeout");
    }
}
