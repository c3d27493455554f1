//! Error types for the reputation engine

use daan_core::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReputationError>;

#[derive(Debug, Error)]
pub enum ReputationError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid rating score: {0} (must be in [-1, 1])")]
    InvalidScore(f64),

    #[error("Invalid rating weight: {0} (must be >= 0)")]
    InvalidWeight(f64),

    #[error("Invalid penalty: {0} (must be >= 0)")]
    InvalidPenalty(f64),
}

impl ReputationError {
    /// Stable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReputationError::AgentNotFound(_) => ErrorKind::NotFound,
            ReputationError::AlreadyRegistered(_) => ErrorKind::AlreadyExists,
            ReputationError::InvalidScore(_)
            | ReputationError::InvalidWeight(_)
            | ReputationError::InvalidPenalty(_) => ErrorKind::InvalidInput,
        }
    }
}
