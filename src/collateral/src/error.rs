//! Error types for collateral management

use daan_core::{Amount, ErrorKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollateralError>;

#[derive(Debug, Error)]
pub enum CollateralError {
    #[error("Collateral not found: {0}")]
    NotFound(String),

    #[error("Amount {provided} is below the minimum of {required}")]
    InsufficientAmount { required: Amount, provided: Amount },

    #[error("Unknown collateral type: {0}")]
    InvalidType(String),

    #[error("Illegal transition for collateral {id}: {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Collateral {0} is locked")]
    Locked(String),

    #[error("Collateral {0} was already slashed")]
    AlreadySlashed(String),

    #[error("Collateral {0} has expired")]
    Expired(String),

    #[error("Node {node_id} is not authorized: {reason}")]
    Unauthorized { node_id: String, reason: String },

    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollateralError {
    /// Stable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CollateralError::NotFound(_) => ErrorKind::NotFound,
            CollateralError::InsufficientAmount { .. } => ErrorKind::InvalidInput,
            CollateralError::InvalidType(_) => ErrorKind::InvalidInput,
            CollateralError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            CollateralError::Locked(_) => ErrorKind::IllegalTransition,
            CollateralError::AlreadySlashed(_) => ErrorKind::IllegalTransition,
            CollateralError::Expired(_) => ErrorKind::Expired,
            CollateralError::Unauthorized { .. } => ErrorKind::Unauthorized,
            CollateralError::Io(_) => ErrorKind::Io,
        }
    }
}
