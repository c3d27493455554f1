//! Error types for the event ledger

use daan_core::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Event not found: seq {0}")]
    NotFound(u64),

    #[error("Chain invariant violated at seq {seq}: {reason}")]
    InvariantViolation { seq: u64, reason: String },

    #[error("Signature rejected for event seq {seq} from {signer_id}")]
    BadSignature { seq: u64, signer_id: String },

    #[error("No signer configured")]
    NoSigner,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload codec error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Ledger file error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Stable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            LedgerError::BadSignature { .. } => ErrorKind::Unauthorized,
            LedgerError::NoSigner => ErrorKind::Unauthorized,
            LedgerError::InvalidInput(_) => ErrorKind::InvalidInput,
            LedgerError::Payload(_) => ErrorKind::InvalidInput,
            LedgerError::Signing(_) => ErrorKind::Unauthorized,
            LedgerError::Io(_) => ErrorKind::Io,
        }
    }
}
