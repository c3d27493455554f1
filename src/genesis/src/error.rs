//! Error types for genesis and admission

use daan_core::{ErrorKind, Reputation};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenesisError>;

#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("Genesis already initialized for network '{0}'")]
    AlreadyInitialized(String),

    #[error("Genesis not initialized")]
    NotInitialized,

    #[error("Genesis signature invalid")]
    BadGenesisSignature,

    #[error("Node not admitted: {0}")]
    NotAdmitted(String),

    #[error("Node already admitted: {0}")]
    AlreadyAdmitted(String),

    #[error("Inviter reputation {actual} below required {required}")]
    InviterNotQualified {
        required: Reputation,
        actual: Reputation,
    },

    #[error("Invitation expired at {expires_at}, now {now}")]
    InvitationExpired { expires_at: i64, now: i64 },

    #[error("Invitation signature invalid")]
    BadInvitationSignature,

    #[error("Join request signature invalid")]
    BadJoinSignature,

    #[error("Node id {node_id} does not derive from the offered public key")]
    NodeIdMismatch { node_id: String },

    #[error("Invitation was issued for a different public key")]
    InviteeKeyMismatch,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenesisError {
    /// Stable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenesisError::AlreadyInitialized(_) => ErrorKind::AlreadyExists,
            GenesisError::NotInitialized => ErrorKind::NotFound,
            GenesisError::BadGenesisSignature => ErrorKind::Unauthorized,
            GenesisError::NotAdmitted(_) => ErrorKind::Unauthorized,
            GenesisError::AlreadyAdmitted(_) => ErrorKind::AlreadyExists,
            GenesisError::InviterNotQualified { .. } => ErrorKind::Unauthorized,
            GenesisError::InvitationExpired { .. } => ErrorKind::Expired,
            GenesisError::BadInvitationSignature => ErrorKind::Unauthorized,
            GenesisError::BadJoinSignature => ErrorKind::Unauthorized,
            GenesisError::NodeIdMismatch { .. } => ErrorKind::InvalidInput,
            GenesisError::InviteeKeyMismatch => ErrorKind::Unauthorized,
            GenesisError::InvalidInput(_) => ErrorKind::InvalidInput,
            GenesisError::Signing(_) => ErrorKind::Unauthorized,
            GenesisError::Codec(_) => ErrorKind::InvalidInput,
            GenesisError::Io(_) => ErrorKind::Io,
        }
    }
}
