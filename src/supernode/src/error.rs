//! Error types for the super-node manager

use daan_core::ErrorKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SuperNodeError>;

#[derive(Debug, Error)]
pub enum SuperNodeError {
    #[error("Node {0} is already an active super-node")]
    AlreadySuperNode(String),

    #[error("Node {0} is already a candidate")]
    AlreadyCandidate(String),

    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),

    #[error("Reputation {actual} below candidacy minimum {required}")]
    InsufficientReputation { required: f64, actual: f64 },

    #[error("Stake {actual} below candidacy minimum {required}")]
    InsufficientStake { required: f64, actual: f64 },

    #[error("Voter {voter} already voted for candidate {candidate}")]
    AlreadyVoted { voter: String, candidate: String },

    #[error("An election is already open: {0}")]
    ElectionInProgress(String),

    #[error("Election not found: {0}")]
    ElectionNotFound(String),

    #[error("Election {0} is already finalized")]
    ElectionFinalized(String),

    #[error("Audit not found: {0}")]
    AuditNotFound(String),

    #[error("Audit {0} is already finalized")]
    AuditFinalized(String),

    #[error("Auditor {auditor} is not assigned to audit {audit}")]
    NotAssigned { auditor: String, audit: String },

    #[error("Auditor {auditor} already submitted for audit {audit}")]
    DuplicateSubmission { auditor: String, audit: String },

    #[error("No active super-nodes available for audit assignment")]
    QuorumUnavailable,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),
}

impl SuperNodeError {
    /// Stable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SuperNodeError::AlreadySuperNode(_) | SuperNodeError::AlreadyCandidate(_) => {
                ErrorKind::AlreadyExists
            }
            SuperNodeError::CandidateNotFound(_)
            | SuperNodeError::ElectionNotFound(_)
            | SuperNodeError::AuditNotFound(_) => ErrorKind::NotFound,
            SuperNodeError::InsufficientReputation { .. }
            | SuperNodeError::InsufficientStake { .. } => ErrorKind::InvalidInput,
            SuperNodeError::AlreadyVoted { .. } => ErrorKind::AlreadyExists,
            SuperNodeError::ElectionInProgress(_)
            | SuperNodeError::ElectionFinalized(_)
            | SuperNodeError::AuditFinalized(_)
            | SuperNodeError::DuplicateSubmission { .. } => ErrorKind::IllegalTransition,
            SuperNodeError::NotAssigned { .. } => ErrorKind::Unauthorized,
            SuperNodeError::QuorumUnavailable => ErrorKind::QuorumUnavailable,
            SuperNodeError::Signing(_) => ErrorKind::Unauthorized,
            SuperNodeError::Io(_) => ErrorKind::Io,
        }
    }
}
