//! Super-node lifecycle and multi-auditor cross-audit
//!
//! Nodes apply as candidates, a weighted election promotes the top
//! candidates to super-nodes for a bounded term, and tasks submitted for
//! verification are cross-audited by a randomly assigned subset of the
//! active committee. Deviation from the finalized verdict is detected
//! here and handed to the penalty integrator.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{Result, SuperNodeError};
pub use manager::{SuperNodeConfig, SuperNodeManager};
pub use types::{
    AuditDeviation, AuditRecord, AuditResult, AuditType, Candidate, DeviationSeverity, Election,
    ElectionStatus, MultiAudit, SuperNode,
};
