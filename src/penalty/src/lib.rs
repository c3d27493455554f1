//! Audit-penalty closed loop
//!
//! Wires super-node deviation detection to the ledger and the collateral
//! manager: every deviation becomes a `VIOLATION` event, and the deviating
//! auditor's duty collateral is slashed in proportion to severity.

pub mod integrator;

pub use integrator::{AuditPenaltyIntegrator, IntegratorConfig, PenaltyOutcome, PenaltyPolicy};
