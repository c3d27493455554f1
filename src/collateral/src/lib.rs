//! Collateral management for the DAAN network
//!
//! Nodes post collateral to back their conduct. Each instrument moves
//! through a strict lifecycle (pending, active, locked, then slashed,
//! returned, or expired); slashing is an irreversible confiscation of a
//! fraction of the amount. The guarantee pool binds a sponsor's active
//! collateral behind the nodes it vouches for.

pub mod error;
pub mod guarantee;
pub mod manager;
pub mod metrics;
pub mod types;

pub use error::{CollateralError, Result};
pub use guarantee::{GuaranteeConfig, GuaranteePool};
pub use manager::{CollateralConfig, CollateralManager, CollateralStats};
pub use metrics::CollateralMetrics;
pub use types::{
    Collateral, CollateralProof, CollateralRequirement, CollateralStatus, CollateralType,
    SlashEvent,
};
