//! Genesis and invitation-based admission for the DAAN network
//!
//! A network begins with a signed genesis record. After that, the only way
//! in is a signed, time-bounded invitation from an admitted node whose
//! reputation qualifies it to sponsor newcomers. Every admission binds the
//! newcomer to its sponsor's liability.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{GenesisError, Result};
pub use manager::{GenesisConfig, GenesisManager};
pub use types::{
    AdmittedNode, GenesisInfo, Invitation, JoinRequest, JoinResponse, MembershipStatus,
    RecommendedPeer,
};
