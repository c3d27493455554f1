//! # DAAN Core
//!
//! Shared types, traits, and error handling for the DAAN agent network.
//! This package breaks circular dependencies between the manager crates:
//! every manager speaks in terms of these ids, error kinds, and seams.

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, ErrorKind, Result};
pub use traits::{Clock, Signer, SystemClock, Transport, Verifier};
pub use types::{Amount, NodeId, Reputation, Timestamp};
