//! Reputation engine for DAAN agents
//!
//! Per-agent scores in [-1, 1] derived from weighted, time-decayed
//! ratings, accumulated penalties, and owner-trust contribution. Recent
//! behavior is weighted more heavily: rating influence halves every
//! thirty days by default.

pub mod engine;
pub mod error;
pub mod metrics;
pub mod types;

pub use engine::{EngineStatistics, ReputationEngine};
pub use error::{ReputationError, Result};
pub use metrics::ReputationMetrics;
pub use types::{Agent, EngineConfig, Rating, ReputationRecord};
