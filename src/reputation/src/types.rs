//! Rating, agent, and configuration types for the reputation engine

use serde::{Deserialize, Serialize};

use daan_core::{NodeId, Timestamp};

/// Maximum reputation records kept per agent
pub const MAX_HISTORY: usize = 1000;

/// Default half-life for rating decay (30 days in seconds)
pub const DEFAULT_HALF_LIFE_SECS: i64 = 30 * 24 * 3600;

/// Floor applied to the decay factor so old ratings never vanish entirely
pub const MIN_DECAY_FACTOR: f64 = 0.1;

/// One agent rating another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub from: NodeId,
    pub to: NodeId,
    /// Score in [-1, 1]
    pub score: f64,
    /// Non-negative influence weight
    pub weight: f64,
    pub timestamp: Timestamp,
}

/// A historical reputation observation used by decayed queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub score: f64,
    pub source: String,
    pub source_node: NodeId,
    pub recorded_at: Timestamp,
}

/// Per-agent reputation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: NodeId,

    /// Current score in [-1, 1]
    pub score: f64,

    /// Trust contribution from the agent's owner, in [0, 1]
    pub owner_trust: f64,

    /// Accumulated non-negative penalty term
    pub penalty: f64,

    /// Ratings waiting to be folded into the score
    pub pending_ratings: Vec<Rating>,

    /// Bounded history of reputation records
    pub history: Vec<ReputationRecord>,

    pub last_updated: Timestamp,
}

impl Agent {
    pub fn new(id: NodeId, owner_trust: f64, now: Timestamp) -> Self {
        Self {
            id,
            score: 0.0,
            owner_trust,
            penalty: 0.0,
            pending_ratings: Vec::new(),
            history: Vec::new(),
            last_updated: now,
        }
    }
}

/// Tunables for the scoring formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Inertia of the previous score (alpha)
    pub alpha: f64,

    /// Penalty coefficient (lambda)
    pub lambda: f64,

    /// Owner-trust coefficient (delta)
    pub delta: f64,

    /// Half-life for rating decay, seconds
    pub half_life_secs: i64,

    /// Floor for the decay factor
    pub min_decay_factor: f64,

    /// Maximum reputation records kept per agent
    pub max_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.8,
            lambda: 0.1,
            delta: 0.2,
            half_life_secs: DEFAULT_HALF_LIFE_SECS,
            min_decay_factor: MIN_DECAY_FACTOR,
            max_history: MAX_HISTORY,
        }
    }
}
