//! Prometheus metrics for the reputation engine

use prometheus::{
    register_gauge_vec_with_registry, register_gauge_with_registry,
    register_int_counter_with_registry, Gauge, GaugeVec, IntCounter, Opts, Registry,
};

/// Metrics exported by a `ReputationEngine`. Each engine owns its
/// registry so parallel tests never collide.
pub struct ReputationMetrics {
    registry: Registry,

    /// Current score per agent
    pub score: GaugeVec,

    /// Mean score across all agents
    pub mean_score: Gauge,

    /// Score updates performed
    pub updates_total: IntCounter,

    /// Penalties applied
    pub penalties_total: IntCounter,
}

impl ReputationMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            score: register_gauge_vec_with_registry!(
                Opts::new("reputation_score", "Current reputation score per agent"),
                &["agent"],
                registry
            )?,
            mean_score: register_gauge_with_registry!(
                "reputation_mean_score",
                "Mean reputation score across agents",
                registry
            )?,
            updates_total: register_int_counter_with_registry!(
                "reputation_updates_total",
                "Score updates performed",
                registry
            )?,
            penalties_total: register_int_counter_with_registry!(
                "reputation_penalties_total",
                "Penalties applied",
                registry
            )?,
            registry,
        })
    }

    /// The registry backing these metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
