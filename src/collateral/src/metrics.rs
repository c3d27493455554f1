//! Prometheus metrics for the collateral manager
//!
//! Each manager instance owns its registry, so tests and multi-manager
//! processes never collide on metric names.

use prometheus::{
    register_gauge_with_registry, register_int_counter_with_registry,
    register_int_gauge_vec_with_registry, Gauge, IntCounter, IntGaugeVec, Opts, Registry,
};

/// Metrics exported by a `CollateralManager`.
pub struct CollateralMetrics {
    registry: Registry,

    /// Total amount currently in active collaterals
    pub active_amount: Gauge,

    /// Total amount slashed over the manager's lifetime
    pub slashed_amount: Gauge,

    /// Instruments created
    pub created_total: IntCounter,

    /// Slashes executed
    pub slashes_total: IntCounter,

    /// Instrument count per lifecycle status
    pub status_count: IntGaugeVec,
}

impl CollateralMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            active_amount: register_gauge_with_registry!(
                "collateral_active_amount",
                "Total amount in active collaterals",
                registry
            )?,
            slashed_amount: register_gauge_with_registry!(
                "collateral_slashed_amount",
                "Total amount slashed",
                registry
            )?,
            created_total: register_int_counter_with_registry!(
                "collateral_created_total",
                "Collateral instruments created",
                registry
            )?,
            slashes_total: register_int_counter_with_registry!(
                "collateral_slashes_total",
                "Slash events executed",
                registry
            )?,
            status_count: register_int_gauge_vec_with_registry!(
                Opts::new("collateral_status_count", "Instruments per status"),
                &["status"],
                registry
            )?,
            registry,
        })
    }

    /// The registry backing these metrics, for scraping by a façade
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_registries() {
        let a = CollateralMetrics::new().unwrap();
        let b = CollateralMetrics::new().unwrap();
        a.created_total.inc();
        assert_eq!(a.created_total.get(), 1);
        assert_eq!(b.created_total.get(), 0);
    }
}
