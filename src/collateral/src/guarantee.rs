//! Guarantee pool: sponsor collateral bound behind guaranteed peers

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use daan_core::{Amount, NodeId};

use crate::error::{CollateralError, Result};
use crate::manager::CollateralManager;
use crate::types::SlashEvent;

/// Configuration for the guarantee pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuaranteeConfig {
    /// Minimum collateral amount a sponsor must bind
    pub min_guarantor_collateral: Amount,
}

impl Default for GuaranteeConfig {
    fn default() -> Self {
        Self {
            min_guarantor_collateral: 100.0,
        }
    }
}

#[derive(Default)]
struct GuaranteeState {
    /// sponsor -> guaranteed nodes
    guaranteed: HashMap<NodeId, Vec<NodeId>>,
    /// (sponsor, guaranteed) -> bound collateral id
    bindings: HashMap<(NodeId, NodeId), String>,
}

/// Binds a sponsor's active collateral to the peers it vouches for.
///
/// When a guaranteed peer violates, the sponsor's bound collateral is
/// slashed at half the principal's penalty rate.
pub struct GuaranteePool {
    config: GuaranteeConfig,
    collateral: Arc<CollateralManager>,
    state: RwLock<GuaranteeState>,
}

impl GuaranteePool {
    pub fn new(collateral: Arc<CollateralManager>, config: GuaranteeConfig) -> Self {
        Self {
            config,
            collateral,
            state: RwLock::new(GuaranteeState::default()),
        }
    }

    /// Bind a sponsor's collateral behind a guaranteed node.
    ///
    /// The collateral must verify as valid, belong to the sponsor, and
    /// meet the minimum guarantor amount. Self-guarantees are rejected.
    pub fn add_guarantee(
        &self,
        sponsor: &NodeId,
        guaranteed: &NodeId,
        collateral_id: &str,
    ) -> Result<()> {
        if sponsor == guaranteed {
            return Err(CollateralError::Unauthorized {
                node_id: sponsor.clone(),
                reason: "self-guarantee is not allowed".to_string(),
            });
        }

        let proof = self.collateral.verify(collateral_id)?;
        if !proof.is_valid {
            return Err(CollateralError::Expired(collateral_id.to_string()));
        }
        if proof.owner != *sponsor {
            return Err(CollateralError::Unauthorized {
                node_id: sponsor.clone(),
                reason: format!("collateral {collateral_id} is owned by {}", proof.owner),
            });
        }
        if proof.amount < self.config.min_guarantor_collateral {
            return Err(CollateralError::InsufficientAmount {
                required: self.config.min_guarantor_collateral,
                provided: proof.amount,
            });
        }

        let mut state = self.state.write();
        let entries = state.guaranteed.entry(sponsor.clone()).or_default();
        if !entries.contains(guaranteed) {
            entries.push(guaranteed.clone());
        }
        state
            .bindings
            .insert((sponsor.clone(), guaranteed.clone()), collateral_id.to_string());

        info!(sponsor = %sponsor, guaranteed = %guaranteed, collateral_id, "Guarantee added");
        Ok(())
    }

    /// Sponsors currently guaranteeing `node`
    pub fn get_guarantors(&self, node: &NodeId) -> Vec<NodeId> {
        let state = self.state.read();
        let mut guarantors: Vec<NodeId> = state
            .guaranteed
            .iter()
            .filter(|(_, nodes)| nodes.contains(node))
            .map(|(sponsor, _)| sponsor.clone())
            .collect();
        guarantors.sort();
        guarantors
    }

    /// Nodes guaranteed by `sponsor`
    pub fn get_guaranteed(&self, sponsor: &NodeId) -> Vec<NodeId> {
        self.state
            .read()
            .guaranteed
            .get(sponsor)
            .cloned()
            .unwrap_or_default()
    }

    /// Collateral id bound between a sponsor and a guaranteed node
    pub fn binding(&self, sponsor: &NodeId, guaranteed: &NodeId) -> Option<String> {
        self.state
            .read()
            .bindings
            .get(&(sponsor.clone(), guaranteed.clone()))
            .cloned()
    }

    /// Slash a sponsor's bound collateral because a guaranteed node
    /// violated. Sponsors bear half of the principal's penalty rate.
    pub fn slash_guarantor(
        &self,
        sponsor: &NodeId,
        guaranteed: &NodeId,
        reason: &str,
        evidence: &str,
    ) -> Result<SlashEvent> {
        let collateral_id = self.binding(sponsor, guaranteed).ok_or_else(|| {
            CollateralError::NotFound(format!("guarantee {sponsor} -> {guaranteed}"))
        })?;

        let ratio = self.collateral.config().default_slash_ratio * 0.5;
        let event = self
            .collateral
            .slash(&collateral_id, reason, evidence, Some(ratio))?;

        warn!(
            sponsor = %sponsor,
            guaranteed = %guaranteed,
            amount = event.amount,
            "Guarantor collateral slashed"
        );
        Ok(event)
    }

    /// Drop a binding whose collateral has not been slashed, returning the
    /// released collateral id
    pub fn revoke_guarantee(&self, sponsor: &NodeId, guaranteed: &NodeId) -> Result<String> {
        let collateral_id = self.binding(sponsor, guaranteed).ok_or_else(|| {
            CollateralError::NotFound(format!("guarantee {sponsor} -> {guaranteed}"))
        })?;

        let collateral = self.collateral.get(&collateral_id)?;
        if collateral.status == crate::types::CollateralStatus::Slashed {
            return Err(CollateralError::AlreadySlashed(collateral_id));
        }

        let mut state = self.state.write();
        state
            .bindings
            .remove(&(sponsor.clone(), guaranteed.clone()));
        if let Some(nodes) = state.guaranteed.get_mut(sponsor) {
            nodes.retain(|n| n != guaranteed);
        }
        Ok(collateral_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::CollateralConfig;
    use crate::types::CollateralType;

    fn node(tag: u8) -> NodeId {
        format!("{tag:02x}").repeat(16)
    }

    fn pool() -> (Arc<CollateralManager>, GuaranteePool) {
        let manager = Arc::new(CollateralManager::new(CollateralConfig::default()));
        let pool = GuaranteePool::new(manager.clone(), GuaranteeConfig::default());
        (manager, pool)
    }

    fn active_collateral(manager: &CollateralManager, owner: &NodeId, amount: f64) -> String {
        let c = manager
            .create(owner, CollateralType::Token, "guarantee", amount, 48 * 3600)
            .unwrap();
        manager.activate(&c.id).unwrap();
        c.id
    }

    #[test]
    fn test_self_guarantee_rejected() {
        let (manager, pool) = pool();
        let sponsor = node(1);
        let id = active_collateral(&manager, &sponsor, 150.0);
        assert!(matches!(
            pool.add_guarantee(&sponsor, &sponsor, &id).unwrap_err(),
            CollateralError::Unauthorized { .. }
        ));
    }

    #[test]
    fn test_add_guarantee_checks() {
        let (manager, pool) = pool();
        let sponsor = node(1);
        let peer = node(2);

        // Pending collateral is not valid.
        let pending = manager
            .create(&sponsor, CollateralType::Token, "guarantee", 150.0, 3600)
            .unwrap();
        assert!(pool.add_guarantee(&sponsor, &peer, &pending.id).is_err());

        // Someone else's collateral is rejected.
        let other = active_collateral(&manager, &node(3), 150.0);
        assert!(matches!(
            pool.add_guarantee(&sponsor, &peer, &other).unwrap_err(),
            CollateralError::Unauthorized { .. }
        ));

        // Too small is rejected.
        let small = active_collateral(&manager, &sponsor, 50.0);
        assert!(matches!(
            pool.add_guarantee(&sponsor, &peer, &small).unwrap_err(),
            CollateralError::InsufficientAmount { .. }
        ));

        // A valid binding works and is visible both ways.
        let good = active_collateral(&manager, &sponsor, 150.0);
        pool.add_guarantee(&sponsor, &peer, &good).unwrap();
        assert_eq!(pool.get_guarantors(&peer), vec![sponsor.clone()]);
        assert_eq!(pool.get_guaranteed(&sponsor), vec![peer.clone()]);
        assert_eq!(pool.binding(&sponsor, &peer), Some(good));
    }

    #[test]
    fn test_slash_guarantor_half_rate() {
        let (manager, pool) = pool();
        let sponsor = node(1);
        let peer = node(2);
        let id = active_collateral(&manager, &sponsor, 150.0);
        pool.add_guarantee(&sponsor, &peer, &id).unwrap();

        // Default slash ratio 0.5, sponsors bear half: 150 * 0.25 = 37.5.
        let event = pool
            .slash_guarantor(&sponsor, &peer, "guaranteed node violated", "{}")
            .unwrap();
        assert_eq!(event.amount, 37.5);
        assert_eq!(manager.total_slashed(&sponsor), 37.5);
    }

    #[test]
    fn test_revoke_guarantee() {
        let (manager, pool) = pool();
        let sponsor = node(1);
        let peer = node(2);
        let id = active_collateral(&manager, &sponsor, 150.0);
        pool.add_guarantee(&sponsor, &peer, &id).unwrap();

        let released = pool.revoke_guarantee(&sponsor, &peer).unwrap();
        assert_eq!(released, id);
        assert!(pool.get_guaranteed(&sponsor).is_empty());
        assert!(pool.binding(&sponsor, &peer).is_none());

        // Revoking again reports the missing binding.
        assert!(matches!(
            pool.revoke_guarantee(&sponsor, &peer).unwrap_err(),
            CollateralError::NotFound(_)
        ));
    }

    #[test]
    fn test_revoke_after_slash_rejected() {
        let (manager, pool) = pool();
        let sponsor = node(1);
        let peer = node(2);
        let id = active_collateral(&manager, &sponsor, 150.0);
        pool.add_guarantee(&sponsor, &peer, &id).unwrap();
        pool.slash_guarantor(&sponsor, &peer, "violation", "{}").unwrap();

        assert!(matches!(
            pool.revoke_guarantee(&sponsor, &peer).unwrap_err(),
            CollateralError::AlreadySlashed(_)
        ));
    }
}
