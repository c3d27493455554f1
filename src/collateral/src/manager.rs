//! The collateral lifecycle manager

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use daan_core::traits::{Clock, SystemClock};
use daan_core::{Amount, NodeId};

use crate::error::{CollateralError, Result};
use crate::metrics::CollateralMetrics;
use crate::types::{
    Collateral, CollateralProof, CollateralRequirement, CollateralStatus, CollateralType,
    SlashEvent,
};

/// Configuration for collateral management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Minimum amount accepted for a new instrument
    pub min_amount: Amount,

    /// Slash ratio used when the caller passes none
    pub default_slash_ratio: f64,
}

impl Default for CollateralConfig {
    fn default() -> Self {
        Self {
            min_amount: 10.0,
            default_slash_ratio: 0.5,
        }
    }
}

/// Aggregate counters over all instruments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollateralStats {
    pub total_count: usize,
    pub pending_count: usize,
    pub active_count: usize,
    pub locked_count: usize,
    pub slashed_count: usize,
    pub returned_count: usize,
    pub expired_count: usize,
    pub active_amount: Amount,
    pub total_slashed: Amount,
    pub slash_event_count: usize,
}

#[derive(Default, Serialize, Deserialize)]
struct CollateralState {
    collaterals: HashMap<String, Collateral>,
    slash_events: HashMap<NodeId, Vec<SlashEvent>>,
    total_slashed: HashMap<NodeId, Amount>,
}

/// Tracks collateral instruments, their lifecycle, and slash history.
///
/// Status transitions are serialized by the writer lock: concurrent
/// `slash` and `return_collateral` on the same instrument linearize, and
/// the loser observes `AlreadySlashed` or an illegal-transition error.
pub struct CollateralManager {
    config: CollateralConfig,
    state: RwLock<CollateralState>,
    clock: Arc<dyn Clock>,
    path: Option<PathBuf>,
    metrics: CollateralMetrics,
}

impl CollateralManager {
    /// Create an in-memory manager
    pub fn new(config: CollateralConfig) -> Self {
        Self {
            config,
            state: RwLock::new(CollateralState::default()),
            clock: Arc::new(SystemClock),
            path: None,
            metrics: CollateralMetrics::new().expect("collateral metrics registration"),
        }
    }

    /// Open a manager persisted at `path`, loading prior state if present
    pub fn open(path: &Path, config: CollateralConfig) -> Result<Self> {
        let mut manager = Self::new(config);
        manager.path = Some(path.to_path_buf());

        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            match serde_json::from_str::<CollateralState>(&contents) {
                Ok(state) => {
                    *manager.state.write() = state;
                }
                Err(e) => warn!(error = %e, path = %path.display(), "Ignoring unreadable collateral state"),
            }
        }
        manager.refresh_gauges();
        Ok(manager)
    }

    /// Override the clock (tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Post a new collateral. It starts `pending` and expires at
    /// `now + duration_secs`.
    pub fn create(
        &self,
        owner: &NodeId,
        collateral_type: CollateralType,
        purpose: &str,
        amount: Amount,
        duration_secs: i64,
    ) -> Result<Collateral> {
        if amount < self.config.min_amount {
            return Err(CollateralError::InsufficientAmount {
                required: self.config.min_amount,
                provided: amount,
            });
        }

        let now = self.clock.now_unix();
        let collateral = Collateral {
            id: Uuid::new_v4().to_string(),
            owner: owner.clone(),
            collateral_type,
            amount,
            status: CollateralStatus::Pending,
            purpose: purpose.to_string(),
            beneficiary: None,
            created_at: now,
            locked_at: None,
            slashed_at: None,
            returned_at: None,
            expires_at: now + duration_secs,
            slash_amount: 0.0,
            metadata: HashMap::new(),
        };

        self.state
            .write()
            .collaterals
            .insert(collateral.id.clone(), collateral.clone());
        self.metrics.created_total.inc();
        self.after_mutation();

        info!(id = %collateral.id, owner = %owner, amount, purpose, "Collateral created");
        Ok(collateral)
    }

    /// Move a pending collateral to active
    pub fn activate(&self, id: &str) -> Result<Collateral> {
        let updated = {
            let mut state = self.state.write();
            let collateral = state
                .collaterals
                .get_mut(id)
                .ok_or_else(|| CollateralError::NotFound(id.to_string()))?;
            if collateral.status != CollateralStatus::Pending {
                return Err(CollateralError::IllegalTransition {
                    id: id.to_string(),
                    from: collateral.status.as_str(),
                    to: "active",
                });
            }
            collateral.status = CollateralStatus::Active;
            collateral.clone()
        };
        self.after_mutation();
        Ok(updated)
    }

    /// Lock an active collateral for a beneficiary
    pub fn lock(&self, id: &str, beneficiary: &NodeId, reason: &str) -> Result<Collateral> {
        let now = self.clock.now_unix();
        let updated = {
            let mut state = self.state.write();
            let collateral = state
                .collaterals
                .get_mut(id)
                .ok_or_else(|| CollateralError::NotFound(id.to_string()))?;
            if collateral.status != CollateralStatus::Active {
                return Err(CollateralError::IllegalTransition {
                    id: id.to_string(),
                    from: collateral.status.as_str(),
                    to: "locked",
                });
            }
            collateral.status = CollateralStatus::Locked;
            collateral.beneficiary = Some(beneficiary.clone());
            collateral.locked_at = Some(now);
            collateral
                .metadata
                .insert("lock_reason".to_string(), reason.to_string());
            collateral.clone()
        };
        self.after_mutation();
        info!(id, beneficiary = %beneficiary, reason, "Collateral locked");
        Ok(updated)
    }

    /// Confiscate a fraction of an active or locked collateral.
    ///
    /// The ratio is clamped into (0, 1]; a missing or non-positive ratio
    /// falls back to the configured default. Slashing is terminal.
    pub fn slash(
        &self,
        id: &str,
        reason: &str,
        evidence: &str,
        ratio: Option<f64>,
    ) -> Result<SlashEvent> {
        let ratio = match ratio {
            Some(r) if r > 0.0 => r.min(1.0),
            _ => self.config.default_slash_ratio,
        };
        let now = self.clock.now_unix();

        let event = {
            let mut state = self.state.write();
            let collateral = state
                .collaterals
                .get_mut(id)
                .ok_or_else(|| CollateralError::NotFound(id.to_string()))?;

            match collateral.status {
                CollateralStatus::Active | CollateralStatus::Locked => {}
                CollateralStatus::Slashed => {
                    return Err(CollateralError::AlreadySlashed(id.to_string()))
                }
                CollateralStatus::Expired => return Err(CollateralError::Expired(id.to_string())),
                other => {
                    return Err(CollateralError::IllegalTransition {
                        id: id.to_string(),
                        from: other.as_str(),
                        to: "slashed",
                    })
                }
            }

            let amount = collateral.amount * ratio;
            collateral.status = CollateralStatus::Slashed;
            collateral.slashed_at = Some(now);
            collateral.slash_amount = amount;
            let owner = collateral.owner.clone();

            let event = SlashEvent {
                id: Uuid::new_v4().to_string(),
                collateral_id: id.to_string(),
                owner: owner.clone(),
                amount,
                ratio,
                reason: reason.to_string(),
                evidence: evidence.to_string(),
                slashed_at: now,
            };
            state.slash_events.entry(owner.clone()).or_default().push(event.clone());
            *state.total_slashed.entry(owner).or_insert(0.0) += amount;
            event
        };

        self.metrics.slashes_total.inc();
        self.after_mutation();
        warn!(
            id,
            owner = %event.owner,
            amount = event.amount,
            ratio,
            reason,
            "Collateral slashed"
        );
        Ok(event)
    }

    /// Return an active or pending collateral to its owner
    pub fn return_collateral(&self, id: &str) -> Result<Collateral> {
        let now = self.clock.now_unix();
        let updated = {
            let mut state = self.state.write();
            let collateral = state
                .collaterals
                .get_mut(id)
                .ok_or_else(|| CollateralError::NotFound(id.to_string()))?;

            match collateral.status {
                CollateralStatus::Active | CollateralStatus::Pending => {}
                CollateralStatus::Locked => return Err(CollateralError::Locked(id.to_string())),
                CollateralStatus::Slashed => {
                    return Err(CollateralError::AlreadySlashed(id.to_string()))
                }
                other => {
                    return Err(CollateralError::IllegalTransition {
                        id: id.to_string(),
                        from: other.as_str(),
                        to: "returned",
                    })
                }
            }

            collateral.status = CollateralStatus::Returned;
            collateral.returned_at = Some(now);
            collateral.clone()
        };
        self.after_mutation();
        Ok(updated)
    }

    /// Check one collateral: valid iff active and not yet expired
    pub fn verify(&self, id: &str) -> Result<CollateralProof> {
        let now = self.clock.now_unix();
        let state = self.state.read();
        let collateral = state
            .collaterals
            .get(id)
            .ok_or_else(|| CollateralError::NotFound(id.to_string()))?;

        Ok(CollateralProof {
            collateral_id: collateral.id.clone(),
            owner: collateral.owner.clone(),
            amount: collateral.amount,
            is_valid: collateral.status == CollateralStatus::Active && now < collateral.expires_at,
            checked_at: now,
        })
    }

    /// Check a declared requirement against an owner's posted collateral.
    ///
    /// Only active, non-expired, type- and purpose-matching instruments
    /// whose remaining life covers the required lock period are summed.
    pub fn check_requirement(
        &self,
        owner: &NodeId,
        req: &CollateralRequirement,
    ) -> (bool, String) {
        let now = self.clock.now_unix();
        let state = self.state.read();

        let covered: Amount = state
            .collaterals
            .values()
            .filter(|c| {
                c.owner == *owner
                    && c.status == CollateralStatus::Active
                    && c.expires_at > now
                    && c.expires_at - now >= req.lock_period
                    && (req.accepted_types.is_empty()
                        || req.accepted_types.contains(&c.collateral_type))
                    && (req.purpose.is_empty() || c.purpose == req.purpose)
            })
            .map(|c| c.amount)
            .sum();

        if covered >= req.min_amount {
            (true, format!("covered {covered} of required {}", req.min_amount))
        } else {
            (
                false,
                format!("only {covered} of required {} covered", req.min_amount),
            )
        }
    }

    /// Sweep active collaterals past their expiry into `expired`. Returns
    /// the number of instruments expired.
    pub fn expire_collaterals(&self) -> usize {
        let now = self.clock.now_unix();
        let expired = {
            let mut state = self.state.write();
            let mut expired = 0;
            for collateral in state.collaterals.values_mut() {
                if collateral.status == CollateralStatus::Active && collateral.expires_at <= now {
                    collateral.status = CollateralStatus::Expired;
                    expired += 1;
                }
            }
            expired
        };
        if expired > 0 {
            self.after_mutation();
            info!(count = expired, "Expired collaterals swept");
        }
        expired
    }

    /// Deep copy of one instrument
    pub fn get(&self, id: &str) -> Result<Collateral> {
        self.state
            .read()
            .collaterals
            .get(id)
            .cloned()
            .ok_or_else(|| CollateralError::NotFound(id.to_string()))
    }

    /// Deep copies of an owner's instruments
    pub fn get_by_owner(&self, owner: &NodeId) -> Vec<Collateral> {
        let mut collaterals: Vec<Collateral> = self
            .state
            .read()
            .collaterals
            .values()
            .filter(|c| c.owner == *owner)
            .cloned()
            .collect();
        collaterals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        collaterals
    }

    /// Slash history for an owner
    pub fn slash_events(&self, owner: &NodeId) -> Vec<SlashEvent> {
        self.state
            .read()
            .slash_events
            .get(owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Running total confiscated from an owner
    pub fn total_slashed(&self, owner: &NodeId) -> Amount {
        self.state
            .read()
            .total_slashed
            .get(owner)
            .copied()
            .unwrap_or(0.0)
    }

    /// Aggregate counters
    pub fn get_stats(&self) -> CollateralStats {
        let state = self.state.read();
        let mut stats = CollateralStats {
            total_count: state.collaterals.len(),
            slash_event_count: state.slash_events.values().map(|v| v.len()).sum(),
            total_slashed: state.total_slashed.values().sum(),
            ..Default::default()
        };
        for collateral in state.collaterals.values() {
            match collateral.status {
                CollateralStatus::Pending => stats.pending_count += 1,
                CollateralStatus::Active => {
                    stats.active_count += 1;
                    stats.active_amount += collateral.amount;
                }
                CollateralStatus::Locked => stats.locked_count += 1,
                CollateralStatus::Slashed => stats.slashed_count += 1,
                CollateralStatus::Returned => stats.returned_count += 1,
                CollateralStatus::Expired => stats.expired_count += 1,
            }
        }
        stats
    }

    /// Configured defaults
    pub fn config(&self) -> &CollateralConfig {
        &self.config
    }

    /// Metrics registry for scraping
    pub fn metrics(&self) -> &CollateralMetrics {
        &self.metrics
    }

    fn after_mutation(&self) {
        self.refresh_gauges();
        self.persist();
    }

    fn refresh_gauges(&self) {
        let stats = self.get_stats();
        self.metrics.active_amount.set(stats.active_amount);
        self.metrics.slashed_amount.set(stats.total_slashed);
        for (status, count) in [
            ("pending", stats.pending_count),
            ("active", stats.active_count),
            ("locked", stats.locked_count),
            ("slashed", stats.slashed_count),
            ("returned", stats.returned_count),
            ("expired", stats.expired_count),
        ] {
            self.metrics
                .status_count
                .with_label_values(&[status])
                .set(count as i64);
        }
    }

    /// Best-effort persistence: failure is logged, the in-memory state
    /// stays authoritative for the process.
    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let encoded = {
            let state = self.state.read();
            match serde_json::to_string_pretty(&*state) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(error = %e, "Failed to encode collateral state");
                    return;
                }
            }
        };
        if let Err(e) = std::fs::write(path, encoded) {
            warn!(error = %e, path = %path.display(), "Failed to persist collateral state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_id(tag: u8) -> NodeId {
        format!("{tag:02x}").repeat(16)
    }

    fn manager() -> CollateralManager {
        CollateralManager::new(CollateralConfig::default())
    }

    #[test]
    fn test_create_rejects_small_amount() {
        let m = manager();
        let err = m
            .create(&owner_id(1), CollateralType::Token, "guarantee", 5.0, 3600)
            .unwrap_err();
        assert!(matches!(err, CollateralError::InsufficientAmount { .. }));
    }

    #[test]
    fn test_lifecycle_pending_active_locked_slashed() {
        let m = manager();
        let owner = owner_id(1);
        let c = m
            .create(&owner, CollateralType::Token, "guarantee", 100.0, 3600)
            .unwrap();
        assert_eq!(c.status, CollateralStatus::Pending);

        let c = m.activate(&c.id).unwrap();
        assert_eq!(c.status, CollateralStatus::Active);

        let c = m.lock(&c.id, &owner_id(2), "dispute").unwrap();
        assert_eq!(c.status, CollateralStatus::Locked);
        assert_eq!(c.beneficiary, Some(owner_id(2)));

        let slash = m.slash(&c.id, "violation", "{}", Some(0.3)).unwrap();
        assert_eq!(slash.amount, 30.0);
        assert_eq!(m.get(&c.id).unwrap().status, CollateralStatus::Slashed);
        assert_eq!(m.total_slashed(&owner), 30.0);
    }

    #[test]
    fn test_illegal_transitions() {
        let m = manager();
        let owner = owner_id(1);
        let c = m
            .create(&owner, CollateralType::Stake, "auditor", 100.0, 3600)
            .unwrap();

        // Lock requires active.
        assert!(matches!(
            m.lock(&c.id, &owner_id(2), "x").unwrap_err(),
            CollateralError::IllegalTransition { .. }
        ));

        // Activate twice.
        m.activate(&c.id).unwrap();
        assert!(matches!(
            m.activate(&c.id).unwrap_err(),
            CollateralError::IllegalTransition { .. }
        ));

        // Slash then slash again.
        m.slash(&c.id, "violation", "{}", None).unwrap();
        assert!(matches!(
            m.slash(&c.id, "violation", "{}", None).unwrap_err(),
            CollateralError::AlreadySlashed(_)
        ));

        // Return after slash.
        assert!(matches!(
            m.return_collateral(&c.id).unwrap_err(),
            CollateralError::AlreadySlashed(_)
        ));
    }

    #[test]
    fn test_return_preserves_amount_and_slash_totals() {
        let m = manager();
        let owner = owner_id(3);
        let c = m
            .create(&owner, CollateralType::Token, "guarantee", 80.0, 3600)
            .unwrap();
        m.activate(&c.id).unwrap();
        let returned = m.return_collateral(&c.id).unwrap();

        assert_eq!(returned.amount, 80.0);
        assert_eq!(returned.status, CollateralStatus::Returned);
        assert_eq!(m.total_slashed(&owner), 0.0);
    }

    #[test]
    fn test_return_locked_rejected() {
        let m = manager();
        let c = m
            .create(&owner_id(1), CollateralType::Token, "guarantee", 50.0, 3600)
            .unwrap();
        m.activate(&c.id).unwrap();
        m.lock(&c.id, &owner_id(2), "dispute").unwrap();
        assert!(matches!(
            m.return_collateral(&c.id).unwrap_err(),
            CollateralError::Locked(_)
        ));
    }

    #[test]
    fn test_slash_ratio_clamping() {
        let m = manager();
        let owner = owner_id(4);

        let c = m
            .create(&owner, CollateralType::Token, "guarantee", 100.0, 3600)
            .unwrap();
        m.activate(&c.id).unwrap();
        // Above 1 clamps to full confiscation.
        let slash = m.slash(&c.id, "violation", "{}", Some(5.0)).unwrap();
        assert_eq!(slash.amount, 100.0);

        let c = m
            .create(&owner, CollateralType::Token, "guarantee", 100.0, 3600)
            .unwrap();
        m.activate(&c.id).unwrap();
        // Non-positive falls back to the default.
        let slash = m.slash(&c.id, "violation", "{}", Some(-1.0)).unwrap();
        assert_eq!(slash.amount, 50.0);
    }

    #[test]
    fn test_slash_totals_match_event_sum() {
        let m = manager();
        let owner = owner_id(5);
        for _ in 0..3 {
            let c = m
                .create(&owner, CollateralType::Token, "guarantee", 100.0, 3600)
                .unwrap();
            m.activate(&c.id).unwrap();
            m.slash(&c.id, "violation", "{}", Some(0.2)).unwrap();
        }

        let events = m.slash_events(&owner);
        assert_eq!(events.len(), 3);
        let sum: Amount = events.iter().map(|e| e.amount).sum();
        assert_eq!(sum, m.total_slashed(&owner));
    }

    #[test]
    fn test_verify_and_requirement() {
        let m = manager();
        let owner = owner_id(6);
        let c = m
            .create(&owner, CollateralType::Token, "guarantee", 150.0, 48 * 3600)
            .unwrap();

        // Pending is not valid.
        assert!(!m.verify(&c.id).unwrap().is_valid);
        m.activate(&c.id).unwrap();
        assert!(m.verify(&c.id).unwrap().is_valid);

        let req = CollateralRequirement {
            min_amount: 100.0,
            accepted_types: vec![CollateralType::Token],
            lock_period: 24 * 3600,
            purpose: "guarantee".to_string(),
        };
        let (met, _) = m.check_requirement(&owner, &req);
        assert!(met);

        // Requirement longer than the remaining life fails.
        let req_long = CollateralRequirement {
            lock_period: 72 * 3600,
            ..req.clone()
        };
        let (met, explanation) = m.check_requirement(&owner, &req_long);
        assert!(!met);
        assert!(explanation.contains("required"));

        // Wrong purpose fails.
        let req_purpose = CollateralRequirement {
            purpose: "supernode_auditor".to_string(),
            ..req
        };
        let (met, _) = m.check_requirement(&owner, &req_purpose);
        assert!(!met);
    }

    #[test]
    fn test_stats() {
        let m = manager();
        let owner = owner_id(7);
        let a = m
            .create(&owner, CollateralType::Token, "guarantee", 100.0, 3600)
            .unwrap();
        let b = m
            .create(&owner, CollateralType::Stake, "auditor", 200.0, 3600)
            .unwrap();
        m.activate(&a.id).unwrap();
        m.activate(&b.id).unwrap();
        m.slash(&a.id, "violation", "{}", Some(0.5)).unwrap();

        let stats = m.get_stats();
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.slashed_count, 1);
        assert_eq!(stats.active_amount, 200.0);
        assert_eq!(stats.total_slashed, 50.0);
        assert_eq!(stats.slash_event_count, 1);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collateral.json");
        let owner = owner_id(8);

        let m = CollateralManager::open(&path, CollateralConfig::default()).unwrap();
        let c = m
            .create(&owner, CollateralType::Token, "guarantee", 120.0, 3600)
            .unwrap();
        m.activate(&c.id).unwrap();
        m.slash(&c.id, "violation", "{}", Some(0.25)).unwrap();

        let reloaded = CollateralManager::open(&path, CollateralConfig::default()).unwrap();
        assert_eq!(reloaded.get(&c.id).unwrap().status, CollateralStatus::Slashed);
        assert_eq!(reloaded.total_slashed(&owner), 30.0);
        assert_eq!(reloaded.slash_events(&owner).len(), 1);
    }
}
