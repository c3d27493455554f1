//! The audit penalty integrator

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use daan_collateral::{CollateralManager, CollateralStatus, SlashEvent};
use daan_core::NodeId;
use daan_ledger::{Event, EventLedger, EventPayload, ViolationPayload};
use daan_supernode::{AuditDeviation, DeviationSeverity, SuperNodeManager};

/// Violation type tag recorded on every deviation-driven ledger event
pub const AUDIT_DEVIATION_VIOLATION: &str = "audit_deviation";

/// Penalty schedule per deviation severity: (reputation penalty,
/// collateral slash ratio).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyPolicy {
    pub minor: (f64, f64),
    pub severe: (f64, f64),
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            minor: (5.0, 0.1),
            severe: (20.0, 0.3),
        }
    }
}

impl PenaltyPolicy {
    /// (reputation penalty, slash ratio) for a severity
    pub fn for_severity(&self, severity: DeviationSeverity) -> (f64, f64) {
        match severity {
            DeviationSeverity::Minor => self.minor,
            DeviationSeverity::Severe => self.severe,
        }
    }
}

/// Configuration for the integrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratorConfig {
    pub policy: PenaltyPolicy,

    /// Slash the deviant's duty collateral automatically
    pub auto_slash: bool,

    /// Purpose tag of the collateral posted for auditor duty
    pub auditor_purpose: String,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            policy: PenaltyPolicy::default(),
            auto_slash: true,
            auditor_purpose: "supernode_auditor".to_string(),
        }
    }
}

/// What a penalty application produced. Either sub-step may fail without
/// stopping the other; failures are summarized in `errors`.
#[derive(Debug, Clone)]
pub struct PenaltyOutcome {
    pub deviation: AuditDeviation,
    pub violation_event: Option<Event>,
    pub slash_event: Option<SlashEvent>,
    pub errors: Vec<String>,
}

type PenaltyCallback = Arc<dyn Fn(PenaltyOutcome) + Send + Sync>;

/// Subscribes to deviation notifications and converts each one into a
/// ledger violation plus a proportional collateral slash.
pub struct AuditPenaltyIntegrator {
    config: IntegratorConfig,
    ledger: Arc<EventLedger>,
    collateral: Option<Arc<CollateralManager>>,
    super_nodes: Arc<SuperNodeManager>,
    /// Identity recorded as the signer of violation events
    signer_id: NodeId,
    on_penalty_applied: RwLock<Option<PenaltyCallback>>,
}

impl AuditPenaltyIntegrator {
    pub fn new(
        config: IntegratorConfig,
        ledger: Arc<EventLedger>,
        collateral: Option<Arc<CollateralManager>>,
        super_nodes: Arc<SuperNodeManager>,
        signer_id: NodeId,
    ) -> Self {
        Self {
            config,
            ledger,
            collateral,
            super_nodes,
            signer_id,
            on_penalty_applied: RwLock::new(None),
        }
    }

    /// Register a callback observing every applied penalty
    pub fn set_on_penalty_applied(&self, cb: PenaltyCallback) {
        *self.on_penalty_applied.write() = Some(cb);
    }

    /// Register the deviation handler with the super-node manager. The
    /// manager delivers deviations on spawned tasks, so the handler may
    /// freely call back into the ledger and collateral manager.
    pub fn start(self: Arc<Self>) {
        let integrator = Arc::clone(&self);
        self.super_nodes
            .set_on_auditor_deviation(Arc::new(move |deviation| {
                integrator.handle_deviation(&deviation);
            }));
        info!("Audit penalty integrator started");
    }

    /// Apply the penalty for an externally detected deviation,
    /// synchronously, returning the outcome
    pub fn manual_penalty(&self, deviation: &AuditDeviation) -> PenaltyOutcome {
        self.handle_deviation(deviation)
    }

    /// The penalty pipeline: ledger violation event, then collateral
    /// slash. Each sub-step proceeds even when the other fails.
    fn handle_deviation(&self, deviation: &AuditDeviation) -> PenaltyOutcome {
        let (reputation_penalty, slash_ratio) =
            self.config.policy.for_severity(deviation.severity);
        let mut outcome = PenaltyOutcome {
            deviation: deviation.clone(),
            violation_event: None,
            slash_event: None,
            errors: Vec::new(),
        };

        let payload = EventPayload::Violation(ViolationPayload {
            violation_type: AUDIT_DEVIATION_VIOLATION.to_string(),
            severity: deviation.severity.as_str().to_string(),
            penalty: reputation_penalty,
            evidence: self.evidence_for(deviation),
        });
        match self
            .ledger
            .append(&deviation.auditor_id, &payload, &self.signer_id)
        {
            Ok(event) => {
                info!(
                    auditor = %deviation.auditor_id,
                    audit = %deviation.audit_id,
                    seq = event.seq,
                    penalty = reputation_penalty,
                    "Violation recorded for audit deviation"
                );
                outcome.violation_event = Some(event);
            }
            Err(e) => {
                error!(auditor = %deviation.auditor_id, error = %e, "Failed to record violation event");
                outcome.errors.push(format!("ledger: {e}"));
            }
        }

        if self.config.auto_slash {
            if let Some(collateral) = &self.collateral {
                match self.slash_duty_collateral(collateral, deviation, slash_ratio) {
                    Ok(event) => outcome.slash_event = Some(event),
                    Err(e) => {
                        warn!(auditor = %deviation.auditor_id, error = %e, "Failed to slash auditor collateral");
                        outcome.errors.push(format!("collateral: {e}"));
                    }
                }
            }
        }

        let cb = self.on_penalty_applied.read().clone();
        if let Some(cb) = cb {
            cb(outcome.clone());
        }
        outcome
    }

    /// Evidence blob carrying the audit id and the recorded verdicts
    fn evidence_for(&self, deviation: &AuditDeviation) -> serde_json::Value {
        let results = self
            .super_nodes
            .get_audit(&deviation.audit_id)
            .map(|audit| {
                audit
                    .records
                    .values()
                    .map(|r| {
                        serde_json::json!({
                            "auditor_id": r.auditor_id,
                            "result": r.result,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        serde_json::json!({
            "audit_id": deviation.audit_id,
            "expected": deviation.expected,
            "actual": deviation.actual,
            "results": results,
        })
    }

    /// Slash the deviant's oldest active collateral tagged for auditor
    /// duty
    fn slash_duty_collateral(
        &self,
        collateral: &CollateralManager,
        deviation: &AuditDeviation,
        ratio: f64,
    ) -> Result<SlashEvent, String> {
        let duty = collateral
            .get_by_owner(&deviation.auditor_id)
            .into_iter()
            .find(|c| {
                c.status == CollateralStatus::Active && c.purpose == self.config.auditor_purpose
            })
            .ok_or_else(|| {
                format!(
                    "no active '{}' collateral for {}",
                    self.config.auditor_purpose, deviation.auditor_id
                )
            })?;

        let evidence = serde_json::json!({
            "audit_id": deviation.audit_id,
            "severity": deviation.severity,
        });
        collateral
            .slash(
                &duty.id,
                AUDIT_DEVIATION_VIOLATION,
                &evidence.to_string(),
                Some(ratio),
            )
            .map_err(|e| e.to_string())
    }
}
