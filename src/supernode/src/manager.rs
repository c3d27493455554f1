//! The super-node committee manager

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use daan_core::traits::{Clock, Signer, SystemClock};
use daan_core::NodeId;

use crate::error::{Result, SuperNodeError};
use crate::types::{
    AuditDeviation, AuditRecord, AuditResult, AuditType, Candidate, DeviationSeverity, Election,
    ElectionStatus, MultiAudit, SuperNode,
};

/// Tunables for elections, terms, and audits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperNodeConfig {
    /// Minimum reputation to apply as a candidate
    pub min_reputation: f64,

    /// Minimum stake to apply as a candidate
    pub min_stake: f64,

    /// Committee size cap per election
    pub max_super_nodes: usize,

    /// How long an election stays open, seconds
    pub election_duration_secs: i64,

    /// Committee term length, seconds
    pub term_duration_secs: i64,

    /// Auditors sampled per audit
    pub auditors_per_task: usize,

    /// Pass ratio at or above which an audit finalizes as pass
    pub audit_threshold: f64,

    /// Audit validity window, seconds
    pub audit_expiry_secs: i64,

    /// Retention for finalized audits and elections, seconds
    pub retention_secs: i64,

    /// Seed for the auditor-selection PRNG; random when absent
    pub rng_seed: Option<u64>,
}

impl Default for SuperNodeConfig {
    fn default() -> Self {
        Self {
            min_reputation: 0.5,
            min_stake: 100.0,
            max_super_nodes: 21,
            election_duration_secs: 3600,
            term_duration_secs: 7 * 24 * 3600,
            auditors_per_task: 3,
            audit_threshold: 0.6,
            audit_expiry_secs: 24 * 3600,
            retention_secs: 30 * 24 * 3600,
            rng_seed: None,
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
struct SuperNodeState {
    candidates: HashMap<NodeId, Candidate>,
    super_nodes: HashMap<NodeId, SuperNode>,
    elections: HashMap<String, Election>,
    open_election: Option<String>,
    audits: HashMap<String, MultiAudit>,
}

type NodeCallback = Arc<dyn Fn(SuperNode) + Send + Sync>;
type ElectionCallback = Arc<dyn Fn(Election) + Send + Sync>;
type AuditCallback = Arc<dyn Fn(MultiAudit) + Send + Sync>;
type DeviationCallback = Arc<dyn Fn(AuditDeviation) + Send + Sync>;

#[derive(Default, Clone)]
struct Callbacks {
    on_super_node_elected: Option<NodeCallback>,
    on_super_node_removed: Option<NodeCallback>,
    on_election_started: Option<ElectionCallback>,
    on_election_finalized: Option<ElectionCallback>,
    on_audit_completed: Option<AuditCallback>,
    on_auditor_deviation: Option<DeviationCallback>,
}

/// Run a callback on a spawned task when a runtime is present, inline
/// otherwise. Manager locks are never held across either path.
fn dispatch<F: FnOnce() + Send + 'static>(task: F) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { task() });
        }
        Err(_) => task(),
    }
}

/// Candidate registry, weighted election, term tracking, and
/// multi-auditor audit finalization.
pub struct SuperNodeManager {
    config: SuperNodeConfig,
    state: RwLock<SuperNodeState>,
    callbacks: RwLock<Callbacks>,
    rng: Mutex<StdRng>,
    signer: Option<Arc<dyn Signer>>,
    clock: Arc<dyn Clock>,
    path: Option<PathBuf>,
}

impl SuperNodeManager {
    pub fn new(config: SuperNodeConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::rngs::OsRng.next_u64()),
        };
        Self {
            config,
            state: RwLock::new(SuperNodeState::default()),
            callbacks: RwLock::new(Callbacks::default()),
            rng: Mutex::new(rng),
            signer: None,
            clock: Arc::new(SystemClock),
            path: None,
        }
    }

    /// Open a manager persisted at `path`, loading prior state if present
    pub fn open(path: &Path, config: SuperNodeConfig) -> Result<Self> {
        let mut manager = Self::new(config);
        manager.path = Some(path.to_path_buf());

        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            match serde_json::from_str::<SuperNodeState>(&contents) {
                Ok(state) => *manager.state.write() = state,
                Err(e) => warn!(error = %e, path = %path.display(), "Ignoring unreadable super-node state"),
            }
        }
        Ok(manager)
    }

    /// Attach the signer used for audit records
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Override the clock (tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // --- callback registration ------------------------------------------

    pub fn set_on_super_node_elected(&self, cb: NodeCallback) {
        self.callbacks.write().on_super_node_elected = Some(cb);
    }

    pub fn set_on_super_node_removed(&self, cb: NodeCallback) {
        self.callbacks.write().on_super_node_removed = Some(cb);
    }

    pub fn set_on_election_started(&self, cb: ElectionCallback) {
        self.callbacks.write().on_election_started = Some(cb);
    }

    pub fn set_on_election_finalized(&self, cb: ElectionCallback) {
        self.callbacks.write().on_election_finalized = Some(cb);
    }

    pub fn set_on_audit_completed(&self, cb: AuditCallback) {
        self.callbacks.write().on_audit_completed = Some(cb);
    }

    pub fn set_on_auditor_deviation(&self, cb: DeviationCallback) {
        self.callbacks.write().on_auditor_deviation = Some(cb);
    }

    // --- candidacy ------------------------------------------------------

    /// Apply for committee candidacy
    pub fn apply_candidate(&self, node_id: &NodeId, reputation: f64, stake: f64) -> Result<()> {
        if reputation < self.config.min_reputation {
            return Err(SuperNodeError::InsufficientReputation {
                required: self.config.min_reputation,
                actual: reputation,
            });
        }
        if stake < self.config.min_stake {
            return Err(SuperNodeError::InsufficientStake {
                required: self.config.min_stake,
                actual: stake,
            });
        }

        {
            let mut state = self.state.write();
            if state
                .super_nodes
                .get(node_id)
                .map(|sn| sn.active)
                .unwrap_or(false)
            {
                return Err(SuperNodeError::AlreadySuperNode(node_id.clone()));
            }
            if state.candidates.contains_key(node_id) {
                return Err(SuperNodeError::AlreadyCandidate(node_id.clone()));
            }
            state.candidates.insert(
                node_id.clone(),
                Candidate {
                    node_id: node_id.clone(),
                    reputation,
                    stake,
                    applied_at: self.clock.now_unix(),
                    vote_weight: 0.0,
                    voters: Default::default(),
                },
            );
        }
        self.persist();
        info!(node_id = %node_id, reputation, stake, "Candidate applied");
        Ok(())
    }

    /// Withdraw a candidacy
    pub fn withdraw_candidate(&self, node_id: &NodeId) -> Result<Candidate> {
        let candidate = {
            let mut state = self.state.write();
            state
                .candidates
                .remove(node_id)
                .ok_or_else(|| SuperNodeError::CandidateNotFound(node_id.clone()))?
        };
        self.persist();
        Ok(candidate)
    }

    /// Cast a weighted vote. One vote per voter per candidate.
    pub fn vote_for_candidate(&self, voter: &NodeId, candidate: &NodeId, weight: f64) -> Result<()> {
        {
            let mut state = self.state.write();
            let entry = state
                .candidates
                .get_mut(candidate)
                .ok_or_else(|| SuperNodeError::CandidateNotFound(candidate.clone()))?;
            if entry.voters.contains_key(voter) {
                return Err(SuperNodeError::AlreadyVoted {
                    voter: voter.clone(),
                    candidate: candidate.clone(),
                });
            }
            entry.voters.insert(voter.clone(), weight);
            entry.vote_weight += weight;
        }
        self.persist();
        Ok(())
    }

    // --- elections ------------------------------------------------------

    /// Open an election over a deep copy of the current candidate pool.
    /// At most one election may be open at a time.
    pub fn start_election(&self) -> Result<Election> {
        let now = self.clock.now_unix();
        let election = {
            let mut state = self.state.write();
            if let Some(open) = &state.open_election {
                return Err(SuperNodeError::ElectionInProgress(open.clone()));
            }
            let mut candidates: Vec<Candidate> = state.candidates.values().cloned().collect();
            candidates.sort_by(|a, b| a.node_id.cmp(&b.node_id));

            let election = Election {
                id: Uuid::new_v4().to_string(),
                started_at: now,
                ends_at: now + self.config.election_duration_secs,
                candidates,
                winners: Vec::new(),
                status: ElectionStatus::Open,
                finalized_at: None,
            };
            state.elections.insert(election.id.clone(), election.clone());
            state.open_election = Some(election.id.clone());
            election
        };
        self.persist();

        let cb = self.callbacks.read().on_election_started.clone();
        if let Some(cb) = cb {
            let snapshot = election.clone();
            dispatch(move || cb(snapshot));
        }
        info!(election_id = %election.id, candidates = election.candidates.len(), "Election started");
        Ok(election)
    }

    /// Mark open elections past their end as closed. Returns the ids
    /// closed.
    pub fn close_expired_elections(&self) -> Vec<String> {
        let now = self.clock.now_unix();
        let closed = {
            let mut state = self.state.write();
            let mut closed = Vec::new();
            for election in state.elections.values_mut() {
                if election.status == ElectionStatus::Open && election.ends_at <= now {
                    election.status = ElectionStatus::Closed;
                    closed.push(election.id.clone());
                }
            }
            closed
        };
        if !closed.is_empty() {
            self.persist();
        }
        closed
    }

    /// Finalize an election: the top `max_super_nodes` captured candidates
    /// by vote weight (zero-vote candidates excluded, ties broken by
    /// candidate id) are promoted to active super-nodes and leave the
    /// candidate pool.
    pub fn finalize_election(&self, election_id: &str) -> Result<Election> {
        let now = self.clock.now_unix();

        let (election, promoted) = {
            let mut state = self.state.write();
            let election = state
                .elections
                .get(election_id)
                .ok_or_else(|| SuperNodeError::ElectionNotFound(election_id.to_string()))?;
            if election.status == ElectionStatus::Finalized {
                return Err(SuperNodeError::ElectionFinalized(election_id.to_string()));
            }

            let mut ranked = election.candidates.clone();
            ranked.sort_by(|a, b| {
                b.vote_weight
                    .partial_cmp(&a.vote_weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.node_id.cmp(&b.node_id))
            });

            let winners: Vec<Candidate> = ranked
                .into_iter()
                .filter(|c| c.vote_weight > 0.0)
                .take(self.config.max_super_nodes)
                .collect();

            let mut promoted = Vec::with_capacity(winners.len());
            for winner in &winners {
                let super_node = SuperNode {
                    node_id: winner.node_id.clone(),
                    reputation: winner.reputation,
                    stake: winner.stake,
                    term_start: now,
                    term_end: now + self.config.term_duration_secs,
                    pass_rate: 1.0,
                    audit_count: 0,
                    active: true,
                };
                state
                    .super_nodes
                    .insert(winner.node_id.clone(), super_node.clone());
                state.candidates.remove(&winner.node_id);
                promoted.push(super_node);
            }

            let election = state.elections.get_mut(election_id).expect("checked above");
            election.winners = winners.iter().map(|c| c.node_id.clone()).collect();
            election.status = ElectionStatus::Finalized;
            election.finalized_at = Some(now);
            if state.open_election.as_deref() == Some(election_id) {
                state.open_election = None;
            }
            (state.elections[election_id].clone(), promoted)
        };
        self.persist();

        let callbacks = self.callbacks.read().clone();
        if let Some(cb) = callbacks.on_super_node_elected {
            for super_node in promoted {
                let cb = cb.clone();
                dispatch(move || cb(super_node));
            }
        }
        if let Some(cb) = callbacks.on_election_finalized {
            let snapshot = election.clone();
            dispatch(move || cb(snapshot));
        }

        info!(election_id, winners = election.winners.len(), "Election finalized");
        Ok(election)
    }

    /// Deactivate every super-node whose term has ended. Returns the
    /// deactivated nodes.
    pub fn expire_terms(&self) -> Vec<SuperNode> {
        let now = self.clock.now_unix();
        let expired = {
            let mut state = self.state.write();
            let mut expired = Vec::new();
            for super_node in state.super_nodes.values_mut() {
                if super_node.active && super_node.term_end <= now {
                    super_node.active = false;
                    expired.push(super_node.clone());
                }
            }
            expired
        };

        if !expired.is_empty() {
            self.persist();
            let cb = self.callbacks.read().on_super_node_removed.clone();
            if let Some(cb) = cb {
                for super_node in expired.clone() {
                    let cb = cb.clone();
                    dispatch(move || cb(super_node));
                }
            }
            info!(count = expired.len(), "Super-node terms expired");
        }
        expired
    }

    // --- audits ---------------------------------------------------------

    /// Create a multi-audit over a target, sampling `auditors_per_task`
    /// active super-nodes (or all of them, if fewer) without replacement.
    pub fn create_audit(&self, audit_type: AuditType, target_id: &str) -> Result<MultiAudit> {
        let now = self.clock.now_unix();
        let audit = {
            let mut state = self.state.write();
            let mut active: Vec<NodeId> = state
                .super_nodes
                .values()
                .filter(|sn| sn.active)
                .map(|sn| sn.node_id.clone())
                .collect();
            if active.is_empty() {
                return Err(SuperNodeError::QuorumUnavailable);
            }
            active.sort();
            active.shuffle(&mut *self.rng.lock());
            active.truncate(self.config.auditors_per_task);

            let audit = MultiAudit {
                id: Uuid::new_v4().to_string(),
                audit_type,
                target_id: target_id.to_string(),
                created_at: now,
                expires_at: now + self.config.audit_expiry_secs,
                auditors: active,
                records: Default::default(),
                final_result: AuditResult::Pending,
                finalized: false,
                deviations: Vec::new(),
            };
            state.audits.insert(audit.id.clone(), audit.clone());
            audit
        };
        self.persist();
        debug!(audit_id = %audit.id, target = target_id, auditors = ?audit.auditors, "Audit created");
        Ok(audit)
    }

    /// Record one auditor's verdict. When the last assigned auditor
    /// submits, the audit finalizes and deviation callbacks fire.
    pub fn submit_audit_result(
        &self,
        audit_id: &str,
        auditor_id: &NodeId,
        result: AuditResult,
        evidence: &str,
    ) -> Result<()> {
        let now = self.clock.now_unix();

        // Pre-validate under the read lock, then sign with no lock held:
        // the signer may block on a remote backend.
        {
            let state = self.state.read();
            let audit = state
                .audits
                .get(audit_id)
                .ok_or_else(|| SuperNodeError::AuditNotFound(audit_id.to_string()))?;
            self.validate_submission(audit, auditor_id)?;
        }

        let signature = match &self.signer {
            Some(signer) => {
                let canonical =
                    format!("{audit_id}|{auditor_id}|{}|{now}", result.as_str());
                signer
                    .sign(canonical.as_bytes())
                    .map_err(|e| SuperNodeError::Signing(e.to_string()))?
            }
            None => String::new(),
        };

        let outcome = {
            let mut state = self.state.write();
            let audit = state
                .audits
                .get_mut(audit_id)
                .ok_or_else(|| SuperNodeError::AuditNotFound(audit_id.to_string()))?;
            // Re-check: another submission may have landed while signing.
            self.validate_submission(audit, auditor_id)?;

            audit.records.insert(
                auditor_id.clone(),
                AuditRecord {
                    auditor_id: auditor_id.clone(),
                    result,
                    evidence: evidence.to_string(),
                    submitted_at: now,
                    signature,
                },
            );

            if let Some(auditor) = state.super_nodes.get_mut(auditor_id) {
                auditor.audit_count += 1;
            }

            let audit = state.audits.get(audit_id).expect("present above");
            if audit.all_submitted() {
                Some(Self::finalize_audit(&self.config, &mut state, audit_id, now))
            } else {
                None
            }
        };
        self.persist();

        if let Some(finalized) = outcome {
            let callbacks = self.callbacks.read().clone();
            if let Some(cb) = callbacks.on_auditor_deviation {
                for deviation in finalized.deviations.clone() {
                    let cb = cb.clone();
                    dispatch(move || cb(deviation));
                }
            }
            if let Some(cb) = callbacks.on_audit_completed {
                let snapshot = finalized.clone();
                dispatch(move || cb(snapshot));
            }
            info!(
                audit_id,
                final_result = finalized.final_result.as_str(),
                deviations = finalized.deviations.len(),
                "Audit finalized"
            );
        }
        Ok(())
    }

    fn validate_submission(&self, audit: &MultiAudit, auditor_id: &NodeId) -> Result<()> {
        if audit.finalized {
            return Err(SuperNodeError::AuditFinalized(audit.id.clone()));
        }
        if !audit.auditors.contains(auditor_id) {
            return Err(SuperNodeError::NotAssigned {
                auditor: auditor_id.clone(),
                audit: audit.id.clone(),
            });
        }
        if audit.records.contains_key(auditor_id) {
            return Err(SuperNodeError::DuplicateSubmission {
                auditor: auditor_id.clone(),
                audit: audit.id.clone(),
            });
        }
        Ok(())
    }

    /// Tally the verdicts, set the final result, record deviations, and
    /// fold agreement into each auditor's rolling pass rate.
    fn finalize_audit(
        config: &SuperNodeConfig,
        state: &mut SuperNodeState,
        audit_id: &str,
        now: i64,
    ) -> MultiAudit {
        let audit = state.audits.get_mut(audit_id).expect("caller checked");

        let submitted = audit.records.len();
        let passes = audit
            .records
            .values()
            .filter(|r| r.result == AuditResult::Pass)
            .count();
        let pass_ratio = passes as f64 / submitted as f64;
        let final_result = if pass_ratio >= config.audit_threshold {
            AuditResult::Pass
        } else {
            AuditResult::Fail
        };

        audit.final_result = final_result;
        audit.finalized = true;

        for record in audit.records.values() {
            if record.result != final_result {
                let inverted = matches!(
                    (final_result, record.result),
                    (AuditResult::Pass, AuditResult::Fail)
                        | (AuditResult::Fail, AuditResult::Pass)
                );
                audit.deviations.push(AuditDeviation {
                    audit_id: audit.id.clone(),
                    auditor_id: record.auditor_id.clone(),
                    expected: final_result,
                    actual: record.result,
                    severity: if inverted {
                        DeviationSeverity::Severe
                    } else {
                        DeviationSeverity::Minor
                    },
                    detected_at: now,
                });
            }
        }

        let snapshot = audit.clone();

        // Rolling mean over the count incremented at submission. The
        // divisor matches the one used when the count was bumped, so a
        // submission never weighs twice.
        for record in snapshot.records.values() {
            if let Some(auditor) = state.super_nodes.get_mut(&record.auditor_id) {
                let n = auditor.audit_count.max(1) as f64;
                let agrees = if record.result == snapshot.final_result {
                    1.0
                } else {
                    0.0
                };
                auditor.pass_rate = (auditor.pass_rate * (n - 1.0) + agrees) / n;
            }
        }

        snapshot
    }

    // --- queries --------------------------------------------------------

    /// Deep copy of one audit
    pub fn get_audit(&self, audit_id: &str) -> Result<MultiAudit> {
        self.state
            .read()
            .audits
            .get(audit_id)
            .cloned()
            .ok_or_else(|| SuperNodeError::AuditNotFound(audit_id.to_string()))
    }

    /// Audits past their expiry that never reached finalization; their
    /// final result stays `pending`
    pub fn list_expired_audits(&self) -> Vec<MultiAudit> {
        let now = self.clock.now_unix();
        let mut audits: Vec<MultiAudit> = self
            .state
            .read()
            .audits
            .values()
            .filter(|a| !a.finalized && a.expires_at <= now)
            .cloned()
            .collect();
        audits.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        audits
    }

    /// Deep copy of one super-node
    pub fn get_super_node(&self, node_id: &NodeId) -> Option<SuperNode> {
        self.state.read().super_nodes.get(node_id).cloned()
    }

    /// Active committee members, ordered by node id
    pub fn list_active_super_nodes(&self) -> Vec<SuperNode> {
        let mut nodes: Vec<SuperNode> = self
            .state
            .read()
            .super_nodes
            .values()
            .filter(|sn| sn.active)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        nodes
    }

    /// Current candidate pool, ordered by node id
    pub fn list_candidates(&self) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> =
            self.state.read().candidates.values().cloned().collect();
        candidates.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        candidates
    }

    /// Deep copy of one election
    pub fn get_election(&self, election_id: &str) -> Result<Election> {
        self.state
            .read()
            .elections
            .get(election_id)
            .cloned()
            .ok_or_else(|| SuperNodeError::ElectionNotFound(election_id.to_string()))
    }

    /// Drop finalized audits and finalized elections older than the
    /// retention window. Returns (audits_removed, elections_removed).
    pub fn cleanup(&self) -> (usize, usize) {
        let cutoff = self.clock.now_unix() - self.config.retention_secs;
        let removed = {
            let mut state = self.state.write();
            let audits_before = state.audits.len();
            state
                .audits
                .retain(|_, a| !(a.finalized && a.created_at < cutoff));
            let elections_before = state.elections.len();
            state.elections.retain(|_, e| {
                !(e.status == ElectionStatus::Finalized
                    && e.finalized_at.map(|t| t < cutoff).unwrap_or(false))
            });
            (
                audits_before - state.audits.len(),
                elections_before - state.elections.len(),
            )
        };
        if removed.0 > 0 || removed.1 > 0 {
            self.persist();
            info!(audits = removed.0, elections = removed.1, "Cleanup removed finalized records");
        }
        removed
    }

    /// Best-effort persistence of the manager state
    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let encoded = {
            let state = self.state.read();
            match serde_json::to_string_pretty(&*state) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(error = %e, "Failed to encode super-node state");
                    return;
                }
            }
        };
        if let Err(e) = std::fs::write(path, encoded) {
            warn!(error = %e, path = %path.display(), "Failed to persist super-node state");
        }
    }
}
