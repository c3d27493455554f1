//! Agent node orchestrator integrating all managers

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info, warn};

use daan_collateral::{CollateralConfig, CollateralManager, GuaranteeConfig, GuaranteePool};
use daan_core::NodeId;
use daan_crypto::{Ed25519Verifier, KeyDirectory, KeypairSigner, NodeKeypair};
use daan_genesis::{GenesisConfig, GenesisManager};
use daan_ledger::{
    CommitteeChangePayload, CommitteeVotePayload, EventLedger, EventPayload, SnapshotManager,
};
use daan_penalty::{AuditPenaltyIntegrator, IntegratorConfig, PenaltyPolicy};
use daan_reputation::{EngineConfig, ReputationEngine};
use daan_supernode::{SuperNodeConfig, SuperNodeManager};

use crate::config::NodeConfig;

/// Seconds between maintenance sweeps (term expiry, cleanup, collateral
/// expiry)
const MAINTENANCE_INTERVAL_SECS: u64 = 3600;

/// Seconds between snapshot checks
const SNAPSHOT_CHECK_INTERVAL_SECS: u64 = 60;

/// The assembled DAAN node: one identity, one ledger, and the full
/// accountability core wired together.
pub struct AgentNode {
    node_id: NodeId,
    config: NodeConfig,
    keypair: Arc<NodeKeypair>,
    directory: KeyDirectory,
    ledger: Arc<EventLedger>,
    snapshots: Arc<SnapshotManager>,
    collateral: Arc<CollateralManager>,
    guarantees: Arc<GuaranteePool>,
    genesis: Arc<GenesisManager>,
    reputation: Arc<ReputationEngine>,
    super_nodes: Arc<SuperNodeManager>,
    integrator: Arc<AuditPenaltyIntegrator>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl AgentNode {
    /// Build a node from configuration, creating the data directory and
    /// loading any persisted state.
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(config.data_dir()).context("Failed to create data directory")?;

        // 1. Identity.
        let keypair = Arc::new(
            NodeKeypair::load_or_generate(&config.key_path())
                .context("Failed to load node keypair")?,
        );
        let node_id = keypair.node_id();
        info!(node_id = %node_id, "Node identity loaded");

        let directory = KeyDirectory::new();
        directory
            .insert(&node_id, &keypair.public_key_bytes())
            .context("Failed to register own key")?;
        let signer = Arc::new(KeypairSigner::new(keypair.clone()));
        let verifier = Arc::new(Ed25519Verifier::new(directory.clone()));

        // 2. Ledger and snapshots.
        let ledger = Arc::new(
            EventLedger::open(&config.ledger_path())
                .context("Failed to open ledger")?
                .with_signer(signer.clone())
                .with_verifier(verifier),
        );
        let snapshots = Arc::new(
            SnapshotManager::new(&config.snapshot_dir(), config.snapshot.interval)
                .context("Failed to open snapshot store")?,
        );

        // 3. Collateral and guarantees.
        let collateral = Arc::new(
            CollateralManager::open(
                &config.collateral_path(),
                CollateralConfig {
                    min_amount: config.collateral.min_amount,
                    default_slash_ratio: config.collateral.default_slash_ratio,
                },
            )
            .context("Failed to open collateral state")?,
        );
        let guarantees = Arc::new(GuaranteePool::new(
            collateral.clone(),
            GuaranteeConfig {
                min_guarantor_collateral: config.collateral.min_guarantor_collateral,
            },
        ));

        // 4. Admission.
        let genesis = Arc::new(
            GenesisManager::new(
                GenesisConfig {
                    initial_reputation: config.genesis.initial_reputation,
                    genesis_reputation: config.genesis.genesis_reputation,
                    min_inviter_reputation: config.genesis.min_inviter_reputation,
                    invitation_valid_hours: config.genesis.invitation_valid_hours,
                    max_neighbors: config.genesis.max_neighbors,
                    min_neighbors: config.genesis.min_neighbors,
                    bootstrap_nodes: config.genesis.bootstrap_nodes.clone(),
                },
                keypair.clone(),
                directory.clone(),
            )
            .with_data_dir(config.data_dir().to_path_buf())
            .context("Failed to open admission state")?,
        );

        // 5. Reputation.
        let reputation = Arc::new(ReputationEngine::new(EngineConfig {
            alpha: config.reputation.alpha,
            lambda: config.reputation.lambda,
            delta: config.reputation.delta,
            half_life_secs: config.reputation.half_life_days * 24 * 3600,
            ..Default::default()
        }));

        // 6. Committee.
        let super_nodes = Arc::new(
            SuperNodeManager::open(
                &config.supernode_path(),
                SuperNodeConfig {
                    min_reputation: config.supernode.min_reputation,
                    min_stake: config.supernode.min_stake,
                    max_super_nodes: config.supernode.max_super_nodes,
                    election_duration_secs: config.supernode.election_duration_secs,
                    term_duration_secs: config.supernode.term_duration_secs,
                    auditors_per_task: config.supernode.auditors_per_task,
                    audit_threshold: config.supernode.audit_threshold,
                    rng_seed: config.supernode.rng_seed,
                    ..Default::default()
                },
            )
            .context("Failed to open super-node state")?
            .with_signer(signer),
        );

        // 7. Audit-penalty loop.
        let integrator = Arc::new(AuditPenaltyIntegrator::new(
            IntegratorConfig {
                policy: PenaltyPolicy::default(),
                auto_slash: config.penalty.auto_slash,
                auditor_purpose: config.penalty.auditor_purpose.clone(),
            },
            ledger.clone(),
            Some(collateral.clone()),
            super_nodes.clone(),
            node_id.clone(),
        ));
        integrator.clone().start();

        let node = Self {
            node_id,
            config,
            keypair,
            directory,
            ledger,
            snapshots,
            collateral,
            guarantees,
            genesis,
            reputation,
            super_nodes,
            integrator,
            shutdown_tx: None,
        };
        node.wire_committee_events();
        Ok(node)
    }

    /// Record committee membership changes on the ledger as they happen.
    fn wire_committee_events(&self) {
        let ledger = self.ledger.clone();
        let signer_id = self.node_id.clone();
        let term_secs = self.config.supernode.term_duration_secs;
        self.super_nodes
            .set_on_election_finalized(Arc::new(move |election| {
                let Some(first) = election.winners.first() else {
                    return;
                };
                let term_start = election.finalized_at.unwrap_or(election.started_at);
                let payload = EventPayload::CommitteeChange(CommitteeChangePayload {
                    added: election.winners.clone(),
                    removed: Vec::new(),
                    term_start,
                    term_end: term_start + term_secs,
                });
                if let Err(e) = ledger.append(first, &payload, &signer_id) {
                    error!(error = %e, "Failed to record committee change");
                }
            }));

        let ledger = self.ledger.clone();
        let signer_id = self.node_id.clone();
        self.super_nodes
            .set_on_super_node_removed(Arc::new(move |super_node| {
                let payload = EventPayload::CommitteeChange(CommitteeChangePayload {
                    added: Vec::new(),
                    removed: vec![super_node.node_id.clone()],
                    term_start: super_node.term_start,
                    term_end: super_node.term_end,
                });
                if let Err(e) = ledger.append(&super_node.node_id, &payload, &signer_id) {
                    error!(error = %e, "Failed to record committee removal");
                }
            }));
    }

    /// Bootstrap a brand-new network: this node becomes the genesis node
    pub fn init_network(&self) -> Result<()> {
        let genesis = self
            .genesis
            .init_genesis(&self.config.node.network_name, &self.config.node.network_version)?;
        info!(
            network = %genesis.network_name,
            genesis_id = %genesis.genesis_id,
            "Network genesis created"
        );
        Ok(())
    }

    /// Cast a committee vote and record it on the ledger
    pub fn vote_for_candidate(&self, candidate: &NodeId, weight: f64) -> Result<()> {
        self.super_nodes
            .vote_for_candidate(&self.node_id, candidate, weight)?;

        // Votes accumulate on candidates before an election captures
        // them, so there is no election id to bind yet.
        let payload = EventPayload::CommitteeVote(CommitteeVotePayload {
            election_id: String::new(),
            candidate_id: candidate.clone(),
            voter_id: self.node_id.clone(),
            weight,
        });
        if let Err(e) = self.ledger.append(candidate, &payload, &self.node_id) {
            warn!(error = %e, "Failed to record committee vote");
        }
        Ok(())
    }

    /// One pass of the periodic maintenance work
    pub fn maintenance_tick(&self) {
        let expired_terms = self.super_nodes.expire_terms();
        if !expired_terms.is_empty() {
            info!(count = expired_terms.len(), "Deactivated super-nodes past term");
        }
        self.super_nodes.close_expired_elections();
        self.super_nodes.cleanup();
        self.collateral.expire_collaterals();
    }

    /// Fold recent events into a snapshot when the interval has been
    /// crossed
    pub fn snapshot_tick(&self) {
        let last = self.ledger.last_sequence();
        let covered = self.snapshots.latest().map(|s| s.sequence).unwrap_or(0);
        if last >= covered + self.config.snapshot.interval {
            match self.snapshots.create(&self.ledger) {
                Ok(snapshot) => info!(sequence = snapshot.sequence, "Snapshot created"),
                Err(e) => warn!(error = %e, "Snapshot creation failed"),
            }
        }
    }

    /// Run the node until shutdown is requested
    pub async fn run(&mut self) -> Result<()> {
        info!(node_id = %self.node_id, "Agent node running");

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let mut maintenance = interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
        let mut snapshot_check = interval(Duration::from_secs(SNAPSHOT_CHECK_INTERVAL_SECS));
        // The first tick of a tokio interval fires immediately.
        maintenance.tick().await;
        snapshot_check.tick().await;

        loop {
            tokio::select! {
                _ = maintenance.tick() => self.maintenance_tick(),
                _ = snapshot_check.tick() => self.snapshot_tick(),
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal");
                    break;
                }
            }
        }

        self.final_persistence_pass();
        Ok(())
    }

    /// Request shutdown of a running node
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown...");
        match self.shutdown_tx.take() {
            // The run loop drains and does its own final pass; if it is
            // already gone, persist here instead.
            Some(tx) if tx.send(()).await.is_ok() => {}
            _ => self.final_persistence_pass(),
        }
        Ok(())
    }

    fn final_persistence_pass(&self) {
        self.ledger.persist();
        self.snapshot_tick();
        info!("Final persistence pass complete");
    }

    // --- manager surface for façades ------------------------------------

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn keypair(&self) -> &Arc<NodeKeypair> {
        &self.keypair
    }

    pub fn key_directory(&self) -> &KeyDirectory {
        &self.directory
    }

    pub fn ledger(&self) -> &Arc<EventLedger> {
        &self.ledger
    }

    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.snapshots
    }

    pub fn collateral(&self) -> &Arc<CollateralManager> {
        &self.collateral
    }

    pub fn guarantees(&self) -> &Arc<GuaranteePool> {
        &self.guarantees
    }

    pub fn genesis(&self) -> &Arc<GenesisManager> {
        &self.genesis
    }

    pub fn reputation(&self) -> &Arc<ReputationEngine> {
        &self.reputation
    }

    pub fn super_nodes(&self) -> &Arc<SuperNodeManager> {
        &self.super_nodes
    }

    pub fn penalty_integrator(&self) -> &Arc<AuditPenaltyIntegrator> {
        &self.integrator
    }
}
