//! The genesis and admission manager

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use daan_core::traits::{Clock, SystemClock, Transport};
use daan_core::{NodeId, Reputation};
use daan_crypto::{node_id_from_public_key, verify_with_key_hex, KeyDirectory, NodeKeypair};

use crate::error::{GenesisError, Result};
use crate::types::{
    AdmittedNode, GenesisInfo, Invitation, JoinRequest, JoinResponse, MembershipStatus,
    RecommendedPeer,
};

/// Network parameters baked into the genesis record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Reputation granted to each newly admitted node
    pub initial_reputation: Reputation,

    /// Reputation the genesis node itself starts with
    pub genesis_reputation: Reputation,

    /// Reputation gate for issuing invitations
    pub min_inviter_reputation: Reputation,

    pub invitation_valid_hours: i64,
    pub max_neighbors: usize,
    pub min_neighbors: usize,
    pub bootstrap_nodes: Vec<String>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            initial_reputation: 1.0,
            genesis_reputation: 100.0,
            min_inviter_reputation: 10.0,
            invitation_valid_hours: 72,
            max_neighbors: 16,
            min_neighbors: 4,
            bootstrap_nodes: Vec::new(),
        }
    }
}

#[derive(Default)]
struct GenesisState {
    genesis: Option<GenesisInfo>,
    nodes: HashMap<NodeId, AdmittedNode>,
}

/// Initializes the network genesis, issues and verifies invitations, and
/// processes join requests into the admitted-node set.
pub struct GenesisManager {
    config: GenesisConfig,
    keypair: Arc<NodeKeypair>,
    directory: KeyDirectory,
    transport: Option<Arc<dyn Transport>>,
    clock: Arc<dyn Clock>,
    state: RwLock<GenesisState>,
    data_dir: Option<PathBuf>,
}

impl GenesisManager {
    pub fn new(config: GenesisConfig, keypair: Arc<NodeKeypair>, directory: KeyDirectory) -> Self {
        Self {
            config,
            keypair,
            directory,
            transport: None,
            clock: Arc::new(SystemClock),
            state: RwLock::new(GenesisState::default()),
            data_dir: None,
        }
    }

    /// Attach the peer-reachability service used for neighbor
    /// recommendation
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the clock (tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Persist state under `dir` (`genesis.json`, `joined_nodes.json`),
    /// loading any prior state found there
    pub fn with_data_dir(mut self, dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;

        let genesis_path = dir.join("genesis.json");
        if genesis_path.exists() {
            let contents = std::fs::read_to_string(&genesis_path)?;
            let genesis: GenesisInfo = serde_json::from_str(&contents)?;
            self.install_genesis(genesis)?;
        }

        let nodes_path = dir.join("joined_nodes.json");
        if nodes_path.exists() {
            let contents = std::fs::read_to_string(&nodes_path)?;
            let nodes: HashMap<NodeId, AdmittedNode> = serde_json::from_str(&contents)?;
            for node in nodes.values() {
                if let Err(e) = self.directory.insert_hex(&node.id, &node.public_key) {
                    warn!(node_id = %node.id, error = %e, "Skipping node with bad stored key");
                }
            }
            self.state.write().nodes = nodes;
        }

        self.data_dir = Some(dir);
        Ok(self)
    }

    /// Initialize the network genesis exactly once.
    ///
    /// The local keypair becomes the genesis identity; the admitted-node
    /// set is seeded with the genesis node at its configured reputation.
    pub fn init_genesis(&self, network_name: &str, network_version: &str) -> Result<GenesisInfo> {
        {
            let state = self.state.read();
            if let Some(existing) = &state.genesis {
                return Err(GenesisError::AlreadyInitialized(
                    existing.network_name.clone(),
                ));
            }
        }

        let now = self.clock.now_unix();
        let genesis_id = self.keypair.node_id();
        let mut genesis = GenesisInfo {
            genesis_id: genesis_id.clone(),
            genesis_public_key: self.keypair.public_key_hex(),
            created_at: now,
            network_name: network_name.to_string(),
            network_version: network_version.to_string(),
            initial_reputation: self.config.initial_reputation,
            min_inviter_reputation: self.config.min_inviter_reputation,
            invitation_valid_hours: self.config.invitation_valid_hours,
            max_neighbors: self.config.max_neighbors,
            min_neighbors: self.config.min_neighbors,
            bootstrap_nodes: self.config.bootstrap_nodes.clone(),
            signature: String::new(),
        };
        genesis.signature = self.keypair.sign_hex(genesis.canonical_string().as_bytes());

        self.directory
            .insert_hex(&genesis_id, &genesis.genesis_public_key)
            .map_err(|e| GenesisError::InvalidInput(e.to_string()))?;

        {
            let mut state = self.state.write();
            if state.genesis.is_some() {
                return Err(GenesisError::AlreadyInitialized(network_name.to_string()));
            }
            state.genesis = Some(genesis.clone());
            state.nodes.insert(
                genesis_id.clone(),
                AdmittedNode {
                    id: genesis_id.clone(),
                    public_key: genesis.genesis_public_key.clone(),
                    reputation: self.config.genesis_reputation,
                    status: MembershipStatus::Active,
                    joined_at: now,
                    sponsor_id: genesis_id.clone(),
                },
            );
        }
        self.persist();

        info!(network = network_name, genesis_id = %genesis_id, "Genesis initialized");
        Ok(genesis)
    }

    /// Verify and install a genesis record received from elsewhere
    pub fn load_genesis(&self, bytes: &[u8]) -> Result<GenesisInfo> {
        let genesis: GenesisInfo = serde_json::from_slice(bytes)?;
        self.install_genesis(genesis.clone())?;
        self.persist();
        Ok(genesis)
    }

    fn install_genesis(&self, genesis: GenesisInfo) -> Result<()> {
        if !verify_with_key_hex(
            &genesis.genesis_public_key,
            genesis.canonical_string().as_bytes(),
            &genesis.signature,
        ) {
            return Err(GenesisError::BadGenesisSignature);
        }
        if node_id_from_public_key(
            &hex::decode(&genesis.genesis_public_key)
                .map_err(|e| GenesisError::InvalidInput(e.to_string()))?,
        ) != genesis.genesis_id
        {
            return Err(GenesisError::NodeIdMismatch {
                node_id: genesis.genesis_id.clone(),
            });
        }

        self.directory
            .insert_hex(&genesis.genesis_id, &genesis.genesis_public_key)
            .map_err(|e| GenesisError::InvalidInput(e.to_string()))?;

        let mut state = self.state.write();
        let genesis_id = genesis.genesis_id.clone();
        let public_key = genesis.genesis_public_key.clone();
        let created_at = genesis.created_at;
        state.genesis = Some(genesis);
        state
            .nodes
            .entry(genesis_id.clone())
            .or_insert_with(|| AdmittedNode {
                id: genesis_id.clone(),
                public_key,
                reputation: self.config.genesis_reputation,
                status: MembershipStatus::Active,
                joined_at: created_at,
                sponsor_id: genesis_id,
            });
        Ok(())
    }

    /// Issue an invitation for the given public key.
    ///
    /// The local node must be admitted and its reputation must meet the
    /// genesis gate.
    pub fn create_invitation(&self, invitee_public_key_hex: &str) -> Result<Invitation> {
        hex::decode(invitee_public_key_hex)
            .map_err(|e| GenesisError::InvalidInput(format!("invitee key: {e}")))?;

        let (min_inviter, valid_hours, initial_reputation) = {
            let state = self.state.read();
            let genesis = state.genesis.as_ref().ok_or(GenesisError::NotInitialized)?;
            (
                genesis.min_inviter_reputation,
                genesis.invitation_valid_hours,
                genesis.initial_reputation,
            )
        };

        let inviter_id = self.keypair.node_id();
        let reputation = {
            let state = self.state.read();
            let node = state
                .nodes
                .get(&inviter_id)
                .filter(|n| n.status == MembershipStatus::Active)
                .ok_or_else(|| GenesisError::NotAdmitted(inviter_id.clone()))?;
            node.reputation
        };
        if reputation < min_inviter {
            return Err(GenesisError::InviterNotQualified {
                required: min_inviter,
                actual: reputation,
            });
        }

        let now = self.clock.now_unix();
        let mut invitation = Invitation {
            inviter_id,
            inviter_public_key: self.keypair.public_key_hex(),
            invitee_public_key: invitee_public_key_hex.to_string(),
            issued_at: now,
            expires_at: now + valid_hours * 3600,
            initial_reputation,
            signature: String::new(),
        };
        invitation.signature = self
            .keypair
            .sign_hex(invitation.canonical_string().as_bytes());

        info!(inviter = %invitation.inviter_id, expires_at = invitation.expires_at, "Invitation issued");
        Ok(invitation)
    }

    /// Check an invitation: signature, expiry, and inviter qualification
    pub fn verify_invitation(&self, invitation: &Invitation) -> Result<()> {
        let now = self.clock.now_unix();
        if now > invitation.expires_at {
            return Err(GenesisError::InvitationExpired {
                expires_at: invitation.expires_at,
                now,
            });
        }

        if !verify_with_key_hex(
            &invitation.inviter_public_key,
            invitation.canonical_string().as_bytes(),
            &invitation.signature,
        ) {
            return Err(GenesisError::BadInvitationSignature);
        }

        let state = self.state.read();
        let genesis = state.genesis.as_ref().ok_or(GenesisError::NotInitialized)?;
        let inviter = state
            .nodes
            .get(&invitation.inviter_id)
            .filter(|n| n.status == MembershipStatus::Active)
            .ok_or_else(|| GenesisError::NotAdmitted(invitation.inviter_id.clone()))?;
        if inviter.public_key != invitation.inviter_public_key {
            return Err(GenesisError::BadInvitationSignature);
        }
        if inviter.reputation < genesis.min_inviter_reputation {
            return Err(GenesisError::InviterNotQualified {
                required: genesis.min_inviter_reputation,
                actual: inviter.reputation,
            });
        }
        Ok(())
    }

    /// Process a join request: verify the invitation and the request, admit
    /// the node, and answer with recommended neighbors.
    pub async fn process_join_request(&self, request: &JoinRequest) -> Result<JoinResponse> {
        self.verify_invitation(&request.invitation)?;

        let key_bytes = hex::decode(&request.new_node_key)
            .map_err(|e| GenesisError::InvalidInput(format!("new node key: {e}")))?;
        if node_id_from_public_key(&key_bytes) != request.new_node_id {
            return Err(GenesisError::NodeIdMismatch {
                node_id: request.new_node_id.clone(),
            });
        }
        if request.invitation.invitee_public_key != request.new_node_key {
            return Err(GenesisError::InviteeKeyMismatch);
        }
        if !verify_with_key_hex(
            &request.new_node_key,
            request.canonical_string().as_bytes(),
            &request.signature,
        ) {
            return Err(GenesisError::BadJoinSignature);
        }

        let now = self.clock.now_unix();
        {
            let mut state = self.state.write();
            if state.nodes.contains_key(&request.new_node_id) {
                return Err(GenesisError::AlreadyAdmitted(request.new_node_id.clone()));
            }
            state.nodes.insert(
                request.new_node_id.clone(),
                AdmittedNode {
                    id: request.new_node_id.clone(),
                    public_key: request.new_node_key.clone(),
                    reputation: request.invitation.initial_reputation,
                    status: MembershipStatus::Active,
                    joined_at: now,
                    sponsor_id: request.invitation.inviter_id.clone(),
                },
            );
        }

        self.directory
            .insert_hex(&request.new_node_id, &request.new_node_key)
            .map_err(|e| GenesisError::InvalidInput(e.to_string()))?;
        self.persist();

        let neighbors = self.recommend_neighbors(&request.new_node_id).await;

        let mut response = JoinResponse {
            accepted: true,
            reason: String::new(),
            assigned_reputation: request.invitation.initial_reputation,
            recommended_neighbors: neighbors,
            responder_id: self.keypair.node_id(),
            timestamp: now,
            signature: String::new(),
        };
        response.signature = self
            .keypair
            .sign_hex(response.canonical_string().as_bytes());

        info!(
            node_id = %request.new_node_id,
            sponsor = %request.invitation.inviter_id,
            reputation = response.assigned_reputation,
            "Node admitted"
        );
        Ok(response)
    }

    /// Up to `2 * min_neighbors` active nodes, the joiner excluded.
    /// Currently connected peers are preferred when a transport is wired.
    async fn recommend_neighbors(&self, exclude: &NodeId) -> Vec<RecommendedPeer> {
        let limit = 2 * self.config.min_neighbors;

        let connected: Vec<NodeId> = match &self.transport {
            Some(transport) => transport.connected_peers().await,
            None => Vec::new(),
        };

        let state = self.state.read();
        let mut candidates: Vec<&AdmittedNode> = state
            .nodes
            .values()
            .filter(|n| n.status == MembershipStatus::Active && n.id != *exclude)
            .collect();
        candidates.sort_by(|a, b| {
            let a_connected = connected.contains(&a.id);
            let b_connected = connected.contains(&b.id);
            b_connected
                .cmp(&a_connected)
                .then(b.reputation.partial_cmp(&a.reputation).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.id.cmp(&b.id))
        });

        candidates
            .into_iter()
            .take(limit)
            .map(|n| RecommendedPeer {
                node_id: n.id.clone(),
                public_key: n.public_key.clone(),
            })
            .collect()
    }

    /// Adjust an admitted node's reputation by `delta`, clamped at zero
    pub fn update_reputation(&self, node_id: &NodeId, delta: Reputation) -> Result<Reputation> {
        let updated = {
            let mut state = self.state.write();
            let node = state
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| GenesisError::NotAdmitted(node_id.clone()))?;
            node.reputation = (node.reputation + delta).max(0.0);
            node.reputation
        };
        self.persist();
        Ok(updated)
    }

    /// Mark a node as having left (or been kicked from) the network
    pub fn remove_node(&self, node_id: &NodeId, kicked: bool) -> Result<()> {
        {
            let mut state = self.state.write();
            let node = state
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| GenesisError::NotAdmitted(node_id.clone()))?;
            node.status = if kicked {
                MembershipStatus::Kicked
            } else {
                MembershipStatus::Left
            };
        }
        self.persist();
        info!(node_id = %node_id, kicked, "Node removed");
        Ok(())
    }

    /// True iff the node joined and has not left or been kicked
    pub fn is_admitted(&self, node_id: &NodeId) -> bool {
        self.state
            .read()
            .nodes
            .get(node_id)
            .map(|n| n.status == MembershipStatus::Active)
            .unwrap_or(false)
    }

    /// Deep copy of one admitted node
    pub fn get_node(&self, node_id: &NodeId) -> Result<AdmittedNode> {
        self.state
            .read()
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| GenesisError::NotAdmitted(node_id.clone()))
    }

    /// Deep copies of all known nodes
    pub fn list_nodes(&self) -> Vec<AdmittedNode> {
        let mut nodes: Vec<AdmittedNode> = self.state.read().nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// The installed genesis record, if any
    pub fn genesis(&self) -> Option<GenesisInfo> {
        self.state.read().genesis.clone()
    }

    /// The local node's id
    pub fn local_node_id(&self) -> NodeId {
        self.keypair.node_id()
    }

    /// Best-effort persistence of genesis and the admitted-node set
    fn persist(&self) {
        let Some(dir) = &self.data_dir else {
            return;
        };
        let state = self.state.read();

        if let Some(genesis) = &state.genesis {
            match serde_json::to_string_pretty(genesis) {
                Ok(encoded) => {
                    if let Err(e) = std::fs::write(dir.join("genesis.json"), encoded) {
                        warn!(error = %e, "Failed to persist genesis");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode genesis"),
            }
        }

        match serde_json::to_string_pretty(&state.nodes) {
            Ok(encoded) => {
                if let Err(e) = std::fs::write(dir.join("joined_nodes.json"), encoded) {
                    warn!(error = %e, "Failed to persist admitted nodes");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode admitted nodes"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> GenesisManager {
        GenesisManager::new(
            GenesisConfig::default(),
            Arc::new(NodeKeypair::generate()),
            KeyDirectory::new(),
        )
    }

    #[test]
    fn test_init_genesis_once() {
        let m = manager();
        let genesis = m.init_genesis("Net", "1").unwrap();
        assert_eq!(genesis.network_name, "Net");
        assert_eq!(genesis.genesis_id, m.local_node_id());

        let err = m.init_genesis("Net", "1").unwrap_err();
        assert!(matches!(err, GenesisError::AlreadyInitialized(_)));

        // Genesis node is admitted at its configured reputation.
        let node = m.get_node(&m.local_node_id()).unwrap();
        assert_eq!(node.reputation, 100.0);
        assert_eq!(node.status, MembershipStatus::Active);
    }

    #[test]
    fn test_load_genesis_verifies_signature() {
        let issuer = manager();
        let genesis = issuer.init_genesis("Net", "1").unwrap();
        let bytes = serde_json::to_vec(&genesis).unwrap();

        let receiver = manager();
        let loaded = receiver.load_genesis(&bytes).unwrap();
        assert_eq!(loaded, genesis);
        assert!(receiver.is_admitted(&genesis.genesis_id));

        // A tampered record is rejected.
        let mut forged = genesis.clone();
        forged.min_inviter_reputation = 0.0;
        let err = manager()
            .load_genesis(&serde_json::to_vec(&forged).unwrap())
            .unwrap_err();
        assert!(matches!(err, GenesisError::BadGenesisSignature));
    }

    #[test]
    fn test_create_invitation_requires_reputation() {
        let m = manager();
        m.init_genesis("Net", "1").unwrap();
        let invitee = NodeKeypair::generate();

        // Genesis node has reputation 100, gate is 10.
        let invitation = m.create_invitation(&invitee.public_key_hex()).unwrap();
        m.verify_invitation(&invitation).unwrap();

        // Drop the local node below the gate.
        m.update_reputation(&m.local_node_id(), -95.0).unwrap();
        let err = m.create_invitation(&invitee.public_key_hex()).unwrap_err();
        assert!(matches!(err, GenesisError::InviterNotQualified { .. }));
    }

    #[test]
    fn test_verify_invitation_rejects_tampering() {
        let m = manager();
        m.init_genesis("Net", "1").unwrap();
        let invitee = NodeKeypair::generate();
        let mut invitation = m.create_invitation(&invitee.public_key_hex()).unwrap();

        invitation.initial_reputation = 50.0;
        assert!(matches!(
            m.verify_invitation(&invitation).unwrap_err(),
            GenesisError::BadInvitationSignature
        ));
    }

    #[test]
    fn test_reputation_clamped_at_zero() {
        let m = manager();
        m.init_genesis("Net", "1").unwrap();
        let updated = m.update_reputation(&m.local_node_id(), -1000.0).unwrap();
        assert_eq!(updated, 0.0);
    }

    #[test]
    fn test_remove_node() {
        let m = manager();
        m.init_genesis("Net", "1").unwrap();
        let id = m.local_node_id();
        m.remove_node(&id, true).unwrap();
        assert!(!m.is_admitted(&id));
        assert_eq!(m.get_node(&id).unwrap().status, MembershipStatus::Kicked);
    }
}
