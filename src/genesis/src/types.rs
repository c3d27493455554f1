//! Genesis, invitation, and join wire types
//!
//! Signature inputs are the pipe-joined canonical concatenation of the
//! scalar fields in declaration order; lists join their elements with
//! commas. Signatures and keys travel as lowercase hex.

use serde::{Deserialize, Serialize};

use daan_core::{NodeId, Reputation, Timestamp};

/// Membership status of an admitted node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Active,
    Left,
    Kicked,
}

/// A node admitted to the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmittedNode {
    pub id: NodeId,
    pub public_key: String,
    pub reputation: Reputation,
    pub status: MembershipStatus,
    pub joined_at: Timestamp,
    pub sponsor_id: NodeId,
}

/// The signed record defining a network's identity and initial parameters.
/// Immutable after initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisInfo {
    pub genesis_id: NodeId,
    pub genesis_public_key: String,
    pub created_at: Timestamp,
    pub network_name: String,
    pub network_version: String,
    /// Reputation granted to each newly admitted node
    pub initial_reputation: Reputation,
    /// Reputation gate for issuing invitations
    pub min_inviter_reputation: Reputation,
    pub invitation_valid_hours: i64,
    pub max_neighbors: usize,
    pub min_neighbors: usize,
    pub bootstrap_nodes: Vec<String>,
    /// Genesis-signer signature over the canonical concatenation
    pub signature: String,
}

impl GenesisInfo {
    /// Canonical signing input: every field except the signature
    pub fn canonical_string(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.genesis_id,
            self.genesis_public_key,
            self.created_at,
            self.network_name,
            self.network_version,
            self.initial_reputation,
            self.min_inviter_reputation,
            self.invitation_valid_hours,
            self.max_neighbors,
            self.min_neighbors,
            self.bootstrap_nodes.join(","),
        )
    }
}

/// A signed, time-bounded token permitting one public key to request
/// admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub inviter_id: NodeId,
    pub inviter_public_key: String,
    pub invitee_public_key: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub initial_reputation: Reputation,
    pub signature: String,
}

impl Invitation {
    /// Canonical signing input: every field except the signature
    pub fn canonical_string(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.inviter_id,
            self.inviter_public_key,
            self.invitee_public_key,
            self.issued_at,
            self.expires_at,
            self.initial_reputation,
        )
    }
}

/// Admission request presented by a new node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub invitation: Invitation,
    pub new_node_id: NodeId,
    /// The new node's public key, lowercase hex
    pub new_node_key: String,
    pub timestamp: Timestamp,
    /// New node's signature over the canonical concatenation
    pub signature: String,
}

impl JoinRequest {
    /// Canonical signing input: the request scalars in declaration order
    pub fn canonical_string(&self) -> String {
        format!("{}|{}|{}", self.new_node_id, self.new_node_key, self.timestamp)
    }
}

/// A peer suggested to a newly admitted node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedPeer {
    pub node_id: NodeId,
    pub public_key: String,
}

/// Signed admission response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub accepted: bool,
    pub reason: String,
    pub assigned_reputation: Reputation,
    pub recommended_neighbors: Vec<RecommendedPeer>,
    pub responder_id: NodeId,
    pub timestamp: Timestamp,
    pub signature: String,
}

impl JoinResponse {
    /// Canonical signing input: scalars in declaration order, neighbor ids
    /// joined with commas
    pub fn canonical_string(&self) -> String {
        let neighbors: Vec<&str> = self
            .recommended_neighbors
            .iter()
            .map(|p| p.node_id.as_str())
            .collect();
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.accepted,
            self.reason,
            self.assigned_reputation,
            neighbors.join(","),
            self.responder_id,
            self.timestamp,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invitation_canonical_order() {
        let inv = Invitation {
            inviter_id: "aa".repeat(16),
            inviter_public_key: "bb".repeat(32),
            invitee_public_key: "cc".repeat(32),
            issued_at: 100,
            expires_at: 200,
            initial_reputation: 1.0,
            signature: "ignored".to_string(),
        };
        let canonical = inv.canonical_string();
        assert!(canonical.starts_with(&"aa".repeat(16)));
        assert!(canonical.ends_with("|100|200|1"));
        // The signature never feeds the canonical form.
        assert!(!canonical.contains("ignored"));
    }

    #[test]
    fn test_genesis_canonical_includes_bootstrap_list() {
        let info = GenesisInfo {
            genesis_id: "aa".repeat(16),
            genesis_public_key: "bb".repeat(32),
            created_at: 1,
            network_name: "Net".to_string(),
            network_version: "1".to_string(),
            initial_reputation: 1.0,
            min_inviter_reputation: 10.0,
            invitation_valid_hours: 72,
            max_neighbors: 16,
            min_neighbors: 4,
            bootstrap_nodes: vec!["host-a:9000".to_string(), "host-b:9000".to_string()],
            signature: String::new(),
        };
        assert!(info.canonical_string().ends_with("host-a:9000,host-b:9000"));
    }
}
