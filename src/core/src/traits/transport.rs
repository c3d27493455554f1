//! Peer reachability seam
//!
//! The DHT discovery and wire protocol live outside the core. Admission
//! recommendation and liveness probes only need connect/find/list.

use crate::error::Result;
use crate::types::NodeId;
use async_trait::async_trait;

/// Address book entry for a reachable peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub node_id: NodeId,
    pub addresses: Vec<String>,
}

/// Peer reachability service consumed by the core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a connection to a known peer
    async fn connect(&self, peer: &PeerInfo) -> Result<()>;

    /// Resolve a peer id to its current addresses
    async fn find_peer(&self, peer_id: &NodeId) -> Result<Vec<String>>;

    /// Ids of currently connected peers
    async fn connected_peers(&self) -> Vec<NodeId>;
}
