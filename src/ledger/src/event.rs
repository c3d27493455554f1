//! Ledger event wire form and hash chaining

use serde::{Deserialize, Serialize};

use daan_core::{NodeId, Timestamp};
use daan_crypto::sha256_hex;

use crate::error::Result;

/// Event type tags. Serialized on the wire exactly as written in the
/// ledger files, e.g. `NODE_JOIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    NodeJoin,
    NodeLeave,
    ReputationChange,
    ConsensusDecision,
    Violation,
    LiabilitySettle,
    GuaranteeCreate,
    GuaranteeExpire,
    GuaranteeRevoke,
    CommitteeChange,
    CommitteeVote,
}

impl EventType {
    /// Wire tag for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NodeJoin => "NODE_JOIN",
            EventType::NodeLeave => "NODE_LEAVE",
            EventType::ReputationChange => "REPUTATION_CHANGE",
            EventType::ConsensusDecision => "CONSENSUS_DECISION",
            EventType::Violation => "VIOLATION",
            EventType::LiabilitySettle => "LIABILITY_SETTLE",
            EventType::GuaranteeCreate => "GUARANTEE_CREATE",
            EventType::GuaranteeExpire => "GUARANTEE_EXPIRE",
            EventType::GuaranteeRevoke => "GUARANTEE_REVOKE",
            EventType::CommitteeChange => "COMMITTEE_CHANGE",
            EventType::CommitteeVote => "COMMITTEE_VOTE",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single hash-chained ledger event.
///
/// Events are created by append, never mutated, never deleted. For every
/// event with `seq > 1`, `prev_hash` equals the predecessor's `hash`, and
/// `hash` is the SHA-256 of the canonical encoding of all fields except
/// `signature` and `hash` itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence, starting at 1
    pub seq: u64,

    /// Type tag
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Subject node of the event
    pub node_id: NodeId,

    /// JSON-encoded typed payload
    pub data: String,

    /// Unix seconds at creation
    pub timestamp: Timestamp,

    /// Identity that signed the event
    pub signer_id: NodeId,

    /// Hex signature over the event hash
    pub signature: String,

    /// Hash of the predecessor event, empty for seq 1
    pub prev_hash: String,

    /// Own hash, lowercase hex SHA-256 of the canonical encoding
    pub hash: String,
}

/// Canonical encoding input: the event fields in fixed wire order, minus
/// `signature` and `hash`.
#[derive(Serialize)]
struct CanonicalEvent<'a> {
    seq: u64,
    #[serde(rename = "type")]
    event_type: EventType,
    node_id: &'a str,
    data: &'a str,
    timestamp: Timestamp,
    signer_id: &'a str,
    prev_hash: &'a str,
}

impl Event {
    /// Canonical bytes hashed and signed for this event
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let canonical = CanonicalEvent {
            seq: self.seq,
            event_type: self.event_type,
            node_id: &self.node_id,
            data: &self.data,
            timestamp: self.timestamp,
            signer_id: &self.signer_id,
            prev_hash: &self.prev_hash,
        };
        Ok(serde_json::to_vec(&canonical)?)
    }

    /// Recompute the event hash from the canonical encoding
    pub fn compute_hash(&self) -> Result<String> {
        Ok(sha256_hex(&self.canonical_bytes()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            seq: 1,
            event_type: EventType::NodeJoin,
            node_id: "aa".repeat(16),
            data: "{}".to_string(),
            timestamp: 1_700_000_000,
            signer_id: "bb".repeat(16),
            signature: String::new(),
            prev_hash: String::new(),
            hash: String::new(),
        }
    }

    #[test]
    fn test_wire_tags() {
        assert_eq!(
            serde_json::to_string(&EventType::NodeJoin).unwrap(),
            "\"NODE_JOIN\""
        );
        assert_eq!(
            serde_json::from_str::<EventType>("\"GUARANTEE_REVOKE\"").unwrap(),
            EventType::GuaranteeRevoke
        );
        assert_eq!(EventType::LiabilitySettle.to_string(), "LIABILITY_SETTLE");
    }

    #[test]
    fn test_hash_excludes_signature() {
        let mut event = sample_event();
        let h1 = event.compute_hash().unwrap();
        event.signature = "deadbeef".to_string();
        event.hash = "feedface".to_string();
        assert_eq!(event.compute_hash().unwrap(), h1);
    }

    #[test]
    fn test_hash_binds_every_canonical_field() {
        let base = sample_event();
        let h0 = base.compute_hash().unwrap();

        let mut e = base.clone();
        e.seq = 2;
        assert_ne!(e.compute_hash().unwrap(), h0);

        let mut e = base.clone();
        e.data = "{\"x\":1}".to_string();
        assert_ne!(e.compute_hash().unwrap(), h0);

        let mut e = base.clone();
        e.timestamp += 1;
        assert_ne!(e.compute_hash().unwrap(), h0);

        let mut e = base;
        e.prev_hash = "00".repeat(32);
        assert_ne!(e.compute_hash().unwrap(), h0);
    }

    #[test]
    fn test_event_round_trips_through_json() {
        let mut event = sample_event();
        event.hash = event.compute_hash().unwrap();

        let encoded = serde_json::to_string(&event).unwrap();
        assert!(encoded.contains("\"type\":\"NODE_JOIN\""));

        let decoded: Event = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }
}
