//! Typed event payloads
//!
//! The wire carries payloads as a JSON-encoded string in the event's `data`
//! field. In memory they are a tagged union keyed by `EventType`, so replay
//! and consumers never touch untyped maps.

use serde::{Deserialize, Serialize};

use daan_core::{Amount, NodeId, Reputation, Timestamp};

use crate::error::Result;
use crate::event::EventType;

/// A node was admitted to the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeJoinPayload {
    /// Compressed public key, lowercase hex
    pub public_key: String,
    /// Sponsor that backed the admission
    pub sponsor_id: NodeId,
    /// Reputation granted on admission
    pub initial_reputation: Reputation,
}

/// A node left the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLeavePayload {
    pub reason: String,
}

/// A node's reputation moved by a significant delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationChangePayload {
    pub old_value: Reputation,
    pub new_value: Reputation,
    pub reason: String,
}

/// The committee settled a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusDecisionPayload {
    pub topic: String,
    pub decision: String,
    pub approvals: u32,
    pub rejections: u32,
}

/// A violation was detected and penalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationPayload {
    pub violation_type: String,
    pub severity: String,
    pub penalty: Reputation,
    pub evidence: serde_json::Value,
}

/// A sponsor's liability for a guaranteed node was settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiabilitySettlePayload {
    pub guarantee_id: String,
    pub sponsor_id: NodeId,
    pub sponsor_penalty: Reputation,
    pub amount: Amount,
}

/// A sponsor bound collateral behind a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuaranteeCreatePayload {
    pub guarantee_id: String,
    pub sponsor_id: NodeId,
    pub node_id: NodeId,
    pub amount: Amount,
    pub liability_ratio: f64,
    pub valid_until: Timestamp,
}

/// A guarantee reached the end of its life. `reason` is the terminal
/// status the guarantee moves to (`expired`, `completed`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuaranteeExpirePayload {
    pub guarantee_id: String,
    pub reason: String,
}

/// A sponsor withdrew a guarantee before its end of life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuaranteeRevokePayload {
    pub guarantee_id: String,
    pub reason: String,
}

/// The super-node committee changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeChangePayload {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub term_start: Timestamp,
    pub term_end: Timestamp,
}

/// A vote was cast in a committee election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeVotePayload {
    pub election_id: String,
    pub candidate_id: NodeId,
    pub voter_id: NodeId,
    pub weight: f64,
}

/// Tagged payload union. The tag is the event type; the decoder is chosen
/// by the tag during replay.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    NodeJoin(NodeJoinPayload),
    NodeLeave(NodeLeavePayload),
    ReputationChange(ReputationChangePayload),
    ConsensusDecision(ConsensusDecisionPayload),
    Violation(ViolationPayload),
    LiabilitySettle(LiabilitySettlePayload),
    GuaranteeCreate(GuaranteeCreatePayload),
    GuaranteeExpire(GuaranteeExpirePayload),
    GuaranteeRevoke(GuaranteeRevokePayload),
    CommitteeChange(CommitteeChangePayload),
    CommitteeVote(CommitteeVotePayload),
}

impl EventPayload {
    /// The event type this payload belongs to
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::NodeJoin(_) => EventType::NodeJoin,
            EventPayload::NodeLeave(_) => EventType::NodeLeave,
            EventPayload::ReputationChange(_) => EventType::ReputationChange,
            EventPayload::ConsensusDecision(_) => EventType::ConsensusDecision,
            EventPayload::Violation(_) => EventType::Violation,
            EventPayload::LiabilitySettle(_) => EventType::LiabilitySettle,
            EventPayload::GuaranteeCreate(_) => EventType::GuaranteeCreate,
            EventPayload::GuaranteeExpire(_) => EventType::GuaranteeExpire,
            EventPayload::GuaranteeRevoke(_) => EventType::GuaranteeRevoke,
            EventPayload::CommitteeChange(_) => EventType::CommitteeChange,
            EventPayload::CommitteeVote(_) => EventType::CommitteeVote,
        }
    }

    /// Encode the payload as the wire `data` string
    pub fn encode(&self) -> Result<String> {
        let encoded = match self {
            EventPayload::NodeJoin(p) => serde_json::to_string(p)?,
            EventPayload::NodeLeave(p) => serde_json::to_string(p)?,
            EventPayload::ReputationChange(p) => serde_json::to_string(p)?,
            EventPayload::ConsensusDecision(p) => serde_json::to_string(p)?,
            EventPayload::Violation(p) => serde_json::to_string(p)?,
            EventPayload::LiabilitySettle(p) => serde_json::to_string(p)?,
            EventPayload::GuaranteeCreate(p) => serde_json::to_string(p)?,
            EventPayload::GuaranteeExpire(p) => serde_json::to_string(p)?,
            EventPayload::GuaranteeRevoke(p) => serde_json::to_string(p)?,
            EventPayload::CommitteeChange(p) => serde_json::to_string(p)?,
            EventPayload::CommitteeVote(p) => serde_json::to_string(p)?,
        };
        Ok(encoded)
    }

    /// Decode a wire `data` string using the event type tag
    pub fn decode(event_type: EventType, data: &str) -> Result<Self> {
        let payload = match event_type {
            EventType::NodeJoin => EventPayload::NodeJoin(serde_json::from_str(data)?),
            EventType::NodeLeave => EventPayload::NodeLeave(serde_json::from_str(data)?),
            EventType::ReputationChange => {
                EventPayload::ReputationChange(serde_json::from_str(data)?)
            }
            EventType::ConsensusDecision => {
                EventPayload::ConsensusDecision(serde_json::from_str(data)?)
            }
            EventType::Violation => EventPayload::Violation(serde_json::from_str(data)?),
            EventType::LiabilitySettle => {
                EventPayload::LiabilitySettle(serde_json::from_str(data)?)
            }
            EventType::GuaranteeCreate => {
                EventPayload::GuaranteeCreate(serde_json::from_str(data)?)
            }
            EventType::GuaranteeExpire => {
                EventPayload::GuaranteeExpire(serde_json::from_str(data)?)
            }
            EventType::GuaranteeRevoke => {
                EventPayload::GuaranteeRevoke(serde_json::from_str(data)?)
            }
            EventType::CommitteeChange => {
                EventPayload::CommitteeChange(serde_json::from_str(data)?)
            }
            EventType::CommitteeVote => EventPayload::CommitteeVote(serde_json::from_str(data)?),
        };
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_by_tag() {
        let payload = EventPayload::Violation(ViolationPayload {
            violation_type: "audit_deviation".to_string(),
            severity: "severe".to_string(),
            penalty: 20.0,
            evidence: serde_json::json!({"audit_id": "a-1"}),
        });

        let data = payload.encode().unwrap();
        let decoded = EventPayload::decode(EventType::Violation, &data).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_decode_wrong_tag_fails() {
        let payload = EventPayload::NodeLeave(NodeLeavePayload {
            reason: "voluntary".to_string(),
        });
        let data = payload.encode().unwrap();
        assert!(EventPayload::decode(EventType::GuaranteeCreate, &data).is_err());
    }

    #[test]
    fn test_payload_type_tags() {
        let p = EventPayload::CommitteeVote(CommitteeVotePayload {
            election_id: "e-1".to_string(),
            candidate_id: "cand".to_string(),
            voter_id: "voter".to_string(),
            weight: 2.5,
        });
        assert_eq!(p.event_type(), EventType::CommitteeVote);
    }
}
