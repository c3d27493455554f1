//! Append-only event ledger for the DAAN network
//!
//! Every consequential act in the network (join, leave, reputation change,
//! guarantee, violation, settlement, committee change, consensus decision)
//! is recorded as a signed, hash-chained event. The ledger is authoritative
//! per node; cross-node agreement happens through signed event exchange at
//! a higher layer.

pub mod error;
pub mod event;
pub mod ledger;
pub mod payload;
pub mod snapshot;

pub use error::{LedgerError, Result};
pub use event::{Event, EventType};
pub use ledger::{EventFilter, EventLedger};
pub use payload::{
    CommitteeChangePayload, CommitteeVotePayload, ConsensusDecisionPayload, EventPayload,
    GuaranteeCreatePayload, GuaranteeExpirePayload, GuaranteeRevokePayload, LiabilitySettlePayload,
    NodeJoinPayload, NodeLeavePayload, ReputationChangePayload, ViolationPayload,
};
pub use snapshot::{
    GuaranteeState, GuaranteeStatus, NodeState, NodeStatus, SnapshotManager, StateSnapshot,
};
