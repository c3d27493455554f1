//! The append-only, hash-chained event log

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use daan_core::traits::{Clock, Signer, SystemClock, Verifier};
use daan_core::NodeId;

use crate::error::{LedgerError, Result};
use crate::event::{Event, EventType};
use crate::payload::EventPayload;

/// Filter for `EventLedger::query`. Empty fields match everything; results
/// are always ordered by sequence.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub node_id: Option<NodeId>,
    pub signer_id: Option<NodeId>,
    pub types: Option<Vec<EventType>>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub start_seq: Option<u64>,
    pub end_seq: Option<u64>,
}

#[derive(Default)]
struct LedgerInner {
    events: Vec<Event>,
    by_node: HashMap<NodeId, Vec<u64>>,
    by_type: HashMap<EventType, Vec<u64>>,
    last_seq: u64,
    last_hash: String,
}

impl LedgerInner {
    fn index(&mut self, event: &Event) {
        self.by_node
            .entry(event.node_id.clone())
            .or_default()
            .push(event.seq);
        self.by_type
            .entry(event.event_type)
            .or_default()
            .push(event.seq);
        self.last_seq = event.seq;
        self.last_hash = event.hash.clone();
    }
}

/// The per-node authoritative event log.
///
/// Writes serialize behind a writer lock; reads proceed concurrently. The
/// signer is called with the lock released (it may block on a remote
/// backend), so append re-checks the chain head before committing.
pub struct EventLedger {
    inner: RwLock<LedgerInner>,
    signer: Option<Arc<dyn Signer>>,
    verifier: Option<Arc<dyn Verifier>>,
    clock: Arc<dyn Clock>,
    path: Option<PathBuf>,
}

impl EventLedger {
    /// Create an empty in-memory ledger
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerInner::default()),
            signer: None,
            verifier: None,
            clock: Arc::new(SystemClock),
            path: None,
        }
    }

    /// Open a ledger persisted at `path`, loading any existing events and
    /// rebuilding the indices
    pub fn open(path: &Path) -> Result<Self> {
        let ledger = Self::new().with_path(path.to_path_buf());

        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let events: Vec<Event> = serde_json::from_str(&contents)?;
            let mut inner = ledger.inner.write();
            for event in events {
                inner.events.push(event.clone());
                inner.index(&event);
            }
            debug!(count = inner.events.len(), path = %path.display(), "Loaded ledger");
        }

        Ok(ledger)
    }

    /// Attach the signer used for locally appended events
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Attach the verifier used for events arriving from peers
    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Override the clock (tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    /// Append a locally produced event.
    ///
    /// Assigns the next sequence, links the previous hash, hashes the
    /// canonical encoding, and signs the hash. The signer runs outside the
    /// writer lock; if another append slipped in meanwhile the event is
    /// rebuilt against the new chain head.
    pub fn append(
        &self,
        subject: &NodeId,
        payload: &EventPayload,
        signer_id: &NodeId,
    ) -> Result<Event> {
        let data = payload.encode()?;
        let event_type = payload.event_type();

        let event = loop {
            let (seq, prev_hash) = {
                let inner = self.inner.read();
                (inner.last_seq + 1, inner.last_hash.clone())
            };

            let mut event = Event {
                seq,
                event_type,
                node_id: subject.clone(),
                data: data.clone(),
                timestamp: self.clock.now_unix(),
                signer_id: signer_id.clone(),
                signature: String::new(),
                prev_hash,
                hash: String::new(),
            };
            event.hash = event.compute_hash()?;

            // Sign with the lock released; the signer may block.
            if let Some(signer) = &self.signer {
                event.signature = signer
                    .sign(event.hash.as_bytes())
                    .map_err(|e| LedgerError::Signing(e.to_string()))?;
            }

            let mut inner = self.inner.write();
            if inner.last_seq + 1 == event.seq && inner.last_hash == event.prev_hash {
                inner.events.push(event.clone());
                inner.index(&event);
                break event;
            }
            // Chain head moved while signing; rebuild against it.
        };

        self.persist();
        Ok(event)
    }

    /// Append an event produced and signed by a peer.
    ///
    /// The event must extend this ledger's chain exactly: next sequence,
    /// matching previous hash, correct own hash, and (when a verifier is
    /// configured) a valid signature. Any mismatch rejects the event and
    /// leaves in-memory state untouched.
    pub fn append_signed(&self, event: Event) -> Result<Event> {
        let recomputed = event.compute_hash()?;
        if recomputed != event.hash {
            return Err(LedgerError::InvariantViolation {
                seq: event.seq,
                reason: format!("hash mismatch: stored {}, computed {}", event.hash, recomputed),
            });
        }

        if let Some(verifier) = &self.verifier {
            if !verifier.verify(&event.signer_id, event.hash.as_bytes(), &event.signature) {
                return Err(LedgerError::BadSignature {
                    seq: event.seq,
                    signer_id: event.signer_id.clone(),
                });
            }
        }

        {
            let mut inner = self.inner.write();
            if event.seq != inner.last_seq + 1 {
                return Err(LedgerError::InvariantViolation {
                    seq: event.seq,
                    reason: format!("expected seq {}, got {}", inner.last_seq + 1, event.seq),
                });
            }
            if event.prev_hash != inner.last_hash {
                return Err(LedgerError::InvariantViolation {
                    seq: event.seq,
                    reason: "prev_hash does not match chain head".to_string(),
                });
            }
            inner.events.push(event.clone());
            inner.index(&event);
        }

        self.persist();
        Ok(event)
    }

    /// Event at the given sequence
    pub fn get_by_seq(&self, seq: u64) -> Result<Event> {
        let inner = self.inner.read();
        if seq == 0 || seq > inner.last_seq {
            return Err(LedgerError::NotFound(seq));
        }
        Ok(inner.events[(seq - 1) as usize].clone())
    }

    /// Events with sequence in `[start, end]`, clamped to the chain
    pub fn get_range(&self, start: u64, end: u64) -> Vec<Event> {
        let inner = self.inner.read();
        if start > end || start > inner.last_seq {
            return Vec::new();
        }
        let lo = start.max(1) as usize - 1;
        let hi = end.min(inner.last_seq) as usize;
        inner.events[lo..hi].to_vec()
    }

    /// Events whose subject is `node_id`, in sequence order
    pub fn get_by_node(&self, node_id: &str) -> Vec<Event> {
        let inner = self.inner.read();
        inner
            .by_node
            .get(node_id)
            .map(|seqs| {
                seqs.iter()
                    .map(|&seq| inner.events[(seq - 1) as usize].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Events of the given type, in sequence order
    pub fn get_by_type(&self, event_type: EventType) -> Vec<Event> {
        let inner = self.inner.read();
        inner
            .by_type
            .get(&event_type)
            .map(|seqs| {
                seqs.iter()
                    .map(|&seq| inner.events[(seq - 1) as usize].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The most recent `n` events, in sequence order
    pub fn get_recent(&self, n: usize) -> Vec<Event> {
        let inner = self.inner.read();
        let skip = inner.events.len().saturating_sub(n);
        inner.events[skip..].to_vec()
    }

    /// Linear scan over events matching every set filter field
    pub fn query(&self, filter: &EventFilter) -> Vec<Event> {
        let inner = self.inner.read();
        inner
            .events
            .iter()
            .filter(|e| {
                filter.node_id.as_deref().map_or(true, |id| e.node_id == id)
                    && filter.signer_id.as_deref().map_or(true, |id| e.signer_id == id)
                    && filter
                        .types
                        .as_ref()
                        .map_or(true, |ts| ts.contains(&e.event_type))
                    && filter.start_time.map_or(true, |t| e.timestamp >= t)
                    && filter.end_time.map_or(true, |t| e.timestamp <= t)
                    && filter.start_seq.map_or(true, |s| e.seq >= s)
                    && filter.end_seq.map_or(true, |s| e.seq <= s)
            })
            .cloned()
            .collect()
    }

    /// Sequence of the newest event, 0 when empty
    pub fn last_sequence(&self) -> u64 {
        self.inner.read().last_seq
    }

    /// Hash of the newest event, empty when the ledger is empty
    pub fn last_hash(&self) -> String {
        self.inner.read().last_hash.clone()
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().events.is_empty()
    }

    /// Walk the full chain asserting contiguous sequences, prev-hash
    /// linkage, and recomputed hashes
    pub fn verify_chain(&self) -> Result<()> {
        let inner = self.inner.read();
        let mut prev_hash = String::new();
        for (i, event) in inner.events.iter().enumerate() {
            let expected_seq = (i + 1) as u64;
            if event.seq != expected_seq {
                return Err(LedgerError::InvariantViolation {
                    seq: event.seq,
                    reason: format!("expected seq {expected_seq}"),
                });
            }
            if event.prev_hash != prev_hash {
                return Err(LedgerError::InvariantViolation {
                    seq: event.seq,
                    reason: "prev_hash link broken".to_string(),
                });
            }
            let recomputed = event.compute_hash()?;
            if recomputed != event.hash {
                return Err(LedgerError::InvariantViolation {
                    seq: event.seq,
                    reason: "stored hash does not match canonical encoding".to_string(),
                });
            }
            prev_hash = event.hash.clone();
        }
        Ok(())
    }

    /// Mutate a stored event in place. Test-only: used to exercise tamper
    /// detection.
    #[cfg(test)]
    pub(crate) fn tamper_with(&self, seq: u64, f: impl FnOnce(&mut Event)) {
        let mut inner = self.inner.write();
        if let Some(event) = inner.events.get_mut((seq - 1) as usize) {
            f(event);
        }
    }

    /// Rewrite the on-disk log. Best-effort: persistence failure is logged
    /// and the in-memory log stays authoritative for the process.
    pub fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let encoded = {
            let inner = self.inner.read();
            match serde_json::to_string_pretty(&inner.events) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(error = %e, "Failed to encode ledger for persistence");
                    return;
                }
            }
        };
        if let Err(e) = std::fs::write(path, encoded) {
            warn!(error = %e, path = %path.display(), "Failed to persist ledger");
        }
    }
}

impl Default for EventLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{NodeJoinPayload, NodeLeavePayload, ViolationPayload};

    fn join_payload() -> EventPayload {
        EventPayload::NodeJoin(NodeJoinPayload {
            public_key: "ab".repeat(32),
            sponsor_id: "cd".repeat(16),
            initial_reputation: 1.0,
        })
    }

    fn leave_payload() -> EventPayload {
        EventPayload::NodeLeave(NodeLeavePayload {
            reason: "voluntary".to_string(),
        })
    }

    #[test]
    fn test_append_chains_events() {
        let ledger = EventLedger::new();
        let node = "aa".repeat(16);
        let signer = "ff".repeat(16);

        let e1 = ledger.append(&node, &join_payload(), &signer).unwrap();
        let e2 = ledger.append(&node, &leave_payload(), &signer).unwrap();

        assert_eq!(e1.seq, 1);
        assert_eq!(e1.prev_hash, "");
        assert_eq!(e2.seq, 2);
        assert_eq!(e2.prev_hash, e1.hash);
        assert_eq!(ledger.last_sequence(), 2);
        assert_eq!(ledger.last_hash(), e2.hash);
        ledger.verify_chain().unwrap();
    }

    #[test]
    fn test_indices() {
        let ledger = EventLedger::new();
        let alice = "aa".repeat(16);
        let bob = "bb".repeat(16);
        let signer = "ff".repeat(16);

        ledger.append(&alice, &join_payload(), &signer).unwrap();
        ledger.append(&bob, &join_payload(), &signer).unwrap();
        ledger.append(&alice, &leave_payload(), &signer).unwrap();

        assert_eq!(ledger.get_by_node(&alice).len(), 2);
        assert_eq!(ledger.get_by_node(&bob).len(), 1);
        assert_eq!(ledger.get_by_type(EventType::NodeJoin).len(), 2);
        assert_eq!(ledger.get_by_type(EventType::NodeLeave).len(), 1);
        assert!(ledger.get_by_type(EventType::Violation).is_empty());
    }

    #[test]
    fn test_get_range_and_recent() {
        let ledger = EventLedger::new();
        let node = "aa".repeat(16);
        let signer = "ff".repeat(16);
        for _ in 0..5 {
            ledger.append(&node, &join_payload(), &signer).unwrap();
        }

        let range = ledger.get_range(2, 4);
        assert_eq!(range.len(), 3);
        assert_eq!(range[0].seq, 2);
        assert_eq!(range[2].seq, 4);

        let recent = ledger.get_recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].seq, 4);
        assert_eq!(recent[1].seq, 5);

        assert!(ledger.get_range(10, 20).is_empty());
    }

    #[test]
    fn test_query_filters() {
        let ledger = EventLedger::new();
        let alice = "aa".repeat(16);
        let bob = "bb".repeat(16);
        let signer = "ff".repeat(16);

        ledger.append(&alice, &join_payload(), &signer).unwrap();
        ledger.append(&bob, &join_payload(), &signer).unwrap();
        ledger
            .append(
                &alice,
                &EventPayload::Violation(ViolationPayload {
                    violation_type: "audit_deviation".to_string(),
                    severity: "minor".to_string(),
                    penalty: 5.0,
                    evidence: serde_json::Value::Null,
                }),
                &signer,
            )
            .unwrap();

        let hits = ledger.query(&EventFilter {
            node_id: Some(alice.clone()),
            types: Some(vec![EventType::Violation]),
            ..Default::default()
        });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].seq, 3);

        let hits = ledger.query(&EventFilter {
            start_seq: Some(2),
            end_seq: Some(3),
            ..Default::default()
        });
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_append_signed_validations() {
        let ledger = EventLedger::new();
        let node = "aa".repeat(16);
        let signer = "ff".repeat(16);
        let e1 = ledger.append(&node, &join_payload(), &signer).unwrap();

        // Well-formed continuation is accepted.
        let mut e2 = Event {
            seq: 2,
            event_type: EventType::NodeLeave,
            node_id: node.clone(),
            data: leave_payload().encode().unwrap(),
            timestamp: e1.timestamp,
            signer_id: signer.clone(),
            signature: String::new(),
            prev_hash: e1.hash.clone(),
            hash: String::new(),
        };
        e2.hash = e2.compute_hash().unwrap();
        ledger.append_signed(e2.clone()).unwrap();

        // Wrong sequence.
        let mut e3 = e2.clone();
        e3.seq = 4;
        e3.prev_hash = ledger.last_hash();
        e3.hash = e3.compute_hash().unwrap();
        let err = ledger.append_signed(e3).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));

        // Tampered hash.
        let mut e4 = e2.clone();
        e4.seq = 3;
        e4.prev_hash = ledger.last_hash();
        e4.hash = "00".repeat(32);
        let err = ledger.append_signed(e4).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));

        // Stale prev_hash.
        let mut e5 = e2;
        e5.seq = 3;
        e5.prev_hash = e1.hash;
        e5.hash = e5.compute_hash().unwrap();
        let err = ledger.append_signed(e5).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));

        // Rejections left the chain intact.
        assert_eq!(ledger.last_sequence(), 2);
        ledger.verify_chain().unwrap();
    }

    #[test]
    fn test_tamper_detection() {
        let ledger = EventLedger::new();
        let node = "aa".repeat(16);
        let signer = "ff".repeat(16);
        for _ in 0..3 {
            ledger.append(&node, &join_payload(), &signer).unwrap();
        }

        ledger.tamper_with(1, |e| e.data = "{\"forged\":true}".to_string());

        let err = ledger.verify_chain().unwrap_err();
        match err {
            LedgerError::InvariantViolation { seq, .. } => assert_eq!(seq, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let node = "aa".repeat(16);
        let signer = "ff".repeat(16);

        let ledger = EventLedger::open(&path).unwrap();
        ledger.append(&node, &join_payload(), &signer).unwrap();
        ledger.append(&node, &leave_payload(), &signer).unwrap();
        let last_hash = ledger.last_hash();

        let reloaded = EventLedger::open(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.last_sequence(), 2);
        assert_eq!(reloaded.last_hash(), last_hash);
        assert_eq!(reloaded.get_by_node(&node).len(), 2);
        assert_eq!(reloaded.get_by_type(EventType::NodeJoin).len(), 1);
        reloaded.verify_chain().unwrap();
    }
}
