//! End-to-end chain integrity: persistence round-trips, on-disk tampering,
//! and replay determinism across process restarts.

use daan_ledger::{
    Event, EventFilter, EventLedger, EventPayload, EventType, NodeJoinPayload, NodeLeavePayload,
    SnapshotManager,
};

fn node_id(tag: u8) -> String {
    hex::encode([tag; 16])
}

fn join_payload(sponsor: &str) -> EventPayload {
    EventPayload::NodeJoin(NodeJoinPayload {
        public_key: "ab".repeat(32),
        sponsor_id: sponsor.to_string(),
        initial_reputation: 1.0,
    })
}

#[test]
fn persist_reload_identical_view() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let genesis = node_id(1);

    let ledger = EventLedger::open(&path).unwrap();
    for i in 2..12u8 {
        ledger.append(&node_id(i), &join_payload(&genesis), &genesis).unwrap();
    }
    ledger
        .append(
            &node_id(2),
            &EventPayload::NodeLeave(NodeLeavePayload {
                reason: "voluntary".to_string(),
            }),
            &genesis,
        )
        .unwrap();

    let reloaded = EventLedger::open(&path).unwrap();
    assert_eq!(reloaded.len(), ledger.len());
    assert_eq!(reloaded.last_sequence(), ledger.last_sequence());
    assert_eq!(reloaded.last_hash(), ledger.last_hash());
    reloaded.verify_chain().unwrap();

    // Indices rebuilt identically.
    assert_eq!(
        reloaded.get_by_node(&node_id(2)).len(),
        ledger.get_by_node(&node_id(2)).len()
    );
    assert_eq!(
        reloaded.get_by_type(EventType::NodeJoin).len(),
        ledger.get_by_type(EventType::NodeJoin).len()
    );
    let filter = EventFilter {
        node_id: Some(node_id(2)),
        ..Default::default()
    };
    assert_eq!(reloaded.query(&filter), ledger.query(&filter));
}

#[test]
fn on_disk_tampering_detected_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let genesis = node_id(1);

    let ledger = EventLedger::open(&path).unwrap();
    for i in 2..5u8 {
        ledger.append(&node_id(i), &join_payload(&genesis), &genesis).unwrap();
    }

    // Forge the payload of the second event directly in the file.
    let contents = std::fs::read_to_string(&path).unwrap();
    let mut events: Vec<Event> = serde_json::from_str(&contents).unwrap();
    events[1].data = "{\"forged\":true}".to_string();
    std::fs::write(&path, serde_json::to_string(&events).unwrap()).unwrap();

    let reloaded = EventLedger::open(&path).unwrap();
    let err = reloaded.verify_chain().unwrap_err();
    assert_eq!(err.kind(), daan_core::ErrorKind::InvariantViolation);
}

#[test]
fn replay_yields_identical_state_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger.json");
    let snap_dir = dir.path().join("snapshots");
    let genesis = node_id(1);

    let ledger = EventLedger::open(&ledger_path).unwrap();
    for i in 2..30u8 {
        ledger.append(&node_id(i), &join_payload(&genesis), &genesis).unwrap();
    }

    let manager = SnapshotManager::new(&snap_dir, 10).unwrap();
    let live = manager.get_state_at(&ledger, 25).unwrap();
    manager.create(&ledger).unwrap();

    // Fresh process: reload ledger and snapshots from disk.
    let ledger2 = EventLedger::open(&ledger_path).unwrap();
    let manager2 = SnapshotManager::new(&snap_dir, 10).unwrap();
    let restored = manager2.get_state_at(&ledger2, 25).unwrap();

    assert_eq!(live, restored);
    assert_eq!(
        serde_json::to_string(&live).unwrap(),
        serde_json::to_string(&restored).unwrap()
    );
}

mod chain_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn appended_chains_always_verify(count in 1usize..40) {
            let ledger = EventLedger::new();
            let genesis = node_id(1);
            for i in 0..count {
                let subject = node_id((i % 250) as u8);
                ledger.append(&subject, &join_payload(&genesis), &genesis).unwrap();
            }
            prop_assert!(ledger.verify_chain().is_ok());
            prop_assert_eq!(ledger.last_sequence(), count as u64);
        }

        #[test]
        fn payload_tampering_always_detected(count in 2usize..20, victim_idx in 0usize..19) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("ledger.json");
            let ledger = EventLedger::open(&path).unwrap();
            let genesis = node_id(1);
            for i in 0..count {
                ledger.append(&node_id((i % 250) as u8), &join_payload(&genesis), &genesis).unwrap();
            }

            let victim = victim_idx % count;
            let contents = std::fs::read_to_string(&path).unwrap();
            let mut events: Vec<Event> = serde_json::from_str(&contents).unwrap();
            events[victim].data.push(' ');
            std::fs::write(&path, serde_json::to_string(&events).unwrap()).unwrap();

            let reloaded = EventLedger::open(&path).unwrap();
            prop_assert!(reloaded.verify_chain().is_err());
        }
    }
}
