//! Snapshot assembly tests
//!
//! The coordinator accepts one dense history per worker, owned by its sender,
//! and the resulting snapshot survives JSON persistence.

use lamport_ledger_core::orchestrator::{Coordinator, CoordinatorState};
use lamport_ledger_core::{
    render_table, run_simulation, BalanceHistory, ClockDiscipline, GlobalSnapshot, Mesh,
    MeshEndpoint, Message, MessageType, ProtocolError, SimulationConfig, SimulationError,
    Transport,
};
use uuid::Uuid;

/// Coordinator of a one-worker group driven up to history collection
fn coordinator_awaiting_history() -> (Coordinator<MeshEndpoint>, MeshEndpoint) {
    let mut endpoints = Mesh::build(2);
    let mut worker = endpoints.remove(1);
    let mut coordinator = Coordinator::new(endpoints.remove(0), ClockDiscipline::LocalOnly);

    worker.send(0, &Message::started(1, "1 started")).unwrap();
    coordinator.await_start().unwrap();
    coordinator.stop().unwrap();
    let stop = worker.receive_from(0).unwrap().unwrap();
    assert_eq!(stop.message_type(), MessageType::Stop);

    worker.send(0, &Message::done(2, "1 done")).unwrap();
    coordinator.await_done().unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Collecting);
    (coordinator, worker)
}

#[test]
fn test_collects_and_finalizes() {
    let (mut coordinator, mut worker) = coordinator_awaiting_history();
    let mut history = BalanceHistory::new(1, 8);
    history.fill_through(3, 8);
    worker
        .send(0, &Message::balance_history(4, history.clone()))
        .unwrap();

    coordinator.collect_histories().unwrap();
    let snapshot = coordinator.finalize_snapshot(Uuid::nil(), "abc").unwrap();
    assert_eq!(snapshot.history(1), Some(&history));
    assert_eq!(snapshot.max_time(), 3);
    assert_eq!(snapshot.config_hash, "abc");
}

#[test]
fn test_history_owned_by_someone_else_is_rejected() {
    let (mut coordinator, mut worker) = coordinator_awaiting_history();
    worker
        .send(0, &Message::balance_history(4, BalanceHistory::new(5, 8)))
        .unwrap();

    let err = coordinator.collect_histories().unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Protocol(ProtocolError::HistoryOwnerMismatch { src: 1, owner: 5 })
    ));
}

#[test]
fn test_history_with_gap_is_rejected() {
    let (mut coordinator, mut worker) = coordinator_awaiting_history();
    let gapped: BalanceHistory = serde_json::from_str(
        r#"{"owner": 1, "states": [
            {"time": 0, "balance": 8, "pending_in": 0},
            {"time": 2, "balance": 8, "pending_in": 0}
        ]}"#,
    )
    .unwrap();
    worker
        .send(0, &Message::balance_history(4, gapped))
        .unwrap();

    let err = coordinator.collect_histories().unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Protocol(ProtocolError::InvalidHistory { src: 1, .. })
    ));
}

// ============================================================================
// Persistence and rendering
// ============================================================================

#[test]
fn test_snapshot_json_round_trip() {
    let outcome = run_simulation(&SimulationConfig::bank(vec![10, 20, 30])).unwrap();
    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(snapshot.run_id, outcome.run_id);

    let json = snapshot.to_json().unwrap();
    let restored = GlobalSnapshot::from_json(&json).unwrap();
    assert_eq!(restored, snapshot);
    assert_eq!(restored.final_total(), 60);
}

#[test]
fn test_from_json_rejects_gapped_history() {
    let json = r#"{
        "run_id": "00000000-0000-0000-0000-000000000000",
        "config_hash": "",
        "histories": { "1": { "owner": 1, "states": [ { "time": 1, "balance": 0, "pending_in": 0 } ] } },
        "transfers": []
    }"#;
    assert!(matches!(
        GlobalSnapshot::from_json(json),
        Err(SimulationError::SerializationError(_))
    ));
}

#[test]
fn test_table_has_one_row_per_tick() {
    let outcome = run_simulation(&SimulationConfig::bank(vec![5, 5])).unwrap();
    let snapshot = outcome.snapshot.unwrap();
    let table = render_table(&snapshot);

    let rows = table.lines().count();
    // title, header, rule, ticks, totals line
    assert_eq!(rows, 3 + snapshot.max_time() as usize + 1 + 1);
    assert!(table.contains("proc 1"));
    assert!(table.contains("proc 2"));
    assert!(!table.contains("NOT CONSERVED"));
}
