//! End-to-end bank scenarios
//!
//! Each test runs a full group (coordinator plus worker threads) over a fresh
//! mesh and checks the assembled snapshot and the narrative event logs.

use lamport_ledger_core::orchestrator::SimulationOutcome;
use lamport_ledger_core::{
    run_simulation, Event, SimulationConfig, SimulationError, TransferOrder, TransferPlan,
    Workload, PARENT_ID,
};
use std::collections::BTreeMap;

fn bank(initial_balances: Vec<i16>, plan: TransferPlan) -> SimulationConfig {
    SimulationConfig::new(Workload::Bank {
        initial_balances,
        plan,
    })
}

fn explicit(orders: &[(u8, u8, i16)]) -> TransferPlan {
    TransferPlan::Explicit {
        orders: orders
            .iter()
            .map(|&(src, dst, amount)| TransferOrder::new(src, dst, amount))
            .collect(),
    }
}

fn position(outcome: &SimulationOutcome, id: u8, event_type: &str) -> usize {
    outcome
        .report(id)
        .unwrap()
        .events
        .iter()
        .position(|e| e.event_type() == event_type)
        .unwrap()
}

// ============================================================================
// Single transfer
// ============================================================================

#[test]
fn test_single_transfer_moves_money() {
    let config = bank(vec![10, 0, 0], explicit(&[(2, 3, 4)]));
    let outcome = run_simulation(&config).unwrap();
    let snapshot = outcome.snapshot.as_ref().unwrap();

    let finals: Vec<_> = snapshot.final_balances().into_values().collect();
    assert_eq!(finals, vec![10, -4, 4]);
    assert!(snapshot.is_conserved());
    assert_eq!(snapshot.transfers(), &[TransferOrder::new(2, 3, 4)]);
}

#[test]
fn test_ack_precedes_stop_and_done() {
    let config = bank(vec![10, 0, 0], explicit(&[(2, 3, 4)]));
    let outcome = run_simulation(&config).unwrap();

    let acked = position(&outcome, PARENT_ID, "TransferAcked");
    let stopped = position(&outcome, PARENT_ID, "StopSent");
    let all_done = position(&outcome, PARENT_ID, "ReceivedAllDone");
    assert!(acked < stopped && stopped < all_done);

    assert!(position(&outcome, 3, "TransferIn") < position(&outcome, 3, "Done"));
    assert!(position(&outcome, 2, "TransferOut") < position(&outcome, 2, "Done"));
}

#[test]
fn test_single_transfer_history() {
    let config = bank(vec![10, 0, 0], explicit(&[(2, 3, 4)]));
    let outcome = run_simulation(&config).unwrap();
    let snapshot = outcome.snapshot.unwrap();

    // Both legs move the balance while the clock reads 1
    let src = snapshot.history(2).unwrap();
    assert_eq!(src.balance_at(0), Some(0));
    assert_eq!(src.balance_at(1), Some(-4));
    assert_eq!(src.balance_at(2), Some(-4));

    let dst = snapshot.history(3).unwrap();
    assert_eq!(dst.balance_at(0), Some(0));
    assert_eq!(dst.balance_at(1), Some(4));
    assert_eq!(dst.balance_at(2), Some(4));
    assert_eq!(dst.state_at(0).unwrap().pending_in, 4);
    assert_eq!(dst.state_at(1).unwrap().pending_in, 0);

    let untouched = snapshot.history(1).unwrap();
    assert!(untouched.states().iter().all(|s| s.balance == 10));
}

#[test]
fn test_transfer_log_lines() {
    let config = bank(vec![10, 0, 0], explicit(&[(2, 3, 4)]));
    let outcome = run_simulation(&config).unwrap();

    let lines: Vec<String> = outcome
        .timeline()
        .iter()
        .map(|e| e.to_string())
        .collect();
    assert!(lines.contains(&"1: process 1 has STARTED with balance $10".to_string()));
    assert!(lines.contains(&"2: process 2 transferred $4 to process 3".to_string()));
    assert!(lines.contains(&"2: process 3 received $4 from process 2".to_string()));
    assert!(lines.contains(&"3: process 2 has DONE with balance $-4".to_string()));
}

// ============================================================================
// Plans
// ============================================================================

#[test]
fn test_robbery_plan_conserves_money() {
    let config = SimulationConfig::bank(vec![10, 20, 30, 40, 50]);
    let outcome = run_simulation(&config).unwrap();
    let snapshot = outcome.snapshot.unwrap();

    let expected = BTreeMap::from([(1, 10), (2, 19), (3, 29), (4, 39), (5, 53)]);
    assert_eq!(snapshot.final_balances(), expected);
    assert_eq!(snapshot.opening_total(), 150);
    assert_eq!(snapshot.final_total(), 150);
    assert_eq!(snapshot.transfers().len(), 5);
}

#[test]
fn test_random_plan_is_reproducible() {
    let plan = TransferPlan::Random {
        transfers: 25,
        max_amount: 7,
        seed: 99,
    };
    let config = bank(vec![50, 50, 50, 50], plan);

    let first = run_simulation(&config).unwrap().snapshot.unwrap();
    let second = run_simulation(&config).unwrap().snapshot.unwrap();
    assert_eq!(first.final_balances(), second.final_balances());
    assert_eq!(first.config_hash, second.config_hash);
    assert_ne!(first.run_id, second.run_id);
    assert!(first.is_conserved());
}

#[test]
fn test_idle_plan_keeps_opening_balances() {
    let config = bank(vec![3, 1, 4], TransferPlan::Idle);
    let outcome = run_simulation(&config).unwrap();
    let snapshot = outcome.snapshot.unwrap();

    let finals: Vec<_> = snapshot.final_balances().into_values().collect();
    assert_eq!(finals, vec![3, 1, 4]);
    for (id, history) in snapshot.histories() {
        assert_eq!(history.owner(), *id);
        assert!(history.is_dense());
    }
}

#[test]
fn test_single_worker_runs_alone() {
    let outcome = run_simulation(&SimulationConfig::bank(vec![7])).unwrap();
    let snapshot = outcome.snapshot.unwrap();
    assert_eq!(snapshot.final_balances(), BTreeMap::from([(1, 7)]));
    assert!(snapshot.transfers().is_empty());
}

// ============================================================================
// Basic workload and configuration errors
// ============================================================================

#[test]
fn test_basic_workload_runs_both_barriers() {
    let config = SimulationConfig::new(Workload::Basic { workers: 3 });
    let outcome = run_simulation(&config).unwrap();
    assert!(outcome.snapshot.is_none());
    assert_eq!(outcome.reports.len(), 4);

    for id in 1..=3u8 {
        let kinds: Vec<_> = outcome
            .report(id)
            .unwrap()
            .events
            .iter()
            .map(Event::event_type)
            .collect();
        assert_eq!(
            kinds,
            vec!["Started", "ReceivedAllStarted", "Done", "ReceivedAllDone"]
        );
    }
}

#[test]
fn test_invalid_config_is_rejected_before_running() {
    let config = bank(vec![1, 1], explicit(&[(1, 1, 1)]));
    assert!(matches!(
        run_simulation(&config),
        Err(SimulationError::InvalidConfig(_))
    ));

    let config = bank(vec![-1], TransferPlan::Idle);
    assert!(run_simulation(&config).is_err());
}
