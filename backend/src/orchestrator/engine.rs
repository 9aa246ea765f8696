//! Simulation engine
//!
//! Wires one coordinator and a group of workers together over a fresh mesh,
//! runs each worker on its own named thread and the coordinator on the
//! calling thread, then joins everything into a [`SimulationOutcome`].
//!
//! # Critical Invariants
//!
//! - **Isolation**: processes share nothing but their channels
//! - **Teardown**: a failing process drops its endpoint, so every peer that
//!   still waits on it fails instead of blocking forever
//! - **Root cause**: when several processes fail, the reported error is the
//!   one that did not merely observe a closed peer

use crate::core::clock::ClockDiscipline;
use crate::core::{Balance, LocalId, Timestamp, MAX_PROCESS_ID, PARENT_ID};
use crate::models::{AccountError, Event, ProtocolError};
use crate::orchestrator::coordinator::Coordinator;
use crate::orchestrator::plan::TransferPlan;
use crate::orchestrator::snapshot::{compute_config_hash, GlobalSnapshot};
use crate::orchestrator::worker;
use crate::transport::{Mesh, MeshEndpoint, Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::thread;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Errors
// ============================================================================

/// Anything that can stop a simulation run
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Coordinator cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Process {id} failed: {reason}")]
    ProcessFailed { id: LocalId, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SimulationError {
    /// True for errors that only report a peer having gone away
    pub fn is_peer_loss(&self) -> bool {
        matches!(
            self,
            SimulationError::Transport(
                TransportError::Disconnected { .. } | TransportError::AllPeersClosed(_)
            )
        )
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// What the workers do between the STARTED and DONE barriers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Workload {
    /// Barriers only; workers idle until STOP
    Basic { workers: usize },

    /// Bank ledger; one opening balance per worker, worker 1 first
    Bank {
        initial_balances: Vec<Balance>,
        #[serde(default)]
        plan: TransferPlan,
    },

    /// Worker `i` runs `5 * i` loop iterations, optionally one critical
    /// section each
    Mutex { workers: usize, use_mutex: bool },
}

impl Workload {
    pub fn name(&self) -> &'static str {
        match self {
            Workload::Basic { .. } => "basic",
            Workload::Bank { .. } => "bank",
            Workload::Mutex { .. } => "mutex",
        }
    }
}

/// Complete description of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub workload: Workload,
}

impl SimulationConfig {
    pub fn new(workload: Workload) -> Self {
        Self { workload }
    }

    /// Bank run with the default robbery plan
    pub fn bank(initial_balances: Vec<Balance>) -> Self {
        Self::new(Workload::Bank {
            initial_balances,
            plan: TransferPlan::default(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(json)
            .map_err(|e| SimulationError::InvalidConfig(format!("Config parse failed: {}", e)))
    }

    pub fn n_workers(&self) -> usize {
        match &self.workload {
            Workload::Basic { workers } | Workload::Mutex { workers, .. } => *workers,
            Workload::Bank {
                initial_balances, ..
            } => initial_balances.len(),
        }
    }

    /// Workers plus the coordinator
    pub fn n_processes(&self) -> usize {
        self.n_workers() + 1
    }

    /// Only the critical-section workload merges received timestamps
    pub fn clock_discipline(&self) -> ClockDiscipline {
        match self.workload {
            Workload::Mutex { use_mutex: true, .. } => ClockDiscipline::Lamport,
            _ => ClockDiscipline::LocalOnly,
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        let n_workers = self.n_workers();
        if n_workers == 0 {
            return Err(SimulationError::InvalidConfig(
                "at least one worker is required".to_string(),
            ));
        }
        if n_workers > MAX_PROCESS_ID as usize {
            return Err(SimulationError::InvalidConfig(format!(
                "{} workers requested, at most {} supported",
                n_workers, MAX_PROCESS_ID
            )));
        }
        if let Workload::Bank {
            initial_balances,
            plan,
        } = &self.workload
        {
            if let Some(negative) = initial_balances.iter().find(|b| **b < 0) {
                return Err(SimulationError::InvalidConfig(format!(
                    "opening balance {} is negative",
                    negative
                )));
            }
            plan.validate(n_workers)?;
        }
        Ok(())
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Everything one process recorded
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub id: LocalId,
    pub events: Vec<Event>,
}

/// One critical section held by a worker, in that worker's logical time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriticalSection {
    pub id: LocalId,
    pub entered: Timestamp,
    pub released: Timestamp,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub run_id: Uuid,
    pub config_hash: String,
    /// Present for bank runs
    pub snapshot: Option<GlobalSnapshot>,
    /// Coordinator first, then workers by id
    pub reports: Vec<ProcessReport>,
}

impl SimulationOutcome {
    pub fn report(&self, id: LocalId) -> Option<&ProcessReport> {
        self.reports.iter().find(|r| r.id == id)
    }

    /// Events of every process, ordered by logical time then process id
    pub fn timeline(&self) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.reports.iter().flat_map(|r| r.events.iter()).collect();
        events.sort_by_key(|e| (e.time(), e.process()));
        events
    }

    /// Critical sections each worker held, pairing entry with release
    pub fn critical_sections(&self) -> Vec<CriticalSection> {
        let mut sections = Vec::new();
        for report in &self.reports {
            let mut entered = None;
            for event in &report.events {
                match event {
                    Event::CsEntered { time, .. } => entered = Some(*time),
                    Event::CsReleased { time, id } => {
                        if let Some(start) = entered.take() {
                            sections.push(CriticalSection {
                                id: *id,
                                entered: start,
                                released: *time,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
        sections
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Run one simulation to completion
///
/// # Example
/// ```
/// use lamport_ledger_core::orchestrator::{run_simulation, SimulationConfig};
///
/// let outcome = run_simulation(&SimulationConfig::bank(vec![10, 0, 0])).unwrap();
/// let snapshot = outcome.snapshot.unwrap();
/// assert_eq!(snapshot.final_total(), 10);
/// ```
pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationOutcome, SimulationError> {
    config.validate()?;
    let run_id = Uuid::new_v4();
    let config_hash = compute_config_hash(config)?;
    info!(
        %run_id,
        workload = config.workload.name(),
        workers = config.n_workers(),
        "starting simulation"
    );

    let discipline = config.clock_discipline();
    let mut endpoints = Mesh::build(config.n_processes()).into_iter();
    let coordinator_endpoint = endpoints.next().ok_or_else(|| {
        SimulationError::InvalidConfig("mesh has no coordinator endpoint".to_string())
    })?;

    let mut handles = Vec::new();
    for endpoint in endpoints {
        let id = endpoint.local_id();
        let workload = config.workload.clone();
        let handle = thread::Builder::new()
            .name(format!("worker-{}", id))
            .spawn(move || run_worker(endpoint, &workload, discipline))
            .map_err(|e| SimulationError::ProcessFailed {
                id,
                reason: format!("could not spawn thread: {}", e),
            })?;
        handles.push((id, handle));
    }

    // The coordinator's endpoint is dropped when this returns, which unblocks
    // any worker still waiting on it.
    let coordinator_result =
        run_coordinator(coordinator_endpoint, config, discipline, run_id, &config_hash);

    let mut reports = Vec::new();
    let mut failures = Vec::new();
    for (id, handle) in handles {
        match handle.join() {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(e)) => {
                error!(process = id, error = %e, "worker failed");
                failures.push(e);
            }
            Err(_) => {
                error!(process = id, "worker panicked");
                failures.push(SimulationError::ProcessFailed {
                    id,
                    reason: "thread panicked".to_string(),
                });
            }
        }
    }

    let (coordinator_report, snapshot) = match coordinator_result {
        Ok(done) if failures.is_empty() => done,
        Ok(_) => return Err(root_cause(failures)),
        Err(e) => {
            error!(process = PARENT_ID, error = %e, "coordinator failed");
            failures.insert(0, e);
            return Err(root_cause(failures));
        }
    };

    reports.sort_by_key(|r| r.id);
    reports.insert(0, coordinator_report);
    info!(%run_id, "simulation finished");

    Ok(SimulationOutcome {
        run_id,
        config_hash,
        snapshot,
        reports,
    })
}

/// First failure that is not a consequence of another process going away
fn root_cause(mut failures: Vec<SimulationError>) -> SimulationError {
    match failures.iter().position(|e| !e.is_peer_loss()) {
        Some(index) => failures.swap_remove(index),
        None => failures.swap_remove(0),
    }
}

fn run_worker(
    endpoint: MeshEndpoint,
    workload: &Workload,
    discipline: ClockDiscipline,
) -> Result<ProcessReport, SimulationError> {
    let id = endpoint.local_id();
    match workload {
        Workload::Basic { .. } => worker::run_basic_worker(endpoint, discipline),
        Workload::Bank {
            initial_balances, ..
        } => {
            let opening = initial_balances
                .get(usize::from(id) - 1)
                .copied()
                .ok_or_else(|| {
                    SimulationError::InvalidConfig(format!("no opening balance for worker {}", id))
                })?;
            worker::run_bank_worker(endpoint, discipline, opening)
        }
        Workload::Mutex { use_mutex, .. } => {
            worker::run_mutex_worker(endpoint, discipline, *use_mutex)
        }
    }
}

fn run_coordinator(
    endpoint: MeshEndpoint,
    config: &SimulationConfig,
    discipline: ClockDiscipline,
    run_id: Uuid,
    config_hash: &str,
) -> Result<(ProcessReport, Option<GlobalSnapshot>), SimulationError> {
    let mut coordinator = Coordinator::new(endpoint, discipline);
    coordinator.await_start()?;

    let snapshot = match &config.workload {
        Workload::Basic { .. } => {
            coordinator.stop()?;
            coordinator.await_done()?;
            None
        }
        Workload::Bank { plan, .. } => {
            for order in plan.orders(config.n_workers()) {
                coordinator.issue_transfer(order.src, order.dst, order.amount)?;
            }
            coordinator.stop()?;
            coordinator.await_done()?;
            coordinator.collect_histories()?;
            Some(coordinator.finalize_snapshot(run_id, config_hash)?)
        }
        Workload::Mutex { .. } => {
            coordinator.skip_stop()?;
            coordinator.await_done()?;
            None
        }
    };

    if let Some(snapshot) = &snapshot {
        if !snapshot.is_conserved() {
            warn!(
                opening = snapshot.opening_total(),
                closing = snapshot.final_total(),
                "money was not conserved"
            );
        }
    }

    let report = coordinator.close()?;
    Ok((report, snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "workload": {
                "type": "bank",
                "initial_balances": [5, 5],
                "plan": { "kind": "explicit", "orders": [ { "src": 1, "dst": 2, "amount": 3 } ] }
            }
        }"#;
        let config = SimulationConfig::from_json(json).unwrap();
        assert_eq!(config.n_workers(), 2);
        assert_eq!(config.n_processes(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_plan_defaults_to_robbery() {
        let json = r#"{ "workload": { "type": "bank", "initial_balances": [1] } }"#;
        let config = SimulationConfig::from_json(json).unwrap();
        assert_eq!(
            config.workload,
            Workload::Bank {
                initial_balances: vec![1],
                plan: TransferPlan::Robbery
            }
        );
    }

    #[test]
    fn test_validate_rejects_too_many_workers() {
        let config = SimulationConfig::new(Workload::Basic { workers: 16 });
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidConfig(_))
        ));
        let config = SimulationConfig::new(Workload::Basic { workers: 0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_only_mutex_runs_merge_clocks() {
        let mutex = SimulationConfig::new(Workload::Mutex {
            workers: 2,
            use_mutex: true,
        });
        assert_eq!(mutex.clock_discipline(), ClockDiscipline::Lamport);
        assert_eq!(
            SimulationConfig::bank(vec![1]).clock_discipline(),
            ClockDiscipline::LocalOnly
        );
    }

    #[test]
    fn test_root_cause_skips_peer_loss() {
        let failures = vec![
            SimulationError::Transport(TransportError::Disconnected { peer: 2 }),
            SimulationError::ProcessFailed {
                id: 2,
                reason: "boom".to_string(),
            },
        ];
        assert!(matches!(
            root_cause(failures),
            SimulationError::ProcessFailed { id: 2, .. }
        ));
    }
}
