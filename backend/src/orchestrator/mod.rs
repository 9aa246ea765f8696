//! Orchestrator - runs a whole group of processes
//!
//! See `engine.rs` for the runner, `coordinator.rs` and `worker.rs` for the
//! two process roles.

pub mod coordinator;
pub mod engine;
pub mod plan;
pub mod report;
pub mod snapshot;
pub mod worker;

pub use coordinator::{Coordinator, CoordinatorState};
pub use engine::{
    run_simulation, CriticalSection, ProcessReport, SimulationConfig, SimulationError,
    SimulationOutcome, Workload,
};
pub use plan::TransferPlan;
pub use report::{render_table, BalanceTable};
pub use snapshot::{compute_config_hash, ConservationReport, GlobalSnapshot};
pub use worker::{run_bank_worker, run_basic_worker, run_mutex_worker, BankWorker, WorkerState};
