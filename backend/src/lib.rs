//! Lamport Ledger Core - Rust Engine
//!
//! A group of cooperating processes that talk only over point-to-point FIFO
//! channels and order their actions with logical clocks. Process 0 is the
//! coordinator; the rest are workers.
//!
//! # Architecture
//!
//! - **core**: Process ids, logical timestamps and the Lamport clock
//! - **models**: Domain types (Message, TransferOrder, Account, BalanceHistory, Event)
//! - **transport**: Channel mesh and the `Transport` seam
//! - **protocol**: Per-process context, barriers, critical-section negotiation
//! - **orchestrator**: Coordinator, workers, snapshot and the runner
//! - **rng**: Deterministic random number generation for transfer plans
//!
//! # Critical Invariants
//!
//! 1. Balances are i16 whole units; overflow is an error, never a wrap
//! 2. A worker's balance history is dense: one entry per logical tick
//! 3. Processes share no state; everything crosses a channel as bytes

pub mod core;
pub mod models;
pub mod orchestrator;
pub mod protocol;
pub mod rng;
pub mod transport;

// Re-exports for convenience
pub use core::clock::{ClockDiscipline, LamportClock};
pub use core::{Balance, LocalId, Timestamp, MAX_PROCESS_ID, PARENT_ID};
pub use models::{
    Account, AccountError, BalanceHistory, BalanceState, Event, EventLog, HistoryError, Message,
    MessageType, Payload, ProtocolError, TransferOrder,
};
pub use orchestrator::{
    render_table, run_simulation, GlobalSnapshot, SimulationConfig, SimulationError,
    SimulationOutcome, TransferPlan, Workload,
};
pub use protocol::ProcessContext;
pub use rng::PlanRng;
pub use transport::{Mesh, MeshEndpoint, Transport, TransportError};
