//! Coordination protocol shared by every role
//!
//! - **context**: per-process state and the receive path
//! - **barrier**: STARTED/DONE rendezvous
//! - **mutex**: critical-section negotiation

pub mod barrier;
pub mod context;
pub mod mutex;

pub use context::ProcessContext;
pub use mutex::LamportMutex;
