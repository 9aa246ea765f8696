//! Deterministic random number generation
//!
//! Uses the xorshift64* algorithm. Random transfer plans draw every pair and
//! amount from here, so a seed fully determines the orders a run issues.

mod xorshift;

pub use xorshift::PlanRng;
