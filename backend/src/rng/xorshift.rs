//! xorshift64* generator
//!
//! Same seed, same sequence. The generator state is a single `u64`, so a run
//! can be reproduced from the seed recorded in its config.

use crate::core::{Balance, LocalId};
use serde::{Deserialize, Serialize};

/// Deterministic generator for transfer plans
///
/// # Example
/// ```
/// use lamport_ledger_core::PlanRng;
///
/// let mut a = PlanRng::new(7);
/// let mut b = PlanRng::new(7);
/// assert_eq!(a.next(), b.next());
///
/// let worker = a.pick_worker(4, None);
/// assert!((1..=4).contains(&worker));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRng {
    state: u64,
}

impl PlanRng {
    /// Create a generator; a zero seed is replaced by 1
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Next raw 64-bit value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform value in `[min, max)`
    ///
    /// # Panics
    /// Panics if `min >= max`
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");
        let span = (max - min) as u64;
        min + (self.next() % span) as i64
    }

    /// Uniform worker id in `1..=n_workers`, never equal to `exclude`
    ///
    /// # Panics
    /// Panics if no worker is eligible
    pub fn pick_worker(&mut self, n_workers: usize, exclude: Option<LocalId>) -> LocalId {
        let eligible = n_workers - usize::from(exclude.is_some());
        assert!(eligible > 0, "no eligible worker");
        let mut id = self.range(1, eligible as i64 + 1) as LocalId;
        if let Some(skip) = exclude {
            if id >= skip {
                id += 1;
            }
        }
        id
    }

    /// Uniform amount in `1..=max_amount`
    pub fn amount(&mut self, max_amount: Balance) -> Balance {
        self.range(1, i64::from(max_amount) + 1) as Balance
    }

    /// Current internal state
    pub fn state(&self) -> u64 {
        self.state
    }
}
