//! Balance history
//!
//! A worker records one [`BalanceState`] per logical tick of its lifetime.
//!
//! # Critical Invariants
//!
//! 1. **Dense**: entry `i` has `time == i`; there are no gaps and no duplicates
//! 2. **Anchored**: the first entry is tick 0 with the opening balance
//! 3. **Carry-forward**: gap ticks repeat the current balance with `pending_in = 0`
//!
//! Because the table is dense, "balance at tick T" is a direct index.

use crate::core::{Balance, LocalId, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width of the causal window behind a received credit's timestamp
pub const PENDING_WINDOW: Timestamp = 2;

/// Errors raised by history validation and mutation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history is empty")]
    Empty,

    #[error("history has a gap or duplicate: expected tick {expected}, found {found}")]
    NotDense { expected: Timestamp, found: Timestamp },

    #[error("pending-in overflow at tick {time}")]
    PendingOverflow { time: Timestamp },
}

/// Balance of one worker at one logical tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceState {
    pub time: Timestamp,
    pub balance: Balance,
    /// Credits that may have been in flight towards this worker at `time`
    pub pending_in: Balance,
}

impl BalanceState {
    pub fn new(time: Timestamp, balance: Balance) -> Self {
        Self {
            time,
            balance,
            pending_in: 0,
        }
    }
}

/// Dense per-tick balance record of one worker
///
/// # Example
/// ```
/// use lamport_ledger_core::BalanceHistory;
///
/// let mut history = BalanceHistory::new(1, 10);
/// history.fill_through(3, 10);
/// assert_eq!(history.len(), 4);
/// assert_eq!(history.last_time(), 3);
/// assert_eq!(history.balance_at(2), Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceHistory {
    owner: LocalId,
    states: Vec<BalanceState>,
}

impl BalanceHistory {
    /// Start a history at tick 0 with the opening balance
    pub fn new(owner: LocalId, opening_balance: Balance) -> Self {
        Self {
            owner,
            states: vec![BalanceState::new(0, opening_balance)],
        }
    }

    /// Build a history from raw entries, rejecting anything that is not dense
    pub fn from_states(owner: LocalId, states: Vec<BalanceState>) -> Result<Self, HistoryError> {
        let history = Self { owner, states };
        history.validate()?;
        Ok(history)
    }

    pub fn owner(&self) -> LocalId {
        self.owner
    }

    pub fn states(&self) -> &[BalanceState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Tick of the last recorded entry
    pub fn last_time(&self) -> Timestamp {
        self.states.last().map(|s| s.time).unwrap_or(0)
    }

    /// Entry recorded for tick `time`, if the history reaches that far
    pub fn state_at(&self, time: Timestamp) -> Option<&BalanceState> {
        self.states.get(time as usize).filter(|s| s.time == time)
    }

    pub fn balance_at(&self, time: Timestamp) -> Option<Balance> {
        self.state_at(time).map(|s| s.balance)
    }

    /// Balance in the last recorded entry
    pub fn final_balance(&self) -> Option<Balance> {
        self.states.last().map(|s| s.balance)
    }

    /// Append carried-forward entries for every tick strictly between the
    /// last recorded tick and `until`
    ///
    /// Returns the number of entries appended. Running it again with the same
    /// bound appends nothing.
    pub fn fill_until(&mut self, until: Timestamp, balance: Balance) -> usize {
        let before = self.states.len();
        let mut next = match self.states.last() {
            Some(last) => last.time + 1,
            None => 0,
        };
        while next < until {
            self.states.push(BalanceState::new(next, balance));
            next += 1;
        }
        self.states.len() - before
    }

    /// Append carried-forward entries up to and including `through`
    pub fn fill_through(&mut self, through: Timestamp, balance: Balance) -> usize {
        self.fill_until(through.saturating_add(1), balance)
    }

    /// Flag an incoming credit on every tick in
    /// `[received_at - PENDING_WINDOW, current_time)`
    ///
    /// Credits accumulate: two overlapping windows both contribute to the
    /// same ticks. Returns the number of ticks touched.
    pub fn mark_pending_in(
        &mut self,
        received_at: Timestamp,
        current_time: Timestamp,
        amount: Balance,
    ) -> Result<usize, HistoryError> {
        let window_start = received_at.saturating_sub(PENDING_WINDOW);
        let mut touched = 0;
        for state in self
            .states
            .iter_mut()
            .filter(|s| s.time >= window_start && s.time < current_time)
        {
            state.pending_in = state
                .pending_in
                .checked_add(amount)
                .ok_or(HistoryError::PendingOverflow { time: state.time })?;
            touched += 1;
        }
        Ok(touched)
    }

    /// True if entries cover `0..=last_time` with no gaps or duplicates
    pub fn is_dense(&self) -> bool {
        self.validate().is_ok()
    }

    /// Check the dense/anchored invariants
    pub fn validate(&self) -> Result<(), HistoryError> {
        if self.states.is_empty() {
            return Err(HistoryError::Empty);
        }
        for (index, state) in self.states.iter().enumerate() {
            let expected = index as Timestamp;
            if state.time != expected {
                return Err(HistoryError::NotDense {
                    expected,
                    found: state.time,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_history_is_anchored_at_zero() {
        let history = BalanceHistory::new(3, 42);
        assert_eq!(history.states(), &[BalanceState::new(0, 42)]);
        assert!(history.is_dense());
    }

    #[test]
    fn test_fill_until_is_exclusive() {
        let mut history = BalanceHistory::new(1, 5);
        assert_eq!(history.fill_until(3, 5), 2);
        assert_eq!(history.last_time(), 2);
        assert_eq!(history.fill_until(3, 5), 0);
    }

    #[test]
    fn test_from_states_rejects_gap() {
        let states = vec![BalanceState::new(0, 1), BalanceState::new(2, 1)];
        assert_eq!(
            BalanceHistory::from_states(1, states),
            Err(HistoryError::NotDense {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn test_from_states_rejects_empty() {
        assert_eq!(
            BalanceHistory::from_states(1, Vec::new()),
            Err(HistoryError::Empty)
        );
    }

    #[test]
    fn test_pending_window_saturates_near_zero() {
        let mut history = BalanceHistory::new(2, 0);
        history.fill_through(3, 0);
        // received at 1: window [0, 3)
        assert_eq!(history.mark_pending_in(1, 3, 4).unwrap(), 3);
        assert_eq!(history.state_at(3).unwrap().pending_in, 0);
    }

    #[test]
    fn test_pending_overflow_is_reported() {
        let mut history = BalanceHistory::new(2, 0);
        history.fill_through(1, 0);
        history.mark_pending_in(0, 2, Balance::MAX).unwrap();
        assert_eq!(
            history.mark_pending_in(0, 2, 1),
            Err(HistoryError::PendingOverflow { time: 0 })
        );
    }
}
