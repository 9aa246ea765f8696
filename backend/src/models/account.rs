//! Worker account
//!
//! Each worker owns exactly one account: its current balance plus the dense
//! [`BalanceHistory`] it ships to the coordinator at shutdown.
//!
//! Balances may go negative; the simulated economy has no liquidity checks.
//! Arithmetic is checked so that a wrapped `i16` never reaches the ledger.

use crate::core::{Balance, LocalId, Timestamp};
use crate::models::history::{BalanceHistory, HistoryError};
use thiserror::Error;

/// Errors that can occur during account operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("balance overflow: {balance} {op} {amount}")]
    Overflow {
        balance: Balance,
        amount: Balance,
        op: char,
    },

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Balance and per-tick history of one worker
///
/// # Example
/// ```
/// use lamport_ledger_core::Account;
///
/// let mut account = Account::new(1, 10);
/// account.debit(4).unwrap();
/// assert_eq!(account.balance(), 6);
///
/// account.debit(10).unwrap(); // overdraft is allowed
/// assert_eq!(account.balance(), -4);
/// ```
#[derive(Debug, Clone)]
pub struct Account {
    id: LocalId,
    balance: Balance,
    history: BalanceHistory,
}

impl Account {
    pub fn new(id: LocalId, opening_balance: Balance) -> Self {
        Self {
            id,
            balance: opening_balance,
            history: BalanceHistory::new(id, opening_balance),
        }
    }

    pub fn id(&self) -> LocalId {
        self.id
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn history(&self) -> &BalanceHistory {
        &self.history
    }

    /// Consume the account, keeping only its history
    pub fn into_history(self) -> BalanceHistory {
        self.history
    }

    pub fn debit(&mut self, amount: Balance) -> Result<(), AccountError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(AccountError::Overflow {
                balance: self.balance,
                amount,
                op: '-',
            })?;
        Ok(())
    }

    pub fn credit(&mut self, amount: Balance) -> Result<(), AccountError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(AccountError::Overflow {
                balance: self.balance,
                amount,
                op: '+',
            })?;
        Ok(())
    }

    /// Record the current balance for every tick strictly before `now`
    pub fn catch_up(&mut self, now: Timestamp) -> usize {
        self.history.fill_until(now, self.balance)
    }

    /// Record the current balance for every tick up to and including `now`
    pub fn seal(&mut self, now: Timestamp) -> usize {
        self.history.fill_through(now, self.balance)
    }

    /// Mark an incoming credit as possibly outstanding over its causal window
    pub fn flag_pending_in(
        &mut self,
        received_at: Timestamp,
        now: Timestamp,
        amount: Balance,
    ) -> Result<usize, AccountError> {
        Ok(self.history.mark_pending_in(received_at, now, amount)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_overflow_is_rejected() {
        let mut account = Account::new(1, Balance::MIN + 1);
        assert!(account.debit(2).is_err());
        assert_eq!(account.balance(), Balance::MIN + 1);
    }

    #[test]
    fn test_seal_records_pre_mutation_balance() {
        let mut account = Account::new(1, 10);
        account.seal(2);
        account.debit(3).unwrap();
        account.seal(4);
        let balances: Vec<_> = account.history().states().iter().map(|s| s.balance).collect();
        assert_eq!(balances, vec![10, 10, 10, 7, 7]);
    }
}
