//! Transfer order
//!
//! Payload of a TRANSFER message. Always issued by the coordinator, delivered
//! to `src` first and relayed by `src` to `dst`.

use crate::core::{Balance, LocalId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction to move `amount` from worker `src` to worker `dst`
///
/// # Example
/// ```
/// use lamport_ledger_core::TransferOrder;
///
/// let order = TransferOrder::new(1, 2, 4);
/// assert!(order.involves(2));
/// assert!(!order.involves(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferOrder {
    pub src: LocalId,
    pub dst: LocalId,
    pub amount: Balance,
}

impl TransferOrder {
    pub fn new(src: LocalId, dst: LocalId, amount: Balance) -> Self {
        Self { src, dst, amount }
    }

    /// True if `id` is the sending or receiving side of this order
    pub fn involves(&self, id: LocalId) -> bool {
        self.src == id || self.dst == id
    }
}

impl fmt::Display for TransferOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} (${})", self.src, self.dst, self.amount)
    }
}
