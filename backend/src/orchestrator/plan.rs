//! Transfer plans
//!
//! A plan decides which orders the coordinator issues during the ISSUING
//! stage. Orders are issued one at a time; each waits for its ACK.

use crate::core::{worker_ids, Balance, LocalId};
use crate::models::TransferOrder;
use crate::orchestrator::SimulationError;
use crate::rng::PlanRng;
use serde::{Deserialize, Serialize};

/// Which transfers a bank run issues
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferPlan {
    /// Pass money down the chain: `i -> i+1` for `$i`, then the last worker
    /// pays `$1` back to worker 1
    #[default]
    Robbery,

    /// `transfers` seeded random orders of `1..=max_amount` between distinct
    /// workers
    Random {
        transfers: usize,
        max_amount: Balance,
        seed: u64,
    },

    /// Exactly these orders, in this order
    Explicit { orders: Vec<TransferOrder> },

    /// No transfers at all
    Idle,
}

impl TransferPlan {
    /// Orders to issue for a group with `n_workers` workers
    ///
    /// # Example
    /// ```
    /// use lamport_ledger_core::orchestrator::TransferPlan;
    /// use lamport_ledger_core::TransferOrder;
    ///
    /// let orders = TransferPlan::Robbery.orders(3);
    /// assert_eq!(
    ///     orders,
    ///     vec![
    ///         TransferOrder::new(1, 2, 1),
    ///         TransferOrder::new(2, 3, 2),
    ///         TransferOrder::new(3, 1, 1),
    ///     ]
    /// );
    /// ```
    pub fn orders(&self, n_workers: usize) -> Vec<TransferOrder> {
        match self {
            TransferPlan::Robbery => {
                let max_id = n_workers as LocalId;
                let mut orders: Vec<TransferOrder> = (1..max_id)
                    .map(|i| TransferOrder::new(i, i + 1, Balance::from(i)))
                    .collect();
                if max_id > 1 {
                    orders.push(TransferOrder::new(max_id, 1, 1));
                }
                orders
            }
            TransferPlan::Random {
                transfers,
                max_amount,
                seed,
            } => {
                let mut rng = PlanRng::new(*seed);
                (0..*transfers)
                    .map(|_| {
                        let src = rng.pick_worker(n_workers, None);
                        let dst = rng.pick_worker(n_workers, Some(src));
                        TransferOrder::new(src, dst, rng.amount(*max_amount))
                    })
                    .collect()
            }
            TransferPlan::Explicit { orders } => orders.clone(),
            TransferPlan::Idle => Vec::new(),
        }
    }

    /// Reject plans that cannot run on `n_workers` workers
    pub fn validate(&self, n_workers: usize) -> Result<(), SimulationError> {
        match self {
            TransferPlan::Random {
                transfers,
                max_amount,
                ..
            } => {
                if *transfers > 0 && n_workers < 2 {
                    return Err(SimulationError::InvalidConfig(
                        "random transfers need at least two workers".to_string(),
                    ));
                }
                if *max_amount < 1 {
                    return Err(SimulationError::InvalidConfig(format!(
                        "max_amount must be positive, got {}",
                        max_amount
                    )));
                }
                Ok(())
            }
            TransferPlan::Explicit { orders } => {
                let workers: Vec<LocalId> = worker_ids(n_workers + 1).collect();
                for order in orders {
                    if !workers.contains(&order.src) || !workers.contains(&order.dst) {
                        return Err(SimulationError::InvalidConfig(format!(
                            "transfer {} names a process that is not a worker",
                            order
                        )));
                    }
                    if order.src == order.dst {
                        return Err(SimulationError::InvalidConfig(format!(
                            "transfer {} moves money to itself",
                            order
                        )));
                    }
                    if order.amount <= 0 {
                        return Err(SimulationError::InvalidConfig(format!(
                            "transfer {} has a non-positive amount",
                            order
                        )));
                    }
                }
                Ok(())
            }
            TransferPlan::Robbery | TransferPlan::Idle => Ok(()),
        }
    }
}
