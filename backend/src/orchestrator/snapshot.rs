//! Global snapshot
//!
//! The coordinator's view of a finished bank run: every worker's balance
//! history keyed by worker id, the transfers it issued, the run id and a
//! hash of the config that produced it.
//!
//! # Critical Invariants
//!
//! - **Complete**: one history per worker, each owned by its key
//! - **Dense**: every history covers `0..=last_time` with no gaps
//! - **Carry-forward**: past the end of a shorter history, its final balance
//!   stands and nothing is pending
//!
//! Per-tick totals include `pending_in`. The pending window is a heuristic,
//! so a per-tick total can drift from the opening total while money is in
//! flight; the closing total must still match.

use crate::core::{Balance, LocalId, Timestamp};
use crate::models::{BalanceHistory, TransferOrder};
use crate::orchestrator::SimulationError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Per-worker balance histories assembled by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSnapshot {
    pub run_id: Uuid,

    /// SHA256 of the canonical config JSON
    pub config_hash: String,

    histories: BTreeMap<LocalId, BalanceHistory>,

    /// Orders the coordinator issued, each acknowledged
    transfers: Vec<TransferOrder>,
}

/// Totals of a snapshot, tick by tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConservationReport {
    pub opening_total: i64,
    pub final_total: i64,
    /// Ticks whose balance-plus-pending total differs from the opening total
    pub drift: Vec<(Timestamp, i64)>,
}

impl ConservationReport {
    pub fn is_conserved(&self) -> bool {
        self.opening_total == self.final_total
    }
}

impl GlobalSnapshot {
    pub fn new(
        run_id: Uuid,
        config_hash: String,
        histories: BTreeMap<LocalId, BalanceHistory>,
        transfers: Vec<TransferOrder>,
    ) -> Self {
        Self {
            run_id,
            config_hash,
            histories,
            transfers,
        }
    }

    pub fn histories(&self) -> &BTreeMap<LocalId, BalanceHistory> {
        &self.histories
    }

    pub fn history(&self, id: LocalId) -> Option<&BalanceHistory> {
        self.histories.get(&id)
    }

    pub fn transfers(&self) -> &[TransferOrder] {
        &self.transfers
    }

    /// Latest tick recorded by any worker
    pub fn max_time(&self) -> Timestamp {
        self.histories
            .values()
            .map(|h| h.last_time())
            .max()
            .unwrap_or(0)
    }

    /// Balance of `id` at tick `time`, carrying the final balance forward
    pub fn balance_at(&self, id: LocalId, time: Timestamp) -> Option<Balance> {
        let history = self.histories.get(&id)?;
        history.balance_at(time).or_else(|| history.final_balance())
    }

    fn pending_at(&self, id: LocalId, time: Timestamp) -> Balance {
        self.histories
            .get(&id)
            .and_then(|h| h.state_at(time))
            .map(|s| s.pending_in)
            .unwrap_or(0)
    }

    pub fn final_balances(&self) -> BTreeMap<LocalId, Balance> {
        self.histories
            .iter()
            .filter_map(|(id, h)| h.final_balance().map(|b| (*id, b)))
            .collect()
    }

    /// Sum of opening balances
    pub fn opening_total(&self) -> i64 {
        self.histories
            .values()
            .filter_map(|h| h.balance_at(0))
            .map(i64::from)
            .sum()
    }

    pub fn final_total(&self) -> i64 {
        self.final_balances().values().copied().map(i64::from).sum()
    }

    /// Sum of balance plus pending-in across workers at tick `time`
    pub fn total_at(&self, time: Timestamp) -> i64 {
        self.histories
            .keys()
            .map(|&id| {
                let balance = self.balance_at(id, time).unwrap_or(0);
                i64::from(balance) + i64::from(self.pending_at(id, time))
            })
            .sum()
    }

    pub fn conservation_report(&self) -> ConservationReport {
        let opening_total = self.opening_total();
        let drift = (0..=self.max_time())
            .map(|t| (t, self.total_at(t)))
            .filter(|(_, total)| *total != opening_total)
            .collect();
        ConservationReport {
            opening_total,
            final_total: self.final_total(),
            drift,
        }
    }

    pub fn is_conserved(&self) -> bool {
        self.opening_total() == self.final_total()
    }

    pub fn to_json(&self) -> Result<String, SimulationError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            SimulationError::SerializationError(format!("Snapshot serialization failed: {}", e))
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        let snapshot: Self = serde_json::from_str(json).map_err(|e| {
            SimulationError::SerializationError(format!("Snapshot deserialization failed: {}", e))
        })?;
        for history in snapshot.histories.values() {
            history
                .validate()
                .map_err(|e| SimulationError::SerializationError(e.to_string()))?;
        }
        Ok(snapshot)
    }
}

/// Compute SHA256 of a config's canonical JSON form
///
/// Object keys are sorted recursively, so field order does not change the
/// hash.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;

    let value = serde_json::to_value(config).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value)).map_err(|e| {
        SimulationError::SerializationError(format!("Config serialization failed: {}", e))
    })?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
