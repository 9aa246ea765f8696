//! Plain-text rendering of a snapshot

use crate::orchestrator::snapshot::GlobalSnapshot;
use std::fmt;

const CELL: usize = 12;

/// One row per tick, one column per worker, then the per-tick total
///
/// A cell shows the balance, followed by `(+n)` when `n` was pending in.
pub fn render_table(snapshot: &GlobalSnapshot) -> String {
    BalanceTable(snapshot).to_string()
}

/// `Display` adapter behind [`render_table`]
pub struct BalanceTable<'a>(pub &'a GlobalSnapshot);

impl fmt::Display for BalanceTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.0;
        let ids: Vec<_> = snapshot.histories().keys().copied().collect();
        let max_time = snapshot.max_time();

        writeln!(f, "Full balance history for time range [0;{}]", max_time)?;
        write!(f, "{:>6} |", "time")?;
        for id in &ids {
            write!(f, "{:>w$} |", format!("proc {}", id), w = CELL)?;
        }
        writeln!(f, "{:>w$}", "total", w = CELL)?;
        writeln!(f, "{}", "-".repeat(8 + (CELL + 2) * (ids.len() + 1)))?;

        for time in 0..=max_time {
            write!(f, "{:>6} |", time)?;
            for &id in &ids {
                let balance = snapshot.balance_at(id, time).unwrap_or(0);
                let pending = snapshot
                    .history(id)
                    .and_then(|h| h.state_at(time))
                    .map(|s| s.pending_in)
                    .unwrap_or(0);
                let cell = if pending > 0 {
                    format!("{} (+{})", balance, pending)
                } else {
                    balance.to_string()
                };
                write!(f, "{:>w$} |", cell, w = CELL)?;
            }
            writeln!(f, "{:>w$}", snapshot.total_at(time), w = CELL)?;
        }

        let report = snapshot.conservation_report();
        writeln!(
            f,
            "opening total ${}, closing total ${}{}",
            report.opening_total,
            report.final_total,
            if report.is_conserved() {
                ""
            } else {
                " (NOT CONSERVED)"
            }
        )
    }
}
