//! Logical clock for a single process
//!
//! The clock advances only when the process stamps an outgoing message.
//! Under the default discipline, receiving a message leaves the clock alone,
//! so it purely indexes the process's own event sequence. The `Lamport`
//! discipline additionally merges received timestamps.

use crate::core::Timestamp;
use serde::{Deserialize, Serialize};

/// How received timestamps affect the local clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClockDiscipline {
    /// Received timestamps are ignored
    #[default]
    LocalOnly,

    /// `clock = max(clock, received)` on every receive
    Lamport,
}

/// Per-process monotonically non-decreasing counter
///
/// # Example
/// ```
/// use lamport_ledger_core::LamportClock;
///
/// let mut clock = LamportClock::new();
/// assert_eq!(clock.current_time(), 0);
///
/// assert_eq!(clock.tick(), 1);
/// assert_eq!(clock.tick(), 2);
/// assert_eq!(clock.current_time(), 2);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LamportClock {
    /// Value of the most recent tick (0 before any event)
    time: Timestamp,

    discipline: ClockDiscipline,
}

impl LamportClock {
    /// Create a clock at time 0 that ignores received timestamps
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock at time 0 with the given receive discipline
    pub fn with_discipline(discipline: ClockDiscipline) -> Self {
        Self {
            time: 0,
            discipline,
        }
    }

    /// Advance the clock and return the new value
    ///
    /// Call exactly once immediately before stamping a locally originated
    /// message.
    pub fn tick(&mut self) -> Timestamp {
        self.time += 1;
        self.time
    }

    /// Current clock value
    pub fn current_time(&self) -> Timestamp {
        self.time
    }

    /// Account for a timestamp carried by a received message
    ///
    /// Only has an effect under [`ClockDiscipline::Lamport`].
    ///
    /// # Example
    /// ```
    /// use lamport_ledger_core::{ClockDiscipline, LamportClock};
    ///
    /// let mut local = LamportClock::new();
    /// local.observe(7);
    /// assert_eq!(local.current_time(), 0);
    ///
    /// let mut merged = LamportClock::with_discipline(ClockDiscipline::Lamport);
    /// merged.observe(7);
    /// assert_eq!(merged.current_time(), 7);
    /// assert_eq!(merged.tick(), 8);
    /// ```
    pub fn observe(&mut self, received: Timestamp) {
        if self.discipline == ClockDiscipline::Lamport {
            self.time = self.time.max(received);
        }
    }

    /// Receive discipline this clock follows
    pub fn discipline(&self) -> ClockDiscipline {
        self.discipline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lamport_observe_never_moves_backwards() {
        let mut clock = LamportClock::with_discipline(ClockDiscipline::Lamport);
        clock.tick();
        clock.tick();
        clock.tick();
        clock.observe(1);
        assert_eq!(clock.current_time(), 3);
    }
}
