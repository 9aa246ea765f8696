//! Narrative event log
//!
//! Every process records what it did, in logical-time order, as typed
//! [`Event`]s. The `Display` form of an event is the human-readable log line
//! written to the events log, and the same line doubles as the payload of
//! STARTED and DONE messages.
//!
//! Recording an event also emits it through `tracing` at `info` level.
//!
//! # Example
//!
//! ```rust
//! use lamport_ledger_core::models::{Event, EventLog};
//!
//! let mut log = EventLog::new();
//! log.log(Event::Started { time: 1, id: 2, balance: 10 });
//! log.log(Event::ReceivedAllStarted { time: 1, id: 2 });
//!
//! assert_eq!(log.len(), 2);
//! assert_eq!(
//!     log.events()[0].to_string(),
//!     "1: process 2 has STARTED with balance $10"
//! );
//! ```

use crate::core::{Balance, LocalId, Timestamp, PARENT_ID};
use std::fmt;
use tracing::info;

/// Something a process did at a logical time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started {
        time: Timestamp,
        id: LocalId,
        balance: Balance,
    },

    ReceivedAllStarted {
        time: Timestamp,
        id: LocalId,
    },

    /// Worker relayed a transfer and debited itself
    TransferOut {
        time: Timestamp,
        src: LocalId,
        dst: LocalId,
        amount: Balance,
    },

    /// Worker accepted a transfer and credited itself
    TransferIn {
        time: Timestamp,
        src: LocalId,
        dst: LocalId,
        amount: Balance,
    },

    Done {
        time: Timestamp,
        id: LocalId,
        balance: Balance,
    },

    ReceivedAllDone {
        time: Timestamp,
        id: LocalId,
    },

    /// One unit of mutex-variant work
    LoopIteration {
        time: Timestamp,
        id: LocalId,
        iteration: usize,
        total: usize,
    },

    CsEntered {
        time: Timestamp,
        id: LocalId,
    },

    CsReleased {
        time: Timestamp,
        id: LocalId,
    },

    /// Coordinator saw the ACK closing a transfer it issued
    TransferAcked {
        time: Timestamp,
        src: LocalId,
        dst: LocalId,
        amount: Balance,
    },

    /// Coordinator multicast STOP
    StopSent {
        time: Timestamp,
    },
}

impl Event {
    /// Logical time at which the event happened
    pub fn time(&self) -> Timestamp {
        match self {
            Event::Started { time, .. }
            | Event::ReceivedAllStarted { time, .. }
            | Event::TransferOut { time, .. }
            | Event::TransferIn { time, .. }
            | Event::Done { time, .. }
            | Event::ReceivedAllDone { time, .. }
            | Event::LoopIteration { time, .. }
            | Event::CsEntered { time, .. }
            | Event::CsReleased { time, .. }
            | Event::TransferAcked { time, .. }
            | Event::StopSent { time } => *time,
        }
    }

    /// Process that recorded the event
    pub fn process(&self) -> LocalId {
        match self {
            Event::Started { id, .. }
            | Event::ReceivedAllStarted { id, .. }
            | Event::Done { id, .. }
            | Event::ReceivedAllDone { id, .. }
            | Event::LoopIteration { id, .. }
            | Event::CsEntered { id, .. }
            | Event::CsReleased { id, .. } => *id,
            Event::TransferOut { src, .. } => *src,
            Event::TransferIn { dst, .. } => *dst,
            Event::TransferAcked { .. } | Event::StopSent { .. } => PARENT_ID,
        }
    }

    /// Short name of the event kind
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Started { .. } => "Started",
            Event::ReceivedAllStarted { .. } => "ReceivedAllStarted",
            Event::TransferOut { .. } => "TransferOut",
            Event::TransferIn { .. } => "TransferIn",
            Event::Done { .. } => "Done",
            Event::ReceivedAllDone { .. } => "ReceivedAllDone",
            Event::LoopIteration { .. } => "LoopIteration",
            Event::CsEntered { .. } => "CsEntered",
            Event::CsReleased { .. } => "CsReleased",
            Event::TransferAcked { .. } => "TransferAcked",
            Event::StopSent { .. } => "StopSent",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Started { time, id, balance } => {
                write!(f, "{time}: process {id} has STARTED with balance ${balance}")
            }
            Event::ReceivedAllStarted { time, id } => {
                write!(f, "{time}: process {id} received all STARTED messages")
            }
            Event::TransferOut {
                time,
                src,
                dst,
                amount,
            } => write!(f, "{time}: process {src} transferred ${amount} to process {dst}"),
            Event::TransferIn {
                time,
                src,
                dst,
                amount,
            } => write!(f, "{time}: process {dst} received ${amount} from process {src}"),
            Event::Done { time, id, balance } => {
                write!(f, "{time}: process {id} has DONE with balance ${balance}")
            }
            Event::ReceivedAllDone { time, id } => {
                write!(f, "{time}: process {id} received all DONE messages")
            }
            Event::LoopIteration {
                id,
                iteration,
                total,
                ..
            } => write!(f, "process {id} is doing {iteration} iteration out of {total}"),
            Event::CsEntered { time, id } => {
                write!(f, "{time}: process {id} entered the critical section")
            }
            Event::CsReleased { time, id } => {
                write!(f, "{time}: process {id} released the critical section")
            }
            Event::TransferAcked {
                time,
                src,
                dst,
                amount,
            } => write!(
                f,
                "{time}: process {PARENT_ID} got ACK for ${amount} from process {src} to process {dst}"
            ),
            Event::StopSent { time } => write!(f, "{time}: process {PARENT_ID} sent STOP"),
        }
    }
}

/// Ordered list of events recorded by one process
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Record an event and emit it through `tracing`
    pub fn log(&mut self, event: Event) {
        info!(
            process = event.process(),
            time = event.time(),
            kind = event.event_type(),
            "{}",
            event
        );
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_lines() {
        let out = Event::TransferOut {
            time: 2,
            src: 1,
            dst: 2,
            amount: 4,
        };
        let inn = Event::TransferIn {
            time: 2,
            src: 1,
            dst: 2,
            amount: 4,
        };
        assert_eq!(out.to_string(), "2: process 1 transferred $4 to process 2");
        assert_eq!(inn.to_string(), "2: process 2 received $4 from process 1");
        assert_eq!(out.process(), 1);
        assert_eq!(inn.process(), 2);
    }

    #[test]
    fn test_events_of_type() {
        let mut log = EventLog::new();
        log.log(Event::Done {
            time: 5,
            id: 1,
            balance: 0,
        });
        log.log(Event::ReceivedAllDone { time: 5, id: 1 });
        assert_eq!(log.events_of_type("Done").len(), 1);
        assert!(log.events_of_type("Started").is_empty());
    }
}
