//! Process context
//!
//! Everything one process owns while it runs: its id, its logical clock, its
//! transport endpoint, the inbox of deferred messages, the mutual-exclusion
//! state and the narrative event log. Components receive the context by
//! `&mut`; there is no process-global state.
//!
//! # Receiving
//!
//! All blocking receives go through [`ProcessContext::pump`], which waits on
//! the transport's readiness multiplexer, applies the clock discipline and
//! services critical-section traffic inline. Anything else is returned to the
//! caller, which either handles it or defers it for a later stage.

use crate::core::clock::{ClockDiscipline, LamportClock};
use crate::core::{worker_ids, LocalId, Timestamp, PARENT_ID};
use crate::models::{Event, EventLog, Message, MessageType, ProtocolError};
use crate::orchestrator::SimulationError;
use crate::protocol::mutex::LamportMutex;
use crate::transport::{Transport, TransportError};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// State owned by a single process of the group
pub struct ProcessContext<T: Transport> {
    id: LocalId,
    n_processes: usize,
    clock: LamportClock,
    transport: T,
    /// Messages received ahead of the stage that consumes them
    inbox: VecDeque<(LocalId, Message)>,
    pub(crate) mutex: LamportMutex,
    events: EventLog,
    closed: bool,
}

impl<T: Transport> ProcessContext<T> {
    pub fn new(transport: T, discipline: ClockDiscipline) -> Self {
        Self {
            id: transport.local_id(),
            n_processes: transport.group_size(),
            clock: LamportClock::with_discipline(discipline),
            transport,
            inbox: VecDeque::new(),
            mutex: LamportMutex::default(),
            events: EventLog::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> LocalId {
        self.id
    }

    pub fn n_processes(&self) -> usize {
        self.n_processes
    }

    pub fn is_coordinator(&self) -> bool {
        self.id == PARENT_ID
    }

    /// Workers other than this process
    pub fn worker_peers(&self) -> impl Iterator<Item = LocalId> + '_ {
        worker_ids(self.n_processes).filter(move |&id| id != self.id)
    }

    /// Every process other than this one
    pub fn all_peers(&self) -> impl Iterator<Item = LocalId> + '_ {
        (0..self.n_processes as LocalId).filter(move |&id| id != self.id)
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.current_time()
    }

    /// Advance the clock for a message about to be stamped
    pub fn tick(&mut self) -> Timestamp {
        self.clock.tick()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn log(&mut self, event: Event) {
        self.events.log(event);
    }

    pub fn send(&mut self, dst: LocalId, message: &Message) -> Result<(), SimulationError> {
        self.transport.send(dst, message)?;
        Ok(())
    }

    pub fn multicast(&mut self, message: &Message) -> Result<(), SimulationError> {
        self.transport.send_multicast(message)?;
        Ok(())
    }

    /// Fail if `peer` can no longer deliver the message this process waits for
    pub fn require_open(&self, peer: LocalId) -> Result<(), SimulationError> {
        if self.transport.is_peer_open(peer) {
            Ok(())
        } else {
            Err(TransportError::Disconnected { peer }.into())
        }
    }

    /// Wait for one message from the transport
    ///
    /// Returns `None` when the message was critical-section traffic (already
    /// handled) or when the wait only discovered that a peer closed its
    /// channel. Callers loop and re-check whatever they are waiting for.
    pub fn pump(&mut self) -> Result<Option<(LocalId, Message)>, SimulationError> {
        let (src, message) = match self.transport.wait_any() {
            Ok(received) => received,
            Err(TransportError::Disconnected { peer }) => {
                debug!(process = self.id, peer, "peer closed its channel");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        self.clock.observe(message.timestamp());
        if message.message_type().is_cs() {
            self.service_cs(src, &message)?;
            return Ok(None);
        }
        Ok(Some((src, message)))
    }

    /// Next message for the current stage: deferred messages first, then the
    /// transport
    ///
    /// Blocks until a message arrives. Fails if the coordinator's channel is
    /// gone, since every worker stage ends on a coordinator message or on
    /// messages already deferred. A message this returns must not be deferred
    /// again by the same stage, or the stage reads it back forever.
    pub fn next_message(&mut self) -> Result<(LocalId, Message), SimulationError> {
        if let Some(received) = self.inbox.pop_front() {
            return Ok(received);
        }
        loop {
            if !self.is_coordinator() {
                self.require_open(PARENT_ID)?;
            }
            if let Some(received) = self.pump()? {
                return Ok(received);
            }
        }
    }

    /// Keep a message for a later stage
    pub fn defer(&mut self, src: LocalId, message: Message) {
        debug!(
            process = self.id,
            src,
            kind = %message.message_type(),
            "deferring message"
        );
        self.inbox.push_back((src, message));
    }

    /// Remove and return every deferred message of the given type, in arrival
    /// order
    pub fn take_deferred(&mut self, message_type: MessageType) -> Vec<(LocalId, Message)> {
        let (taken, kept): (VecDeque<_>, VecDeque<_>) = self
            .inbox
            .drain(..)
            .partition(|(_, message)| message.message_type() == message_type);
        self.inbox = kept;
        taken.into_iter().collect()
    }

    pub fn deferred_len(&self) -> usize {
        self.inbox.len()
    }

    fn service_cs(&mut self, src: LocalId, message: &Message) -> Result<(), SimulationError> {
        match message.message_type() {
            MessageType::CsRequest => {
                self.mutex.on_request(src, message.timestamp());
                let time = self.tick();
                self.transport.send(src, &Message::cs_reply(time))?;
            }
            MessageType::CsReply => {
                if !self.mutex.on_reply(src) {
                    return Err(ProtocolError::Unexpected {
                        message_type: MessageType::CsReply,
                        src,
                        state: "not requesting the critical section",
                    }
                    .into());
                }
            }
            MessageType::CsRelease => self.mutex.on_release(src),
            other => {
                return Err(ProtocolError::Unexpected {
                    message_type: other,
                    src,
                    state: "servicing critical-section traffic",
                }
                .into())
            }
        }
        Ok(())
    }

    /// Tear down the transport and hand back the event log
    ///
    /// Must be called once, after this process's traffic has ceased.
    pub fn close(&mut self) -> Result<EventLog, SimulationError> {
        if !self.inbox.is_empty() {
            warn!(
                process = self.id,
                undelivered = self.inbox.len(),
                "closing with deferred messages never consumed"
            );
        }
        self.transport.close()?;
        self.closed = true;
        Ok(std::mem::take(&mut self.events))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
