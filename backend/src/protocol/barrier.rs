//! Barrier synchronization
//!
//! `announce` stamps and multicasts a STARTED or DONE message; `await_all`
//! blocks until the same phase has been heard from every other worker exactly
//! once. Arrival order does not matter.
//!
//! While waiting, messages for later stages (a TRANSFER or STOP from the
//! coordinator, a DONE from a faster peer, a BALANCE_HISTORY that followed a
//! DONE) are deferred rather than dropped, so the stage that needs them finds
//! them in the inbox.

use crate::core::{LocalId, Timestamp};
use crate::models::{Event, Message, MessageType, ProtocolError};
use crate::orchestrator::SimulationError;
use crate::protocol::context::ProcessContext;
use crate::transport::Transport;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

impl<T: Transport> ProcessContext<T> {
    /// Stamp and multicast a phase message
    ///
    /// `describe` builds the narrative event for the stamped time; the event
    /// is logged and its line becomes the message payload.
    pub fn announce(
        &mut self,
        phase: MessageType,
        describe: impl FnOnce(Timestamp) -> Event,
    ) -> Result<Timestamp, SimulationError> {
        let time = self.tick();
        let event = describe(time);
        let line = event.to_string();
        self.log(event);
        self.multicast(&Message::phase(phase, time, line))?;
        debug!(process = self.id(), time, %phase, "phase announced");
        Ok(time)
    }

    /// Block until `phase` was received once from every other worker
    pub fn await_all(&mut self, phase: MessageType) -> Result<(), SimulationError> {
        let peers: BTreeSet<LocalId> = self.worker_peers().collect();
        self.gather(phase, &peers)?;
        Ok(())
    }

    /// Collect exactly one message of `message_type` from each of `from`
    ///
    /// Deferred messages are consulted first. A second message of the same
    /// type from a peer is a protocol violation; a peer whose channel closes
    /// before its message arrived is a transport failure.
    pub fn gather(
        &mut self,
        message_type: MessageType,
        from: &BTreeSet<LocalId>,
    ) -> Result<BTreeMap<LocalId, Message>, SimulationError> {
        let mut received = BTreeMap::new();

        for (src, message) in self.take_deferred(message_type) {
            accept(&mut received, from, src, message, message_type)?;
        }

        while received.len() < from.len() {
            for peer in from.iter().filter(|peer| !received.contains_key(*peer)) {
                self.require_open(*peer)?;
            }
            let Some((src, message)) = self.pump()? else {
                continue;
            };
            if message.message_type() == message_type && from.contains(&src) {
                accept(&mut received, from, src, message, message_type)?;
            } else {
                self.defer(src, message);
            }
        }

        Ok(received)
    }
}

fn accept(
    received: &mut BTreeMap<LocalId, Message>,
    from: &BTreeSet<LocalId>,
    src: LocalId,
    message: Message,
    message_type: MessageType,
) -> Result<(), ProtocolError> {
    if !from.contains(&src) {
        return Err(ProtocolError::Unexpected {
            message_type,
            src,
            state: "waiting on other peers",
        });
    }
    if received.insert(src, message).is_some() {
        return Err(ProtocolError::DuplicatePhase {
            phase: message_type,
            src,
        });
    }
    Ok(())
}
