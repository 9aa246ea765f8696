//! Critical-section negotiation (Lamport's mutual exclusion)
//!
//! Every process keeps a queue of outstanding requests ordered by
//! `(timestamp, id)`.
//!
//! - `request_cs`: enqueue own request, multicast CS_REQUEST, then wait until
//!   own request heads the queue and a CS_REPLY arrived from every peer
//! - on CS_REQUEST: enqueue the sender's request and answer CS_REPLY
//! - `release_cs`: dequeue own request, multicast CS_RELEASE
//! - on CS_RELEASE: dequeue the sender's request
//!
//! Safety relies on FIFO channels and on replies being stamped later than the
//! request they answer, so processes that negotiate use
//! [`ClockDiscipline::Lamport`](crate::core::clock::ClockDiscipline::Lamport).

use crate::core::{LocalId, Timestamp};
use crate::models::{Event, Message, MessageType, ProtocolError};
use crate::orchestrator::SimulationError;
use crate::protocol::context::ProcessContext;
use crate::transport::Transport;
use std::collections::BTreeSet;
use tracing::debug;

/// Request queue and reply bookkeeping of one process
#[derive(Debug, Clone, Default)]
pub struct LamportMutex {
    queue: BTreeSet<(Timestamp, LocalId)>,
    /// Timestamp of this process's outstanding request
    own_request: Option<Timestamp>,
    replies: BTreeSet<LocalId>,
    held: bool,
}

impl LamportMutex {
    pub fn on_request(&mut self, src: LocalId, timestamp: Timestamp) {
        self.queue.insert((timestamp, src));
    }

    /// Record a reply; false if no request of ours is outstanding
    pub fn on_reply(&mut self, src: LocalId) -> bool {
        if self.own_request.is_none() || self.held {
            return false;
        }
        self.replies.insert(src);
        true
    }

    pub fn on_release(&mut self, src: LocalId) {
        self.queue.retain(|&(_, id)| id != src);
    }

    /// Start an outstanding request stamped `timestamp`
    pub fn begin(&mut self, me: LocalId, timestamp: Timestamp) {
        self.own_request = Some(timestamp);
        self.replies.clear();
        self.queue.insert((timestamp, me));
    }

    /// True when the outstanding request may enter
    pub fn can_enter(&self, me: LocalId, n_peers: usize) -> bool {
        match self.own_request {
            Some(ts) => {
                self.queue.first() == Some(&(ts, me)) && self.replies.len() == n_peers
            }
            None => false,
        }
    }

    pub fn enter(&mut self) {
        self.held = true;
    }

    /// Leave the critical section and drop our request
    pub fn finish(&mut self, me: LocalId) {
        self.queue.retain(|&(_, id)| id != me);
        self.own_request = None;
        self.replies.clear();
        self.held = false;
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn is_requesting(&self) -> bool {
        self.own_request.is_some()
    }

    /// Peers that have not answered the outstanding request
    pub fn missing_replies<'a>(
        &'a self,
        peers: impl Iterator<Item = LocalId> + 'a,
    ) -> impl Iterator<Item = LocalId> + 'a {
        peers.filter(move |peer| !self.replies.contains(peer))
    }

    /// Request at the head of the queue, if any
    pub fn head(&self) -> Option<(Timestamp, LocalId)> {
        self.queue.first().copied()
    }
}

impl<T: Transport> ProcessContext<T> {
    /// Block until this process holds the critical section
    ///
    /// Messages that are not critical-section traffic are deferred.
    pub fn request_cs(&mut self) -> Result<(), SimulationError> {
        if self.mutex.is_requesting() {
            return Err(ProtocolError::Unexpected {
                message_type: MessageType::CsRequest,
                src: self.id(),
                state: "already requesting the critical section",
            }
            .into());
        }
        let me = self.id();
        let time = self.tick();
        self.mutex.begin(me, time);
        self.multicast(&Message::cs_request(time))?;
        debug!(process = me, time, "critical section requested");

        let peers: Vec<LocalId> = self.all_peers().collect();
        while !self.mutex.can_enter(me, peers.len()) {
            let missing: Vec<LocalId> = self.mutex.missing_replies(peers.iter().copied()).collect();
            for peer in missing {
                self.require_open(peer)?;
            }
            if let Some((_, holder)) = self.mutex.head() {
                if holder != me {
                    self.require_open(holder)?;
                }
            }
            if let Some((src, message)) = self.pump()? {
                self.defer(src, message);
            }
        }

        self.mutex.enter();
        let now = self.now();
        self.log(Event::CsEntered { time: now, id: me });
        Ok(())
    }

    /// Leave the critical section and let the next requester in
    pub fn release_cs(&mut self) -> Result<(), SimulationError> {
        let me = self.id();
        if !self.mutex.is_held() {
            return Err(ProtocolError::Unexpected {
                message_type: MessageType::CsRelease,
                src: me,
                state: "not holding the critical section",
            }
            .into());
        }
        let time = self.tick();
        self.mutex.finish(me);
        self.multicast(&Message::cs_release(time))?;
        self.log(Event::CsReleased { time, id: me });
        Ok(())
    }
}
