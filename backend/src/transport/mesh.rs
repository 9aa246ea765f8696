//! In-process channel mesh
//!
//! [`Mesh::build`] creates one unbounded crossbeam channel for every ordered
//! pair `(i, j)` with `i != j` and hands each process an endpoint holding the
//! write ends of its outgoing channels and the read ends of its incoming
//! ones. Endpoints are `Send`, so each can be moved into its own thread;
//! nothing else is shared.
//!
//! Frames travel as encoded bytes and are decoded on receipt, so every
//! message crosses the same wire codec a pipe-based transport would use.
//!
//! A read end whose sender has gone away is retired once drained. Blocking
//! waits use [`Select`] over the read ends that are still open; the wait that
//! discovers a closed channel reports it as `Disconnected` exactly once.

use crate::core::LocalId;
use crate::models::Message;
use crate::transport::{Transport, TransportError};
use crossbeam::channel::{unbounded, Receiver, Select, Sender, TryRecvError};
use tracing::debug;

type Frame = Vec<u8>;

/// Factory for a fully connected group of endpoints
pub struct Mesh;

impl Mesh {
    /// Create endpoints for `n_processes` processes, indexed by id
    ///
    /// # Example
    /// ```
    /// use lamport_ledger_core::transport::{Mesh, Transport};
    /// use lamport_ledger_core::Message;
    ///
    /// let mut endpoints = Mesh::build(3);
    /// let mut two = endpoints.pop().unwrap();
    /// let mut one = endpoints.pop().unwrap();
    ///
    /// one.send(2, &Message::stop(1)).unwrap();
    /// let (src, msg) = two.receive_any().unwrap().unwrap();
    /// assert_eq!(src, 1);
    /// assert_eq!(msg.timestamp(), 1);
    /// ```
    pub fn build(n_processes: usize) -> Vec<MeshEndpoint> {
        let mut outgoing: Vec<Vec<Option<Sender<Frame>>>> =
            (0..n_processes).map(|_| vec![None; n_processes]).collect();
        let mut incoming: Vec<Vec<Option<Receiver<Frame>>>> =
            (0..n_processes).map(|_| vec![None; n_processes]).collect();

        for src in 0..n_processes {
            for dst in 0..n_processes {
                if src == dst {
                    continue;
                }
                let (tx, rx) = unbounded();
                outgoing[src][dst] = Some(tx);
                incoming[dst][src] = Some(rx);
                debug!(src, dst, "channel {} ==> {} created", src, dst);
            }
        }

        outgoing
            .into_iter()
            .zip(incoming)
            .enumerate()
            .map(|(id, (outgoing, incoming))| MeshEndpoint {
                id: id as LocalId,
                size: n_processes,
                outgoing,
                incoming,
                closed: false,
            })
            .collect()
    }
}

/// The channel ends owned by one process
#[derive(Debug)]
pub struct MeshEndpoint {
    id: LocalId,
    size: usize,
    /// Write ends, indexed by destination
    outgoing: Vec<Option<Sender<Frame>>>,
    /// Read ends, indexed by source; `None` once retired
    incoming: Vec<Option<Receiver<Frame>>>,
    closed: bool,
}

impl MeshEndpoint {
    fn check_peer(&self, peer: LocalId) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::AlreadyClosed(self.id));
        }
        if peer == self.id {
            return Err(TransportError::SelfAddressed(peer));
        }
        let index = peer as usize;
        if index >= self.size {
            return Err(TransportError::UnknownPeer {
                peer,
                size: self.size,
            });
        }
        Ok(index)
    }

    fn retire(&mut self, src: usize) {
        if self.incoming[src].take().is_some() {
            debug!(process = self.id, peer = src, "incoming channel drained and closed");
        }
    }

    fn decode(src: usize, frame: &[u8]) -> Result<Message, TransportError> {
        Message::decode(frame).map_err(|source| TransportError::Corrupt {
            src: src as LocalId,
            source,
        })
    }

    /// Write an already encoded frame to `dst`
    ///
    /// [`Transport::send`] goes through here after encoding.
    pub fn send_frame(&mut self, dst: LocalId, frame: Vec<u8>) -> Result<(), TransportError> {
        let index = self.check_peer(dst)?;
        let sender = self.outgoing[index]
            .as_ref()
            .ok_or(TransportError::Disconnected { peer: dst })?;
        sender
            .send(frame)
            .map_err(|_| TransportError::Disconnected { peer: dst })
    }
}

impl Transport for MeshEndpoint {
    fn local_id(&self) -> LocalId {
        self.id
    }

    fn group_size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dst: LocalId, message: &Message) -> Result<(), TransportError> {
        let frame = message.encode().map_err(TransportError::Encode)?;
        self.send_frame(dst, frame)
    }

    fn receive_from(&mut self, src: LocalId) -> Result<Option<Message>, TransportError> {
        let index = self.check_peer(src)?;
        let result = match &self.incoming[index] {
            Some(rx) => rx.try_recv(),
            None => return Err(TransportError::Disconnected { peer: src }),
        };
        match result {
            Ok(frame) => Self::decode(index, &frame).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.retire(index);
                Err(TransportError::Disconnected { peer: src })
            }
        }
    }

    fn receive_any(&mut self) -> Result<Option<(LocalId, Message)>, TransportError> {
        if self.closed {
            return Err(TransportError::AlreadyClosed(self.id));
        }
        for src in 0..self.size {
            let result = match &self.incoming[src] {
                Some(rx) => rx.try_recv(),
                None => continue,
            };
            match result {
                Ok(frame) => return Ok(Some((src as LocalId, Self::decode(src, &frame)?))),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.retire(src),
            }
        }
        if self.incoming.iter().all(Option::is_none) {
            return Err(TransportError::AllPeersClosed(self.id));
        }
        Ok(None)
    }

    fn wait_any(&mut self) -> Result<(LocalId, Message), TransportError> {
        if self.closed {
            return Err(TransportError::AlreadyClosed(self.id));
        }
        let (src, result) = {
            let open: Vec<(usize, &Receiver<Frame>)> = self
                .incoming
                .iter()
                .enumerate()
                .filter_map(|(src, rx)| rx.as_ref().map(|rx| (src, rx)))
                .collect();
            if open.is_empty() {
                return Err(TransportError::AllPeersClosed(self.id));
            }

            let mut select = Select::new();
            for (_, rx) in &open {
                select.recv(rx);
            }
            let operation = select.select();
            let (src, rx) = open[operation.index()];
            (src, operation.recv(rx))
        };

        match result {
            Ok(frame) => Ok((src as LocalId, Self::decode(src, &frame)?)),
            Err(_) => {
                self.retire(src);
                Err(TransportError::Disconnected {
                    peer: src as LocalId,
                })
            }
        }
    }

    fn is_peer_open(&self, peer: LocalId) -> bool {
        self.incoming
            .get(peer as usize)
            .map(Option::is_some)
            .unwrap_or(false)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::AlreadyClosed(self.id));
        }
        for peer in 0..self.size {
            if self.outgoing[peer].take().is_some() {
                debug!(process = self.id, peer, "closing outgoing channel");
            }
            if self.incoming[peer].take().is_some() {
                debug!(process = self.id, peer, "closing incoming channel");
            }
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_wires_every_ordered_pair() {
        let endpoints = Mesh::build(4);
        assert_eq!(endpoints.len(), 4);
        for endpoint in &endpoints {
            for peer in 0..4u8 {
                assert_eq!(endpoint.is_peer_open(peer), peer != endpoint.local_id());
            }
        }
    }

    #[test]
    fn test_send_to_self_is_rejected() {
        let mut endpoints = Mesh::build(2);
        let err = endpoints[0].send(0, &Message::stop(1)).unwrap_err();
        assert_eq!(err, TransportError::SelfAddressed(0));
    }
}
