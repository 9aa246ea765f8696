//! Channel transport
//!
//! The protocol core talks to its peers only through the [`Transport`] trait.
//! [`mesh`] provides the in-process implementation: a full mesh of
//! unidirectional FIFO byte channels, one per ordered pair of processes.
//!
//! # Guarantees
//!
//! - Messages from one sender to one destination arrive in send order
//! - Nothing is guaranteed across different senders
//! - "Nothing queued" is `Ok(None)`, never an error

pub mod mesh;

use crate::core::LocalId;
use crate::models::{Message, ProtocolError};
use thiserror::Error;

pub use mesh::{Mesh, MeshEndpoint};

/// Channel-level failures. Always fatal for the owning process.
#[derive(Debug, Error, PartialEq)]
pub enum TransportError {
    #[error("process {peer} is not part of a {size}-process group")]
    UnknownPeer { peer: LocalId, size: usize },

    #[error("process {0} cannot address itself")]
    SelfAddressed(LocalId),

    #[error("channel with process {peer} is closed")]
    Disconnected { peer: LocalId },

    #[error("every incoming channel of process {0} is closed")]
    AllPeersClosed(LocalId),

    #[error("endpoint of process {0} is already closed")]
    AlreadyClosed(LocalId),

    #[error("frame from process {src} rejected: {source}")]
    Corrupt { src: LocalId, source: ProtocolError },

    #[error("cannot encode message: {0}")]
    Encode(ProtocolError),
}

/// Point-to-point messaging between the processes of one group
pub trait Transport {
    /// Id of the process owning this endpoint
    fn local_id(&self) -> LocalId;

    /// Number of processes in the group, coordinator included
    fn group_size(&self) -> usize;

    fn send(&mut self, dst: LocalId, message: &Message) -> Result<(), TransportError>;

    /// Send to every process except self
    fn send_multicast(&mut self, message: &Message) -> Result<(), TransportError> {
        let me = self.local_id();
        for dst in 0..self.group_size() as LocalId {
            if dst != me {
                self.send(dst, message)?;
            }
        }
        Ok(())
    }

    /// Non-blocking read of the next message from `src`
    fn receive_from(&mut self, src: LocalId) -> Result<Option<Message>, TransportError>;

    /// Non-blocking read of the next message from any peer, scanning peers in
    /// ascending id order
    fn receive_any(&mut self) -> Result<Option<(LocalId, Message)>, TransportError>;

    /// Block until some peer has a message ready and return it
    ///
    /// There is no timeout. A peer whose channel closed after its last
    /// message was drained is reported once as `Disconnected` and skipped by
    /// later waits. Fails with `AllPeersClosed` when nothing is left open.
    fn wait_any(&mut self) -> Result<(LocalId, Message), TransportError>;

    /// True while messages can still arrive from `peer`
    fn is_peer_open(&self, peer: LocalId) -> bool;

    /// Tear down every channel end owned by this process. Must be called once.
    fn close(&mut self) -> Result<(), TransportError>;
}
