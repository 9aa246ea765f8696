//! Messages and their wire encoding
//!
//! A frame is a fixed little-endian header followed by a payload whose shape
//! is determined by the message type:
//!
//! ```text
//! +-------+-------------+------+-----------+-------------------+
//! | magic | payload_len | type | timestamp | payload ...       |
//! | u16   | u16         | u16  | u32       | payload_len bytes |
//! +-------+-------------+------+-----------+-------------------+
//! ```
//!
//! | Type                    | Payload                          |
//! |-------------------------|----------------------------------|
//! | STARTED, DONE           | UTF-8 narrative line             |
//! | STOP, ACK, CS_*         | empty                            |
//! | TRANSFER                | bincode [`TransferOrder`]        |
//! | BALANCE_HISTORY         | bincode [`BalanceHistory`]       |
//!
//! Decoding validates the header before looking at the payload, and the
//! payload length against the header before decoding it.

use crate::core::{LocalId, Timestamp};
use crate::models::history::{BalanceHistory, HistoryError};
use crate::models::transfer::TransferOrder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const MESSAGE_MAGIC: u16 = 0xAFAF;

/// Size of the encoded header in bytes
pub const HEADER_LEN: usize = 10;

/// Largest payload a single frame can carry
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - HEADER_LEN;

/// Errors raised when a message is malformed or arrives where the protocol
/// does not allow it
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("frame of {len} bytes is shorter than the {HEADER_LEN}-byte header")]
    Truncated { len: usize },

    #[error("bad magic 0x{found:04x}")]
    BadMagic { found: u16 },

    #[error("unknown message type code {0}")]
    UnknownType(u16),

    #[error("header declares {declared} payload bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload of {len} bytes exceeds the {MAX_PAYLOAD_LEN}-byte limit")]
    PayloadTooLarge { len: usize },

    #[error("malformed {message_type} payload: {reason}")]
    MalformedPayload {
        message_type: MessageType,
        reason: String,
    },

    #[error("unexpected {message_type} from process {src} while {state}")]
    Unexpected {
        message_type: MessageType,
        src: LocalId,
        state: &'static str,
    },

    #[error("duplicate {phase} from process {src}")]
    DuplicatePhase { phase: MessageType, src: LocalId },

    #[error("balance history sent by process {src} belongs to process {owner}")]
    HistoryOwnerMismatch { src: LocalId, owner: LocalId },

    #[error("invalid balance history from process {src}: {source}")]
    InvalidHistory { src: LocalId, source: HistoryError },
}

/// Message kinds exchanged by the group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum MessageType {
    Started = 0,
    Done = 1,
    Ack = 2,
    Stop = 3,
    Transfer = 4,
    BalanceHistory = 5,
    CsRequest = 6,
    CsReply = 7,
    CsRelease = 8,
}

impl MessageType {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// True for the critical-section negotiation messages
    pub fn is_cs(self) -> bool {
        matches!(
            self,
            MessageType::CsRequest | MessageType::CsReply | MessageType::CsRelease
        )
    }
}

impl TryFrom<u16> for MessageType {
    type Error = ProtocolError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => MessageType::Started,
            1 => MessageType::Done,
            2 => MessageType::Ack,
            3 => MessageType::Stop,
            4 => MessageType::Transfer,
            5 => MessageType::BalanceHistory,
            6 => MessageType::CsRequest,
            7 => MessageType::CsReply,
            8 => MessageType::CsRelease,
            other => return Err(ProtocolError::UnknownType(other)),
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Started => "STARTED",
            MessageType::Done => "DONE",
            MessageType::Ack => "ACK",
            MessageType::Stop => "STOP",
            MessageType::Transfer => "TRANSFER",
            MessageType::BalanceHistory => "BALANCE_HISTORY",
            MessageType::CsRequest => "CS_REQUEST",
            MessageType::CsReply => "CS_REPLY",
            MessageType::CsRelease => "CS_RELEASE",
        };
        f.write_str(name)
    }
}

/// Typed message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Empty,
    Text(String),
    Transfer(TransferOrder),
    History(BalanceHistory),
}

/// A stamped message
///
/// Constructed through the per-type constructors so that the payload always
/// matches the type.
///
/// # Example
/// ```
/// use lamport_ledger_core::{Message, MessageType, TransferOrder};
///
/// let msg = Message::transfer(3, TransferOrder::new(1, 2, 4));
/// let bytes = msg.encode().unwrap();
/// let decoded = Message::decode(&bytes).unwrap();
///
/// assert_eq!(decoded.message_type(), MessageType::Transfer);
/// assert_eq!(decoded.timestamp(), 3);
/// assert_eq!(decoded.transfer_order(), Some(&TransferOrder::new(1, 2, 4)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: MessageType,
    timestamp: Timestamp,
    payload: Payload,
}

impl Message {
    pub fn started(timestamp: Timestamp, line: impl Into<String>) -> Self {
        Self::text(MessageType::Started, timestamp, line.into())
    }

    pub fn done(timestamp: Timestamp, line: impl Into<String>) -> Self {
        Self::text(MessageType::Done, timestamp, line.into())
    }

    pub fn stop(timestamp: Timestamp) -> Self {
        Self::empty(MessageType::Stop, timestamp)
    }

    pub fn ack(timestamp: Timestamp) -> Self {
        Self::empty(MessageType::Ack, timestamp)
    }

    pub fn cs_request(timestamp: Timestamp) -> Self {
        Self::empty(MessageType::CsRequest, timestamp)
    }

    pub fn cs_reply(timestamp: Timestamp) -> Self {
        Self::empty(MessageType::CsReply, timestamp)
    }

    pub fn cs_release(timestamp: Timestamp) -> Self {
        Self::empty(MessageType::CsRelease, timestamp)
    }

    pub fn transfer(timestamp: Timestamp, order: TransferOrder) -> Self {
        Self {
            message_type: MessageType::Transfer,
            timestamp,
            payload: Payload::Transfer(order),
        }
    }

    pub fn balance_history(timestamp: Timestamp, history: BalanceHistory) -> Self {
        Self {
            message_type: MessageType::BalanceHistory,
            timestamp,
            payload: Payload::History(history),
        }
    }

    /// A barrier message (STARTED or DONE) carrying a narrative line
    pub fn phase(phase: MessageType, timestamp: Timestamp, line: impl Into<String>) -> Self {
        Self::text(phase, timestamp, line.into())
    }

    fn text(message_type: MessageType, timestamp: Timestamp, line: String) -> Self {
        Self {
            message_type,
            timestamp,
            payload: Payload::Text(line),
        }
    }

    fn empty(message_type: MessageType, timestamp: Timestamp) -> Self {
        Self {
            message_type,
            timestamp,
            payload: Payload::Empty,
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Same message with a new timestamp (used when relaying)
    pub fn restamped(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn transfer_order(&self) -> Option<&TransferOrder> {
        match &self.payload {
            Payload::Transfer(order) => Some(order),
            _ => None,
        }
    }

    pub fn text_line(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(line) => Some(line),
            _ => None,
        }
    }

    pub fn into_history(self) -> Option<BalanceHistory> {
        match self.payload {
            Payload::History(history) => Some(history),
            _ => None,
        }
    }

    /// Serialize into a single frame
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload = match &self.payload {
            Payload::Empty => Vec::new(),
            Payload::Text(line) => line.as_bytes().to_vec(),
            Payload::Transfer(order) => encode_body(self.message_type, order)?,
            Payload::History(history) => encode_body(self.message_type, history)?,
        };
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge { len: payload.len() });
        }

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&MESSAGE_MAGIC.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(&self.message_type.code().to_le_bytes());
        frame.extend_from_slice(&self.timestamp.to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Parse a frame produced by [`Message::encode`]
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated { len: frame.len() });
        }
        let magic = u16::from_le_bytes([frame[0], frame[1]]);
        if magic != MESSAGE_MAGIC {
            return Err(ProtocolError::BadMagic { found: magic });
        }
        let declared = u16::from_le_bytes([frame[2], frame[3]]) as usize;
        let message_type = MessageType::try_from(u16::from_le_bytes([frame[4], frame[5]]))?;
        let timestamp = u32::from_le_bytes([frame[6], frame[7], frame[8], frame[9]]);

        let body = &frame[HEADER_LEN..];
        if body.len() != declared {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }

        let payload = match message_type {
            MessageType::Started | MessageType::Done => {
                let line = String::from_utf8(body.to_vec()).map_err(|e| {
                    ProtocolError::MalformedPayload {
                        message_type,
                        reason: e.to_string(),
                    }
                })?;
                Payload::Text(line)
            }
            MessageType::Stop
            | MessageType::Ack
            | MessageType::CsRequest
            | MessageType::CsReply
            | MessageType::CsRelease => {
                if !body.is_empty() {
                    return Err(ProtocolError::MalformedPayload {
                        message_type,
                        reason: format!("expected empty payload, got {} bytes", body.len()),
                    });
                }
                Payload::Empty
            }
            MessageType::Transfer => Payload::Transfer(decode_body(message_type, body)?),
            MessageType::BalanceHistory => Payload::History(decode_body(message_type, body)?),
        };

        Ok(Self {
            message_type,
            timestamp,
            payload,
        })
    }
}

fn encode_body<T: Serialize>(
    message_type: MessageType,
    value: &T,
) -> Result<Vec<u8>, ProtocolError> {
    bincode::serialize(value).map_err(|e| ProtocolError::MalformedPayload {
        message_type,
        reason: e.to_string(),
    })
}

/// Decode a bincode body that must consume every payload byte
fn decode_body<T: Serialize + DeserializeOwned>(
    message_type: MessageType,
    body: &[u8],
) -> Result<T, ProtocolError> {
    let malformed = |reason: String| ProtocolError::MalformedPayload {
        message_type,
        reason,
    };
    let value: T = bincode::deserialize(body).map_err(|e| malformed(e.to_string()))?;
    let consumed = bincode::serialized_size(&value).map_err(|e| malformed(e.to_string()))?;
    if consumed as usize != body.len() {
        return Err(malformed(format!(
            "{} trailing bytes",
            body.len() - consumed as usize
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_round_trip() {
        for code in 0..=8u16 {
            assert_eq!(MessageType::try_from(code).unwrap().code(), code);
        }
        assert_eq!(
            MessageType::try_from(9),
            Err(ProtocolError::UnknownType(9))
        );
    }

    #[test]
    fn test_restamped_keeps_payload() {
        let msg = Message::transfer(1, TransferOrder::new(1, 2, 3)).restamped(9);
        assert_eq!(msg.timestamp(), 9);
        assert_eq!(msg.transfer_order(), Some(&TransferOrder::new(1, 2, 3)));
    }

    #[test]
    fn test_header_layout() {
        let frame = Message::stop(0x0102_0304).encode().unwrap();
        assert_eq!(frame.len(), HEADER_LEN);
        assert_eq!(&frame[0..2], &[0xAF, 0xAF]);
        assert_eq!(&frame[2..4], &[0, 0]);
        assert_eq!(&frame[4..6], &[3, 0]);
        assert_eq!(&frame[6..10], &[0x04, 0x03, 0x02, 0x01]);
    }
}
