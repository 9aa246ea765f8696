//! Domain models for the ledger simulation

pub mod account;
pub mod event;
pub mod history;
pub mod message;
pub mod transfer;

// Re-exports
pub use account::{Account, AccountError};
pub use event::{Event, EventLog};
pub use history::{BalanceHistory, BalanceState, HistoryError, PENDING_WINDOW};
pub use message::{Message, MessageType, Payload, ProtocolError, MAX_PAYLOAD_LEN, MESSAGE_MAGIC};
pub use transfer::TransferOrder;
