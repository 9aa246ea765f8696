//! Process identity and logical time
//!
//! Every process in the group is addressed by a small integer id. Id 0 is the
//! coordinator; ids `1..N` are workers.

pub mod clock;

/// Process identifier within the group
pub type LocalId = u8;

/// Logical timestamp carried by every message
pub type Timestamp = u32;

/// Account balance in whole currency units
pub type Balance = i16;

/// Id of the coordinator process
pub const PARENT_ID: LocalId = 0;

/// Largest worker id a group may contain
pub const MAX_PROCESS_ID: LocalId = 15;

/// Ids of every worker in a group of `n_processes` (coordinator included)
pub fn worker_ids(n_processes: usize) -> impl Iterator<Item = LocalId> {
    (1..n_processes).map(|id| id as LocalId)
}
