use std::time::Duration;

use thiserror::Error;

/// Faults observed at the byte-exchange layer.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("no complete frame within {0:?}")]
    Timeout(Duration),
    #[error("bit alignment lost mid-frame")]
    Desync,
    #[error("cancel requested")]
    Cancelled,
    #[error("wire endpoint closed")]
    Closed,
}

/// Structural faults in the peer's wire data. All of these abort the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("patch entry maps to offset {0:#05x}, outside the party block")]
    PatchOffsetOutOfRange(usize),
    #[error("patch list ended with section 1 unterminated")]
    UnterminatedPatchList,
    #[error("received party block is malformed: {0}")]
    MalformedBlock(#[from] CodecError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("party count {0} outside 1..=6")]
    CountOutOfRange(u8),
    #[error("species list missing 0xFF terminator")]
    UnterminatedSpeciesList,
    #[error("slot {slot} beyond party count {count}")]
    SlotOutOfRange { slot: u8, count: u8 },
    #[error("species list ends before slot {0}")]
    EmptyPartySlot(u8),
    #[error("record species is zero")]
    SpeciesZero,
    #[error("record level {0} outside 1..=100")]
    LevelOutOfRange(u8),
    #[error("patch list capacity exceeded ({0} sentinel bytes)")]
    PatchOverflow(usize),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("slot {0} out of range")]
    InvalidSlot(u8),
    #[error("slot {0} is empty")]
    EmptySlot(u8),
    #[error("slot {slot} is corrupt: {detail}")]
    Corrupt { slot: u8, detail: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Umbrella error for a trade session run.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("link error: {0}")]
    Link(#[from] ExchangeError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
