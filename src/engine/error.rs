use ulid::Ulid;

use crate::model::SlotKey;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or malformed input. Not worth retrying.
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// The slot has no seat left, or does not exist yet.
    #[error("no seats left at {key} (capacity {capacity})")]
    CapacityExceeded { key: SlotKey, capacity: u32 },
    #[error("reservation {0} was modified concurrently")]
    Conflict(Ulid),
    #[error("not found: {0}")]
    NotFound(Ulid),
    /// The WAL writer failed or is gone. The caller may retry.
    #[error("storage error: {0}")]
    Storage(String),
}
