mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::sync::Arc;

use crate::limits::*;
use crate::model::{parse_time, Schedule};
use crate::store::{ReservationStore, SlotStore, Storage};

/// The only component that ties reservation records to slot occupancy.
///
/// A seat is taken before its reservation is written and released after its
/// reservation is removed; when the second step fails the first is undone.
pub struct BookingEngine {
    slots: Arc<SlotStore>,
    reservations: Arc<ReservationStore>,
    schedule: Schedule,
}

impl BookingEngine {
    pub fn new(storage: &Storage, schedule: Schedule) -> Self {
        Self::with_stores(storage.slots(), storage.reservations(), schedule)
    }

    pub fn with_stores(
        slots: Arc<SlotStore>,
        reservations: Arc<ReservationStore>,
        schedule: Schedule,
    ) -> Self {
        Self {
            slots,
            reservations,
            schedule,
        }
    }

    /// Timetable used for lazily created dates; its capacity also applies to
    /// slots first touched by a reservation.
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn slots(&self) -> &SlotStore {
        &self.slots
    }

    pub fn reservations(&self) -> &ReservationStore {
        &self.reservations
    }
}

pub(crate) fn validate_name(raw: &str) -> Result<String, EngineError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(EngineError::Validation("name is required".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(name.to_string())
}

pub(crate) fn validate_capacity(capacity: u32) -> Result<u32, EngineError> {
    if capacity == 0 {
        return Err(EngineError::Validation("capacity must be positive".into()));
    }
    if capacity > MAX_SLOT_CAPACITY {
        return Err(EngineError::LimitExceeded("capacity too large"));
    }
    Ok(capacity)
}

/// Normalise a list of slot times, keeping their order.
pub(crate) fn normalise_times(times: &[String]) -> Result<Vec<String>, EngineError> {
    if times.len() > MAX_SEED_TIMES {
        return Err(EngineError::LimitExceeded("too many times"));
    }
    times.iter().map(|t| parse_time(t)).collect()
}
