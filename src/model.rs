use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Identity of a slot: calendar date plus start time, both normalised.
///
/// `date` is always `YYYY-MM-DD` and `time` always `HH:MM`, so two requests
/// spelling the same instant differently land on the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: String,
    pub time: String,
}

impl SlotKey {
    pub fn parse(date: &str, time: &str) -> Result<Self, EngineError> {
        Ok(Self {
            date: parse_date(date)?,
            time: parse_time(time)?,
        })
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

/// Normalise an ISO calendar date (`2030-1-5` → `2030-01-05`).
pub fn parse_date(raw: &str) -> Result<String, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EngineError::Validation("date is required".into()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| EngineError::Validation(format!("invalid date {raw:?}, expected YYYY-MM-DD")))
}

/// Normalise a 24h clock time (`9:00` → `09:00`).
pub fn parse_time(raw: &str) -> Result<String, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EngineError::Validation("time is required".into()));
    }
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| EngineError::Validation(format!("invalid time {raw:?}, expected HH:MM")))
}

/// Capacity and occupancy of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub key: SlotKey,
    pub capacity: u32,
    pub booked_count: u32,
}

impl Slot {
    pub fn new(key: SlotKey, capacity: u32) -> Self {
        Self {
            key,
            capacity,
            booked_count: 0,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.booked_count)
    }

    pub fn is_full(&self) -> bool {
        self.booked_count >= self.capacity
    }

    pub fn view(&self) -> SlotView {
        SlotView {
            date: self.key.date.clone(),
            time: self.key.time.clone(),
            capacity: self.capacity,
            booked_count: self.booked_count,
            remaining: self.remaining(),
        }
    }
}

/// A person's seat in a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub name: String,
    pub date: String,
    pub time: String,
}

impl Reservation {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            date: self.date.clone(),
            time: self.time.clone(),
        }
    }
}

/// Fields of a reservation that may change. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReservationChanges {
    pub name: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

/// The default timetable applied to a date the first time it is listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub times: Vec<String>,
    pub capacity: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            times: ["08:00", "09:00", "10:00", "17:00", "18:00", "19:00"]
                .into_iter()
                .map(String::from)
                .collect(),
            capacity: 8,
        }
    }
}

/// The WAL record format. Every mutation of either store is one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Emitted with `booked_count = 0` on creation; compaction snapshots carry
    /// the live count.
    SlotCreated {
        key: SlotKey,
        capacity: u32,
        booked_count: u32,
    },
    SeatTaken {
        key: SlotKey,
    },
    SeatReleased {
        key: SlotKey,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationUpdated {
        reservation: Reservation,
    },
    ReservationDeleted {
        id: Ulid,
    },
}

// ── Result types ────────────────────────────────────────────────

/// A slot as returned to callers, with the derived `remaining` seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub date: String,
    pub time: String,
    pub capacity: u32,
    pub booked_count: u32,
    pub remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booked {
    pub reservation: Reservation,
    pub slot: SlotView,
}

/// A deleted reservation and the slot it gave its seat back to, if that slot exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancelled {
    pub reservation: Reservation,
    pub slot: Option<SlotView>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedOutcome {
    pub inserted: usize,
    pub existing: usize,
}
