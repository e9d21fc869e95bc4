use tracing::debug;
use ulid::Ulid;

use crate::model::*;

use super::{normalise_times, BookingEngine, EngineError};

impl BookingEngine {
    /// Slots of `date` with their remaining seats, ordered by time.
    ///
    /// A date nobody has touched yet is seeded from `schedule` first, so the
    /// caller always sees a timetable.
    pub async fn list_slots_for_date(
        &self,
        date: &str,
        schedule: &Schedule,
    ) -> Result<Vec<SlotView>, EngineError> {
        let date = parse_date(date)?;
        let mut slots = self.slots.list_by_date(&date).await;

        if slots.is_empty() && !schedule.times.is_empty() {
            let times = normalise_times(&schedule.times)?;
            let outcome = self
                .slots
                .bulk_ensure(&date, &times, schedule.capacity)
                .await?;
            debug!(%date, inserted = outcome.inserted, "seeded default schedule");
            slots = self.slots.list_by_date(&date).await;
        }

        Ok(slots.iter().map(Slot::view).collect())
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.reservations
            .get(&id)
            .await
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn list_reservations(&self) -> Vec<Reservation> {
        self.reservations.list_all().await
    }

    /// Number of live reservations at `key`. Always equals the slot's `booked_count`.
    pub async fn reservations_at(&self, key: &SlotKey) -> usize {
        self.reservations
            .list_all()
            .await
            .iter()
            .filter(|r| r.date == key.date && r.time == key.time)
            .count()
    }
}
