use tracing::{error, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::{normalise_times, validate_capacity, validate_name, BookingEngine, EngineError};

impl BookingEngine {
    pub async fn create_reservation(
        &self,
        name: &str,
        date: &str,
        time: &str,
    ) -> Result<Booked, EngineError> {
        let name = validate_name(name)?;
        let key = SlotKey::parse(date, time)?;

        self.slots.ensure_exists(&key, self.schedule.capacity).await?;
        let slot = self.take_seat(&key).await?;

        let reservation = match self.reservations.create(name, key.clone()).await {
            Ok(r) => r,
            Err(e) => {
                self.give_back_seat(&key, &e).await;
                return Err(e);
            }
        };

        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(id = %reservation.id, %key, booked = slot.booked_count, "reservation created");
        Ok(Booked {
            reservation,
            slot: slot.view(),
        })
    }

    pub async fn delete_reservation(&self, id: Ulid) -> Result<Cancelled, EngineError> {
        let reservation = self.reservations.delete(id).await?;
        let slot = self.release_seat(&reservation.key()).await;

        metrics::counter!(observability::RESERVATIONS_CANCELLED_TOTAL).increment(1);
        info!(%id, key = %reservation.key(), "reservation cancelled");
        Ok(Cancelled {
            reservation,
            slot: slot.as_ref().map(Slot::view),
        })
    }

    /// Rename and/or move a reservation. Moving takes the new seat first and
    /// only then frees the old one, so a full target leaves everything as it was.
    pub async fn update_reservation(
        &self,
        id: Ulid,
        changes: ReservationChanges,
    ) -> Result<Booked, EngineError> {
        let current = self
            .reservations
            .get(&id)
            .await
            .ok_or(EngineError::NotFound(id))?;

        let name = match changes.name.as_deref() {
            Some(raw) => validate_name(raw)?,
            None => current.name.clone(),
        };
        let key = SlotKey::parse(
            changes.date.as_deref().unwrap_or(&current.date),
            changes.time.as_deref().unwrap_or(&current.time),
        )?;
        let old_key = current.key();

        if key == old_key {
            let reservation = self.reservations.update(id, &old_key, name, key.clone()).await?;
            let slot = self
                .slots
                .get(&key)
                .await
                .ok_or_else(|| EngineError::Storage(format!("no slot recorded at {key}")))?;
            return Ok(Booked {
                reservation,
                slot: slot.view(),
            });
        }

        self.slots.ensure_exists(&key, self.schedule.capacity).await?;
        let slot = self.take_seat(&key).await?;

        let reservation = match self.reservations.update(id, &old_key, name, key.clone()).await {
            Ok(r) => r,
            Err(e) => {
                self.give_back_seat(&key, &e).await;
                return Err(e);
            }
        };

        // The move is committed; a failed release must not turn it into an error.
        self.release_seat(&old_key).await;

        metrics::counter!(observability::RESERVATIONS_MOVED_TOTAL).increment(1);
        info!(%id, from = %old_key, to = %key, "reservation moved");
        Ok(Booked {
            reservation,
            slot: slot.view(),
        })
    }

    /// Pre-create slots for `date`. Existing slots keep their capacity.
    pub async fn seed_slots(
        &self,
        date: &str,
        times: &[String],
        capacity: u32,
    ) -> Result<SeedOutcome, EngineError> {
        let date = parse_date(date)?;
        if times.is_empty() {
            return Err(EngineError::Validation("times must not be empty".into()));
        }
        let times = normalise_times(times)?;
        let capacity = validate_capacity(capacity)?;

        let outcome = self.slots.bulk_ensure(&date, &times, capacity).await?;
        info!(
            %date,
            inserted = outcome.inserted,
            existing = outcome.existing,
            "slots seeded"
        );
        Ok(outcome)
    }

    async fn take_seat(&self, key: &SlotKey) -> Result<Slot, EngineError> {
        let result = self.slots.try_increment(key).await;
        if let Err(EngineError::CapacityExceeded { capacity, .. }) = &result {
            metrics::counter!(observability::CAPACITY_REJECTED_TOTAL).increment(1);
            info!(%key, capacity, "slot full, reservation rejected");
        }
        result
    }

    /// Undo a seat taken for a reservation that could not be written.
    async fn give_back_seat(&self, key: &SlotKey, cause: &EngineError) {
        metrics::counter!(observability::SEAT_ROLLBACKS_TOTAL).increment(1);
        warn!(%key, "reservation write failed, releasing seat: {cause}");
        self.release_seat(key).await;
    }

    /// Free one seat at `key` and return the slot as it now stands.
    ///
    /// Callers have already committed the record change, so a failure is
    /// logged and counted instead of returned. The seat stays taken until the
    /// next open reconciles counts against reservations.
    pub(super) async fn release_seat(&self, key: &SlotKey) -> Option<Slot> {
        match self.slots.decrement(key).await {
            Ok(slot) => slot,
            Err(e) => {
                metrics::counter!(observability::STRANDED_SEATS_TOTAL).increment(1);
                error!(%key, "seat not released, count stays high until restart: {e}");
                self.slots.get(key).await
            }
        }
    }
}
