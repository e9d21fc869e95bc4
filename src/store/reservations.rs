use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{Event, Reservation, SlotKey};

use super::Committer;

pub type SharedReservation = Arc<RwLock<Reservation>>;

/// Reservation records keyed by id. Knows nothing about seats.
pub struct ReservationStore {
    records: DashMap<Ulid, SharedReservation>,
    /// Live records plus creates in flight. Claimed before the WAL append so
    /// concurrent creates cannot overshoot `max_reservations`.
    claimed: AtomicUsize,
    max_reservations: usize,
    committer: Committer,
}

impl ReservationStore {
    pub(crate) fn from_replay(
        records: HashMap<Ulid, Reservation>,
        max_reservations: usize,
        committer: Committer,
    ) -> Self {
        Self {
            claimed: AtomicUsize::new(records.len()),
            records: records
                .into_iter()
                .map(|(id, r)| (id, Arc::new(RwLock::new(r))))
                .collect(),
            max_reservations,
            committer,
        }
    }

    fn get_shared(&self, id: &Ulid) -> Option<SharedReservation> {
        self.records.get(id).map(|e| e.value().clone())
    }

    /// A record is live while the map still points at the same allocation.
    /// Writers re-check this after acquiring the record lock.
    fn is_live(&self, id: &Ulid, record: &SharedReservation) -> bool {
        self.records
            .get(id)
            .is_some_and(|e| Arc::ptr_eq(e.value(), record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub async fn create(&self, name: String, key: SlotKey) -> Result<Reservation, EngineError> {
        let _commit = self.committer.shared().await;
        if self.claimed.fetch_add(1, Ordering::AcqRel) >= self.max_reservations {
            self.claimed.fetch_sub(1, Ordering::AcqRel);
            return Err(EngineError::LimitExceeded("too many reservations"));
        }
        let reservation = Reservation {
            id: Ulid::new(),
            name,
            date: key.date,
            time: key.time,
        };
        let appended = self
            .committer
            .append(&Event::ReservationCreated {
                reservation: reservation.clone(),
            })
            .await;
        if let Err(e) = appended {
            self.claimed.fetch_sub(1, Ordering::AcqRel);
            return Err(e);
        }
        self.records
            .insert(reservation.id, Arc::new(RwLock::new(reservation.clone())));
        Ok(reservation)
    }

    pub async fn get(&self, id: &Ulid) -> Option<Reservation> {
        let record = self.get_shared(id)?;
        let guard = record.read().await;
        Some(guard.clone())
    }

    /// Every reservation, ordered by id (ULIDs sort by creation time).
    pub async fn list_all(&self) -> Vec<Reservation> {
        let mut shared: Vec<(Ulid, SharedReservation)> = self
            .records
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        shared.sort_by_key(|(id, _)| *id);

        let mut out = Vec::with_capacity(shared.len());
        for (_, record) in shared {
            out.push(record.read().await.clone());
        }
        out
    }

    /// Overwrite name and slot key, but only if the record still sits at
    /// `expected`. A mismatch means someone else moved it first.
    pub async fn update(
        &self,
        id: Ulid,
        expected: &SlotKey,
        name: String,
        key: SlotKey,
    ) -> Result<Reservation, EngineError> {
        let _commit = self.committer.shared().await;
        let record = self.get_shared(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = record.write().await;
        if !self.is_live(&id, &record) {
            return Err(EngineError::NotFound(id));
        }
        if guard.key() != *expected {
            return Err(EngineError::Conflict(id));
        }

        let updated = Reservation {
            id,
            name,
            date: key.date,
            time: key.time,
        };
        self.committer
            .append(&Event::ReservationUpdated {
                reservation: updated.clone(),
            })
            .await?;
        *guard = updated.clone();
        Ok(updated)
    }

    /// Remove and return the record. Of two concurrent deletes only one succeeds.
    pub async fn delete(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let _commit = self.committer.shared().await;
        let record = self.get_shared(&id).ok_or(EngineError::NotFound(id))?;
        let guard = record.write().await;
        if !self.is_live(&id, &record) {
            return Err(EngineError::NotFound(id));
        }
        self.committer
            .append(&Event::ReservationDeleted { id })
            .await?;
        self.records.remove(&id);
        self.claimed.fetch_sub(1, Ordering::AcqRel);
        Ok(guard.clone())
    }

    /// Caller holds the commit gate exclusively.
    pub(super) async fn snapshot(&self) -> Vec<Event> {
        self.list_all()
            .await
            .into_iter()
            .map(|reservation| Event::ReservationCreated { reservation })
            .collect()
    }
}
