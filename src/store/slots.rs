use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::engine::EngineError;
use crate::model::{Event, SeedOutcome, Slot, SlotKey};
use crate::observability;

use super::Committer;

pub type SharedSlot = Arc<RwLock<Slot>>;

/// Apply a seat event to a slot. No locking; the caller holds the write lock.
/// Counts stay within `0..=capacity` even if the log says otherwise.
pub(super) fn apply_to_slot(slot: &mut Slot, event: &Event) {
    match event {
        Event::SeatTaken { .. } => {
            slot.booked_count = slot.booked_count.saturating_add(1).min(slot.capacity);
        }
        Event::SeatReleased { .. } => {
            slot.booked_count = slot.booked_count.saturating_sub(1);
        }
        _ => {}
    }
}

/// Slot records keyed by `(date, time)`.
pub struct SlotStore {
    slots: DashMap<SlotKey, SharedSlot>,
    /// date → times, kept sorted for listing.
    by_date: DashMap<String, BTreeSet<String>>,
    /// Serialises creation so a key is only ever logged once.
    create_lock: Mutex<()>,
    committer: Committer,
}

impl SlotStore {
    pub(crate) fn from_replay(slots: HashMap<SlotKey, Slot>, committer: Committer) -> Self {
        let store = Self {
            slots: DashMap::new(),
            by_date: DashMap::new(),
            create_lock: Mutex::new(()),
            committer,
        };
        for (key, slot) in slots {
            store.index(&key);
            store.slots.insert(key, Arc::new(RwLock::new(slot)));
        }
        store
    }

    fn index(&self, key: &SlotKey) {
        self.by_date
            .entry(key.date.clone())
            .or_default()
            .insert(key.time.clone());
    }

    fn get_shared(&self, key: &SlotKey) -> Option<SharedSlot> {
        self.slots.get(key).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub async fn get(&self, key: &SlotKey) -> Option<Slot> {
        let slot = self.get_shared(key)?;
        let guard = slot.read().await;
        Some(guard.clone())
    }

    /// Create the slot if it does not exist. Returns whether it was created.
    pub async fn ensure_exists(&self, key: &SlotKey, capacity: u32) -> Result<bool, EngineError> {
        if self.slots.contains_key(key) {
            return Ok(false);
        }
        let _commit = self.committer.shared().await;
        let _create = self.create_lock.lock().await;
        self.insert_if_absent(key, capacity).await
    }

    /// `ensure_exists` for every time of `date`. Capacity only applies to new slots.
    /// Times must already be normalised.
    pub async fn bulk_ensure(
        &self,
        date: &str,
        times: &[String],
        capacity: u32,
    ) -> Result<SeedOutcome, EngineError> {
        let _commit = self.committer.shared().await;
        let _create = self.create_lock.lock().await;

        let mut outcome = SeedOutcome::default();
        for time in times {
            let key = SlotKey {
                date: date.to_string(),
                time: time.clone(),
            };
            if self.insert_if_absent(&key, capacity).await? {
                outcome.inserted += 1;
            } else {
                outcome.existing += 1;
            }
        }
        Ok(outcome)
    }

    /// Caller holds the commit gate and the create lock.
    async fn insert_if_absent(&self, key: &SlotKey, capacity: u32) -> Result<bool, EngineError> {
        if self.slots.contains_key(key) {
            return Ok(false);
        }
        let event = Event::SlotCreated {
            key: key.clone(),
            capacity,
            booked_count: 0,
        };
        self.committer.append(&event).await?;
        // Map before index: a listing that sees the time can always resolve it.
        self.slots
            .insert(key.clone(), Arc::new(RwLock::new(Slot::new(key.clone(), capacity))));
        self.index(key);
        metrics::counter!(observability::SLOTS_CREATED_TOTAL).increment(1);
        debug!(%key, capacity, "slot created");
        Ok(true)
    }

    /// Take one seat if any is left. Check and increment happen under the
    /// slot's write lock, so concurrent callers can never overshoot capacity.
    pub async fn try_increment(&self, key: &SlotKey) -> Result<Slot, EngineError> {
        let _commit = self.committer.shared().await;
        let Some(slot) = self.get_shared(key) else {
            return Err(EngineError::CapacityExceeded {
                key: key.clone(),
                capacity: 0,
            });
        };
        let mut guard = slot.write().await;
        if guard.is_full() {
            return Err(EngineError::CapacityExceeded {
                key: key.clone(),
                capacity: guard.capacity,
            });
        }
        let event = Event::SeatTaken { key: key.clone() };
        self.committer.append(&event).await?;
        apply_to_slot(&mut guard, &event);
        Ok(guard.clone())
    }

    /// Give one seat back, never going below zero. `None` if the slot is unknown.
    pub async fn decrement(&self, key: &SlotKey) -> Result<Option<Slot>, EngineError> {
        let _commit = self.committer.shared().await;
        let Some(slot) = self.get_shared(key) else {
            return Ok(None);
        };
        let mut guard = slot.write().await;
        if guard.booked_count == 0 {
            return Ok(Some(guard.clone()));
        }
        let event = Event::SeatReleased { key: key.clone() };
        self.committer.append(&event).await?;
        apply_to_slot(&mut guard, &event);
        Ok(Some(guard.clone()))
    }

    /// All slots of `date`, ordered by time.
    pub async fn list_by_date(&self, date: &str) -> Vec<Slot> {
        let times: Vec<String> = match self.by_date.get(date) {
            Some(entry) => entry.value().iter().cloned().collect(),
            None => return Vec::new(),
        };
        let mut slots = Vec::with_capacity(times.len());
        for time in times {
            let key = SlotKey {
                date: date.to_string(),
                time,
            };
            if let Some(slot) = self.get_shared(&key) {
                slots.push(slot.read().await.clone());
            }
        }
        slots
    }

    /// One `SlotCreated` per slot carrying its live count. Caller holds the gate exclusively.
    pub(super) async fn snapshot(&self) -> Vec<Event> {
        let shared: Vec<SharedSlot> = self.slots.iter().map(|e| e.value().clone()).collect();
        let mut slots = Vec::with_capacity(shared.len());
        for slot in shared {
            slots.push(slot.read().await.clone());
        }
        slots.sort_by(|a, b| a.key.cmp(&b.key));
        slots
            .into_iter()
            .map(|slot| Event::SlotCreated {
                key: slot.key,
                capacity: slot.capacity,
                booked_count: slot.booked_count,
            })
            .collect()
    }
}
