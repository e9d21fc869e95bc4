//! Durable storage client: one WAL, one group-commit writer, two stores.
//!
//! Every store mutation takes the commit gate in shared mode, then the record
//! lock, appends its event through the writer task and only then applies it in
//! memory. Compaction takes the gate exclusively, so a snapshot always reflects
//! exactly what has been committed.

mod reservations;
mod slots;

pub use reservations::ReservationStore;
pub use slots::SlotStore;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock, RwLockReadGuard};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::limits::MAX_RESERVATIONS;
use crate::model::{Event, Reservation, Slot, SlotKey};
use crate::observability;
use crate::wal::Wal;

const WAL_CHANNEL_DEPTH: usize = 4096;

// ── Group-commit writer ─────────────────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        snapshot: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
    Shutdown {
        response: oneshot::Sender<io::Result<()>>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is in progress are
/// written and fsynced together, then every waiter gets the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch: Vec<PendingAppend> = Vec::new();
        let mut next = Some(cmd);

        while let Some(cmd) = next.take() {
            match cmd {
                WalCommand::Append { event, response } => {
                    batch.push((event, response));
                    next = rx.try_recv().ok();
                }
                other => {
                    commit_batch(&mut wal, &mut batch);
                    if !handle_control(&mut wal, other) {
                        return;
                    }
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    if batch.is_empty() {
        return;
    }
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so a half-written batch does not leak
    // into the next one.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

/// Returns `false` once the writer should stop.
fn handle_control(wal: &mut Wal, cmd: WalCommand) -> bool {
    match cmd {
        WalCommand::Compact { snapshot, response } => {
            let _ = response.send(wal.compact(&snapshot));
            true
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
            true
        }
        WalCommand::Shutdown { response } => {
            let _ = response.send(wal.flush_sync());
            false
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

fn writer_gone() -> EngineError {
    EngineError::Storage("WAL writer shut down".into())
}

/// Handle the stores use to commit events.
#[derive(Clone)]
pub(crate) struct Committer {
    tx: mpsc::Sender<WalCommand>,
    gate: Arc<RwLock<()>>,
}

impl Committer {
    /// Shared side of the commit gate. Take it before any record lock.
    pub(crate) async fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    /// Durably append one event; resolves after the batch holding it is fsynced.
    pub(crate) async fn append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| writer_gone())?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    async fn request<T>(
        &self,
        cmd: impl FnOnce(oneshot::Sender<T>) -> WalCommand,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(cmd(tx)).await.map_err(|_| writer_gone())?;
        rx.await.map_err(|_| writer_gone())
    }
}

// ── Replay ──────────────────────────────────────────────────────

#[derive(Default)]
struct Replayed {
    slots: HashMap<SlotKey, Slot>,
    reservations: HashMap<Ulid, Reservation>,
}

impl Replayed {
    fn apply(&mut self, event: Event) {
        match event {
            Event::SlotCreated {
                key,
                capacity,
                booked_count,
            } => {
                let mut slot = Slot::new(key.clone(), capacity);
                slot.booked_count = booked_count.min(capacity);
                self.slots.insert(key, slot);
            }
            Event::SeatTaken { ref key } | Event::SeatReleased { ref key } => {
                if let Some(slot) = self.slots.get_mut(key) {
                    slots::apply_to_slot(slot, &event);
                }
            }
            Event::ReservationCreated { reservation } | Event::ReservationUpdated { reservation } => {
                self.reservations.insert(reservation.id, reservation);
            }
            Event::ReservationDeleted { id } => {
                self.reservations.remove(&id);
            }
        }
    }

    /// Reset every slot's count to the reservations that hold it.
    ///
    /// A seat event and its reservation event are separate log entries, so a
    /// crash between them (or a failed batch whose earlier frames still hit
    /// disk) leaves the seat events off by one. Reservations are the source of
    /// truth. Returns how many slots were corrected.
    fn reconcile(&mut self) -> usize {
        let mut held: HashMap<SlotKey, u32> = HashMap::new();
        for reservation in self.reservations.values() {
            *held.entry(reservation.key()).or_default() += 1;
        }
        for (key, count) in &held {
            if !self.slots.contains_key(key) {
                warn!(%key, reservations = count, "reservations reference a slot that was never created");
            }
        }

        let mut corrected = 0;
        for (key, slot) in &mut self.slots {
            let count = held.get(key).copied().unwrap_or(0).min(slot.capacity);
            if slot.booked_count != count {
                warn!(
                    %key,
                    replayed = slot.booked_count,
                    reservations = count,
                    "seat count out of step with reservations, corrected"
                );
                slot.booked_count = count;
                corrected += 1;
            }
        }
        corrected
    }
}

// ── Storage client ──────────────────────────────────────────────

/// The explicitly opened storage backing a [`crate::engine::BookingEngine`].
pub struct Storage {
    slots: Arc<SlotStore>,
    reservations: Arc<ReservationStore>,
    committer: Committer,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Storage {
    /// Replay the WAL at `path` and start the writer. Must run inside a Tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::open_with_limit(path, MAX_RESERVATIONS)
    }

    pub fn open_with_limit(path: &Path, max_reservations: usize) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let replayed_events = events.len();
        let mut replayed = Replayed::default();
        for event in events {
            replayed.apply(event);
        }
        let corrected = replayed.reconcile();

        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(WAL_CHANNEL_DEPTH);
        let writer = tokio::spawn(wal_writer_loop(wal, rx));
        let committer = Committer {
            tx,
            gate: Arc::new(RwLock::new(())),
        };

        info!(
            path = %path.display(),
            events = replayed_events,
            slots = replayed.slots.len(),
            reservations = replayed.reservations.len(),
            corrected,
            "storage opened"
        );

        Ok(Self {
            slots: Arc::new(SlotStore::from_replay(replayed.slots, committer.clone())),
            reservations: Arc::new(ReservationStore::from_replay(
                replayed.reservations,
                max_reservations,
                committer.clone(),
            )),
            committer,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn slots(&self) -> Arc<SlotStore> {
        self.slots.clone()
    }

    pub fn reservations(&self) -> Arc<ReservationStore> {
        self.reservations.clone()
    }

    pub async fn appends_since_compact(&self) -> Result<u64, EngineError> {
        self.committer
            .request(|response| WalCommand::AppendsSinceCompact { response })
            .await
    }

    /// Rewrite the WAL as the minimal set of events recreating current state.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let _exclusive = self.committer.gate.write().await;
        let mut snapshot = self.slots.snapshot().await;
        snapshot.extend(self.reservations.snapshot().await);
        let events = snapshot.len();

        self.committer
            .request(|response| WalCommand::Compact { snapshot, response })
            .await?
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        info!(events, "WAL compacted");
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }

    /// Flush and stop the writer. Later mutations fail with a storage error.
    pub async fn close(&self) -> Result<(), EngineError> {
        let Some(writer) = self.writer.lock().await.take() else {
            return Ok(());
        };
        let flushed = self
            .committer
            .request(|response| WalCommand::Shutdown { response })
            .await;
        if let Err(e) = writer.await {
            warn!("WAL writer task ended abnormally: {e}");
        }
        flushed?.map_err(|e| EngineError::Storage(e.to_string()))?;
        info!("storage closed");
        Ok(())
    }
}
