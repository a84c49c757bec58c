mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use conflict::now_ms;
pub use error::EngineError;
pub use queries::EngineStats;
pub use store::InMemoryStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::model::*;
use crate::wal::Wal;

pub type SharedCourtState = Arc<RwLock<CourtState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    /// Replace the log with a snapshot of the current state.
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
}

/// Commands the writer takes off the channel per wake-up.
const MAX_BATCH: usize = 1024;

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the log. Every append received in one wake-up is committed with a
/// single fsync; appends queued ahead of a compaction are committed first.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut inbox = Vec::with_capacity(MAX_BATCH);
    let mut pending: Vec<PendingAppend> = Vec::new();
    while rx.recv_many(&mut inbox, MAX_BATCH).await > 0 {
        for cmd in inbox.drain(..) {
            match cmd {
                WalCommand::Append { event, response } => pending.push((event, response)),
                WalCommand::Compact { events, response } => {
                    commit(&mut wal, &mut pending);
                    let _ = response.send(wal.rewrite(&events));
                }
            }
        }
        commit(&mut wal, &mut pending);
    }
}

fn commit(wal: &mut Wal, pending: &mut Vec<PendingAppend>) {
    if pending.is_empty() {
        return;
    }
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(pending.len() as f64);
    let started = std::time::Instant::now();
    let result = wal.write_batch(pending.iter().map(|(event, _)| event));
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(error = %e, batch = pending.len(), "WAL commit failed");
    }

    for (_, response) in pending.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = response.send(r);
    }
}

/// The booking core: storage plus the rules that keep it consistent.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Shared by booking creation, exclusive for user deletion, so a user
    /// cascade never races a new booking into existence.
    pub(super) owner_gate: RwLock<()>,
    /// Serializes reference-data writes (uniqueness checks + append).
    pub(super) catalog_lock: tokio::sync::Mutex<()>,
    wal_records: Arc<AtomicU64>,
    replayed_events: usize,
}

/// Apply a store-level event (everything that is not confined to one court).
fn apply_to_catalog(store: &InMemoryStore, event: &Event) {
    match event {
        Event::SurfaceCreated(surface) => store.insert_surface(surface.clone()),
        Event::CourtCreated(court) => store.insert_court(court.clone()),
        Event::UserCreated(user) => store.insert_user(user.clone()),
        Event::UserDeleted { id, at, .. } => store.mark_user_deleted(*id, *at),
        Event::BookingCreated(_)
        | Event::BookingUpdated { .. }
        | Event::BookingDeleted { .. }
        | Event::CourtDeleted { .. } => {}
    }
}

/// Apply an event directly to a CourtState (caller holds the lock).
fn apply_to_court(cs: &mut CourtState, event: &Event, store: &InMemoryStore) {
    match event {
        Event::BookingCreated(booking) => {
            store.index_booking(booking);
            cs.insert_booking(booking.clone());
        }
        Event::BookingUpdated { booking, .. } => {
            cs.replace_booking(booking.clone());
        }
        Event::BookingDeleted { id, at, .. } => {
            cs.mark_booking_deleted(*id, *at);
        }
        Event::CourtDeleted { at, bookings, .. } => {
            cs.court.deleted_at = Some(*at);
            for id in bookings {
                cs.mark_booking_deleted(*id, *at);
            }
        }
        Event::UserDeleted { at, bookings, .. } => {
            let court_id = cs.court.id;
            for (_, id) in bookings.iter().filter(|(c, _)| *c == court_id) {
                cs.mark_booking_deleted(*id, *at);
            }
        }
        // Catalog events are handled at the store level, not here
        Event::SurfaceCreated(_) | Event::CourtCreated(_) | Event::UserCreated(_) => {}
    }
}

/// Courts whose state an event touches, ascending.
fn event_court_ids(event: &Event) -> Vec<Id> {
    match event {
        Event::BookingCreated(b) | Event::BookingUpdated { booking: b, .. } => vec![b.court_id],
        Event::BookingDeleted { court_id, .. } => vec![*court_id],
        Event::CourtDeleted { id, .. } => vec![*id],
        Event::UserDeleted { bookings, .. } => {
            let mut ids: Vec<Id> = bookings.iter().map(|(c, _)| *c).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        }
        Event::SurfaceCreated(_) | Event::CourtCreated(_) | Event::UserCreated(_) => Vec::new(),
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let (wal, events) = Wal::open(&wal_path)?;
        let wal_records = wal.record_counter();
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            owner_gate: RwLock::new(()),
            catalog_lock: tokio::sync::Mutex::new(()),
            wal_records,
            replayed_events: events.len(),
        };

        // We're the sole owner of these Arcs, so try_write always succeeds
        // instantly. Never use blocking_write here: we may be inside a runtime.
        for event in &events {
            apply_to_catalog(&engine.store, event);
            for court_id in event_court_ids(event) {
                if let Some(shared) = engine.store.court(court_id)
                    && let Ok(mut guard) = shared.try_write()
                {
                    apply_to_court(&mut guard, event, &engine.store);
                }
            }
        }

        tracing::debug!(events = events.len(), path = %wal_path.display(), "replayed WAL");
        Ok(engine)
    }

    /// Number of WAL records replayed when this engine was opened.
    pub fn replayed_events(&self) -> usize {
        self.replayed_events
    }

    /// Records currently in the log: replayed, appended since, or written by
    /// the last compaction.
    pub fn wal_records(&self) -> u64 {
        self.wal_records.load(Ordering::Acquire)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply in one call. The caller holds the court's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        cs: &mut CourtState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_catalog(&self.store, event);
        apply_to_court(cs, event, &self.store);
        Ok(())
    }

    /// WAL-append + apply for events that touch no court state.
    pub(super) async fn persist_catalog(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_catalog(&self.store, event);
        Ok(())
    }

    pub(super) fn shared_court(&self, court_id: Id) -> Result<SharedCourtState, EngineError> {
        self.store
            .court(court_id)
            .ok_or_else(|| EngineError::not_found("court", court_id))
    }

    /// Lookup booking → court, acquire the court's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: Id,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<CourtState>, EngineError> {
        let court_id = self
            .store
            .court_for_booking(booking_id)
            .ok_or_else(|| EngineError::not_found("booking", booking_id))?;
        let shared = self.shared_court(court_id)?;
        Ok(shared.write_owned().await)
    }
}
