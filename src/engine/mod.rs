mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use error::{EngineError, Missing, ValidationError};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::catalog::{Catalog, Registry};
use crate::model::*;
use crate::wal::Wal;
use conflict::check_no_conflict;

pub type SharedUnitBookings = Arc<RwLock<UnitBookings>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Every append that is already queued when the writer wakes up
/// joins the same batch and shares a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    // Every caller of a failed batch gets an error, so none of its events may
    // survive in the log.
    if let Err(e) = &result {
        warn!("WAL batch of {} failed: {e}", batch.len());
        if let Err(rollback) = wal.discard_unsynced() {
            tracing::error!("WAL rollback failed: {rollback}");
        }
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The availability engine for one tenant.
///
/// Reservations live in per-unit `UnitBookings` behind a tokio `RwLock`.
/// Admission holds the unit's write lock from the conflict check until the
/// event is durable and applied, which serializes admissions per unit while
/// leaving different units fully parallel.
pub struct Engine {
    pub(super) units: DashMap<UnitId, SharedUnitBookings>,
    /// Reverse lookup: reservation id → unit id.
    pub(super) reservation_units: DashMap<Ulid, UnitId>,
    pub(super) registry: Arc<Registry>,
    pub(super) catalog: Arc<dyn Catalog>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared while they log and apply; compaction takes
    /// it exclusively so its snapshot and the log swap see the same state.
    pub(super) commit_gate: RwLock<()>,
    /// Serializes registry writes so duplicate ids are detected reliably.
    pub(super) catalog_writes: Mutex<()>,
}

/// Apply a reservation event to its unit. The caller holds the unit's write lock.
fn apply_to_unit(ub: &mut UnitBookings, event: &Event, index: &DashMap<Ulid, UnitId>) {
    match event {
        Event::ReservationCommitted { reservation } => {
            index.insert(reservation.id, reservation.unit_id.clone());
            ub.insert(reservation.clone());
        }
        Event::ReservationCancelled { id, .. } => {
            ub.remove(*id);
            index.remove(id);
        }
        // Catalog events never reach a unit's bookings.
        Event::UnitRegistered { .. } | Event::UnitRetired { .. } | Event::RequesterRegistered { .. } => {}
    }
}

fn apply_to_registry(registry: &Registry, event: &Event) {
    match event {
        Event::UnitRegistered { id, owner_id } => registry.add_unit(id.clone(), owner_id.clone()),
        Event::UnitRetired { id } => {
            registry.remove_unit(id);
        }
        Event::RequesterRegistered { id } => registry.add_requester(id.clone()),
        Event::ReservationCommitted { .. } | Event::ReservationCancelled { .. } => {}
    }
}

impl Engine {
    /// Open an engine whose catalog is the built-in registry.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::open(wal_path, registry.clone(), registry)
    }

    /// Open an engine that consults an external catalog for unit and
    /// requester existence. Registrations made through this engine still land
    /// in its own registry but are not consulted.
    pub fn with_catalog(wal_path: PathBuf, catalog: Arc<dyn Catalog>) -> io::Result<Self> {
        Self::open(wal_path, Arc::new(Registry::new()), catalog)
    }

    fn open(wal_path: PathBuf, registry: Arc<Registry>, catalog: Arc<dyn Catalog>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            units: DashMap::new(),
            reservation_units: DashMap::new(),
            registry,
            catalog,
            wal_tx,
            commit_gate: RwLock::new(()),
            catalog_writes: Mutex::new(()),
        };

        // Nobody else holds these locks yet, so try_write always succeeds.
        // blocking_write would panic here when opened from inside the runtime.
        for event in &events {
            match event {
                Event::ReservationCommitted { reservation } => {
                    let ub = engine.unit_bookings(&reservation.unit_id);
                    let mut guard = ub.try_write().expect("replay: uncontended write");
                    // Bookings never overlap, even when the log says otherwise.
                    if let Err(e) = check_no_conflict(&guard, &reservation.range) {
                        warn!("replay skipped reservation {}: {e}", reservation.id);
                        continue;
                    }
                    if engine.reservation_units.contains_key(&reservation.id) {
                        warn!("replay skipped duplicate reservation {}", reservation.id);
                        continue;
                    }
                    apply_to_unit(&mut guard, event, &engine.reservation_units);
                }
                Event::ReservationCancelled { unit_id, .. } => {
                    if let Some(ub) = engine.get_unit_bookings(unit_id) {
                        let mut guard = ub.try_write().expect("replay: uncontended write");
                        apply_to_unit(&mut guard, event, &engine.reservation_units);
                    }
                }
                catalog_event => apply_to_registry(&engine.registry, catalog_event),
            }
        }

        Ok(engine)
    }

    /// Hand an event to the group-commit writer and wait until it is durable.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    pub fn get_unit_bookings(&self, unit_id: &str) -> Option<SharedUnitBookings> {
        self.units.get(unit_id).map(|e| e.value().clone())
    }

    /// The unit's bookings, created empty on first use. Concurrent callers
    /// always receive the same lock.
    pub(super) fn unit_bookings(&self, unit_id: &str) -> SharedUnitBookings {
        if let Some(ub) = self.get_unit_bookings(unit_id) {
            return ub;
        }
        self.units
            .entry(unit_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(UnitBookings::new(unit_id.to_string()))))
            .value()
            .clone()
    }

    pub fn get_unit_for_reservation(&self, id: &Ulid) -> Option<UnitId> {
        self.reservation_units.get(id).map(|e| e.value().clone())
    }

    /// Log, then apply. Nothing is applied when the WAL append fails.
    pub(super) async fn persist_and_apply(
        &self,
        ub: &mut UnitBookings,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_unit(ub, event, &self.reservation_units);
        Ok(())
    }

    pub(super) async fn persist_catalog_event(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_registry(&self.registry, event);
        Ok(())
    }

    /// Snapshot of every unit's bookings lock, taken without holding map shards
    /// across an await.
    pub(super) fn all_unit_bookings(&self) -> Vec<SharedUnitBookings> {
        self.units.iter().map(|e| e.value().clone()).collect()
    }
}
