//! Single-writer persistence worker and trip reconciliation
//!
//! All storage access runs on one dedicated thread that owns the SQLite
//! connection, fed by a bounded job queue. The decode loop hands completed
//! records over by move and never blocks on the database.

use crate::domain::epoch_ms;
use crate::domain::record::RecordRow;
use crate::domain::trip::Trip;
use crate::io::store::{self, Store};
use anyhow::{Context, Result};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Gap between records beyond which two trips are considered distinct.
pub const TRIP_GAP_MS: u64 = 5 * 60 * 1000;
/// Backoff before retrying a reconciliation pass that hit a busy database.
const BUSY_RETRY: Duration = Duration::from_secs(1);
/// Bounded depth of the persistence job queue.
const QUEUE_DEPTH: usize = 64;

pub enum Job {
    /// Insert a flushed record, then reconcile.
    SaveRecord(RecordRow),
    /// Reconcile only (startup recovery).
    Reconcile,
}

/// Cloneable entry point to the persistence worker.
#[derive(Clone)]
pub struct PersistHandle {
    tx: mpsc::Sender<Job>,
}

impl PersistHandle {
    /// Queue a completed record for persistence. Never blocks; a full
    /// queue drops the record with a warning.
    pub fn save_record(&self, row: RecordRow) {
        if self.tx.try_send(Job::SaveRecord(row)).is_err() {
            warn!("persist_queue_full_record_dropped");
        }
    }

    /// Queue a standalone reconciliation pass.
    pub fn reconcile(&self) {
        if self.tx.try_send(Job::Reconcile).is_err() {
            warn!("persist_queue_full_reconcile_dropped");
        }
    }
}

/// Build the job channel. Split out so tests can inspect queued jobs
/// without a live database.
pub fn channel() -> (PersistHandle, mpsc::Receiver<Job>) {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    (PersistHandle { tx }, rx)
}

/// Spawn the worker thread that owns the store.
///
/// The worker drains the queue until every handle is dropped, so joining
/// the returned handle waits for all queued writes to land.
pub fn spawn(store: Store) -> Result<(PersistHandle, JoinHandle<()>)> {
    let (handle, rx) = channel();
    let worker = thread::Builder::new()
        .name("triplog-db".into())
        .spawn(move || worker_loop(store, rx))
        .context("failed to spawn persistence worker")?;
    Ok((handle, worker))
}

fn worker_loop(mut store: Store, mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.blocking_recv() {
        match job {
            Job::SaveRecord(row) => {
                save_record(&store, &row);
                // reconcile only after the insert is visible
                reconcile_with_retry(&mut store);
            }
            Job::Reconcile => reconcile_with_retry(&mut store),
        }
    }
    debug!("persist_worker_exit");
}

fn save_record(store: &Store, row: &RecordRow) {
    if !row.worth_saving() {
        // nothing to insert, but grouping still has to run
        return;
    }
    match store.insert_record(row) {
        Ok(true) => info!(end_time = row.end_time, "record_saved"),
        Ok(false) => {
            warn!(start_time = row.start_time, end_time = row.end_time, "record_already_saved")
        }
        Err(e) => error!(error = %e, "record_save_failed"),
    }
}

fn reconcile_with_retry(store: &mut Store) {
    loop {
        match reconcile(store, epoch_ms()) {
            Ok(saved) => {
                if saved > 0 {
                    info!(trips = saved, "reconcile_complete");
                }
                return;
            }
            Err(e) if store::is_busy(&e) => {
                warn!("database_busy_retrying");
                thread::sleep(BUSY_RETRY);
            }
            Err(e) => {
                error!(error = %e, "reconcile_failed");
                return;
            }
        }
    }
}

/// Group all un-grouped records into trips and persist the complete ones.
///
/// Records are walked in `start_time` order; a gap of more than
/// [`TRIP_GAP_MS`] between the in-progress trip's end and a record's end
/// starts a new trip. The tail trip is held back unless `now` is already
/// past the gap, since the vehicle could still be mid-trip. Re-running over
/// the same rows is a no-op, which is what makes crash recovery safe.
///
/// Returns the number of trips persisted.
pub fn reconcile(store: &mut Store, now: u64) -> Result<usize> {
    let rows = store.ungrouped_records()?;

    let mut saved = 0;
    let mut trip = Trip::default();
    for row in &rows {
        if trip.end_time != 0 && row.end_time.saturating_sub(trip.end_time) > TRIP_GAP_MS {
            saved += finalize_trip(store, &trip)?;
            trip = Trip::default();
        }
        trip.append(row);
    }

    if trip.end_time != 0 && now.saturating_sub(trip.end_time) > TRIP_GAP_MS {
        saved += finalize_trip(store, &trip)?;
    }

    Ok(saved)
}

fn finalize_trip(store: &mut Store, trip: &Trip) -> Result<usize> {
    if !trip.worth_saving() {
        return Ok(0);
    }
    let trip_id = store.insert_trip(trip)?;
    info!(trip_id, "trip_saved");
    trip.log_summary(trip_id);
    Ok(1)
}
