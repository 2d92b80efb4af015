use super::error::ResumeError;
use super::worker::{WorkerEvent, WorkerHandle};
use crate::dispatcher::{Outcome, Request, Response};
use crate::ids::ContinuationId;
use crate::runtime_config::EngineConfig;
use http::StatusCode;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle state of a continuation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContinuationStatus {
    /// Paused and waiting for a resume
    Active,
    /// Already resumed; the id is spent
    Answered,
    /// Evicted or cancelled before it was resumed
    Expired,
}

/// Snapshot of the continuation table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContinuationStats {
    pub active: usize,
    pub answered: usize,
    pub expired: usize,
    pub paused_total: u64,
    pub resumed_total: u64,
    pub evicted_total: u64,
}

struct Entry {
    status: ContinuationStatus,
    owner: Option<String>,
    route_id: usize,
    /// When the entry last changed status (park, answer or eviction)
    changed_at: Instant,
    worker: Option<WorkerHandle>,
}

impl Entry {
    fn idle_past(&self, budget: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.changed_at) > budget
    }

    /// Mark expired and release the blocked worker.
    fn evict(&mut self, now: Instant) {
        if let Some(worker) = self.worker.take() {
            worker.cancel();
        }
        self.status = ContinuationStatus::Expired;
        self.changed_at = now;
    }
}

struct Reaper {
    stop: std_mpsc::Sender<()>,
}

/// Table of paused handler executions keyed by continuation id.
///
/// Insert, lookup-and-wake and eviction each happen under one lock, so a
/// given continuation receives at most one resume and is never resumed after
/// it has been evicted. Resolved ids stay in the table as tombstones for one
/// idle budget so that replays report `Answered`/`Expired` instead of `Unknown`.
pub struct ContinuationManager {
    table: Mutex<HashMap<ContinuationId, Entry>>,
    duration: Duration,
    purge_frequency: u32,
    purge_scale: u32,
    closed: AtomicBool,
    reaper: Mutex<Option<Reaper>>,
    paused_total: AtomicU64,
    resumed_total: AtomicU64,
    evicted_total: AtomicU64,
}

impl ContinuationManager {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            duration: Duration::from_millis(config.continuation_duration_ms),
            purge_frequency: config.purge_frequency,
            purge_scale: config.purge_scale,
            closed: AtomicBool::new(false),
            reaper: Mutex::new(None),
            paused_total: AtomicU64::new(0),
            resumed_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
        }
    }

    /// Idle budget of a paused continuation
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Wait for a worker to pause or finish, parking it if it paused.
    pub(crate) fn await_worker(
        &self,
        worker: WorkerHandle,
        owner: Option<String>,
        route_id: usize,
    ) -> Outcome {
        match worker.next_event() {
            Some(WorkerEvent::Paused { id, response }) => {
                self.park(id, worker, owner, route_id);
                self.maybe_purge();
                Outcome::Paused { id, response }
            }
            Some(WorkerEvent::Finished(outcome)) => outcome,
            None => {
                // C1: Worker vanished without pausing or finishing
                error!(route_id = route_id, "Continuation worker exited without a reply");
                Outcome::Fault {
                    response: Response::with_status(StatusCode::SERVICE_UNAVAILABLE),
                    error: anyhow::anyhow!("continuation worker exited without a reply"),
                }
            }
        }
    }

    fn park(&self, id: ContinuationId, worker: WorkerHandle, owner: Option<String>, route_id: usize) {
        let now = Instant::now();
        let mut entry = Entry {
            status: ContinuationStatus::Active,
            owner,
            route_id,
            changed_at: now,
            worker: Some(worker),
        };
        // `closed` only flips under the table lock, so shutdown sees every parked entry
        let mut table = self.table.lock();
        if self.closed.load(Ordering::Acquire) {
            warn!(continuation_id = %id, "Continuation parked after shutdown; cancelling");
            entry.evict(now);
        } else {
            self.paused_total.fetch_add(1, Ordering::Relaxed);
        }
        table.insert(id, entry);
        drop(table);
        debug!(continuation_id = %id, route_id = route_id, "Continuation parked");
    }

    /// Deliver `request` to a paused continuation and wait for its next output.
    pub fn resume(
        &self,
        id: ContinuationId,
        request: Request,
        session: Option<&str>,
    ) -> Result<Outcome, ResumeError> {
        let (worker, owner, route_id) = {
            let mut table = self.table.lock();
            let entry = table.get_mut(&id).ok_or(ResumeError::Unknown)?;
            match entry.status {
                ContinuationStatus::Answered => return Err(ResumeError::Answered),
                ContinuationStatus::Expired => return Err(ResumeError::Expired),
                ContinuationStatus::Active => {}
            }
            let now = Instant::now();
            if entry.idle_past(self.duration, now) {
                entry.evict(now);
                self.evicted_total.fetch_add(1, Ordering::Relaxed);
                return Err(ResumeError::Expired);
            }
            if let Some(owner) = &entry.owner {
                if session != Some(owner.as_str()) {
                    return Err(ResumeError::NotOwner);
                }
            }
            entry.status = ContinuationStatus::Answered;
            entry.changed_at = now;
            let worker = entry.worker.take().ok_or(ResumeError::WorkerLost)?;
            (worker, entry.owner.clone(), entry.route_id)
        };

        self.resumed_total.fetch_add(1, Ordering::Relaxed);
        info!(
            continuation_id = %id,
            request_id = %request.request_id,
            route_id = route_id,
            "Continuation resume delivered"
        );
        if !worker.resume(request) {
            error!(continuation_id = %id, "Continuation worker gone at resume");
            return Err(ResumeError::WorkerLost);
        }
        let outcome = self.await_worker(worker, owner, route_id);
        Ok(outcome)
    }

    /// Whether `id` is a live continuation created on route `route_id`.
    #[must_use]
    pub fn is_resumable(&self, id: ContinuationId, route_id: usize) -> bool {
        let now = Instant::now();
        self.table.lock().get(&id).is_some_and(|e| {
            e.status == ContinuationStatus::Active
                && e.route_id == route_id
                && !e.idle_past(self.duration, now)
        })
    }

    #[must_use]
    pub fn status(&self, id: ContinuationId) -> Option<ContinuationStatus> {
        self.table.lock().get(&id).map(|e| e.status)
    }

    /// Evict idle continuations and prune old tombstones.
    ///
    /// Returns the number of continuations evicted.
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        let mut table = self.table.lock();
        table.retain(|id, entry| match entry.status {
            ContinuationStatus::Active => {
                if entry.idle_past(self.duration, now) {
                    debug!(continuation_id = %id, "Continuation evicted");
                    entry.evict(now);
                    evicted += 1;
                }
                true
            }
            ContinuationStatus::Answered | ContinuationStatus::Expired => {
                !entry.idle_past(self.duration, now)
            }
        });
        let remaining = table.len();
        drop(table);

        if evicted > 0 {
            self.evicted_total.fetch_add(evicted as u64, Ordering::Relaxed);
            info!(evicted = evicted, remaining = remaining, "Continuations purged");
        }
        evicted
    }

    /// Purge with probability `purge_frequency / purge_scale`.
    fn maybe_purge(&self) {
        if self.purge_scale == 0 || self.purge_frequency == 0 {
            return;
        }
        if fastrand::u32(0..self.purge_scale) < self.purge_frequency {
            self.purge();
        }
    }

    /// Purge on a fixed period from a background thread until shutdown.
    pub fn start_reaper(self: &Arc<Self>, interval: Duration) -> std::io::Result<()> {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let manager: Weak<Self> = Arc::downgrade(self);
        std::thread::Builder::new()
            .name("continuation-reaper".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(std_mpsc::RecvTimeoutError::Timeout) => match manager.upgrade() {
                        Some(m) => {
                            m.purge();
                        }
                        None => break,
                    },
                    Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
                }
            })?;
        if let Some(old) = self.reaper.lock().replace(Reaper { stop: stop_tx }) {
            let _ = old.stop.send(());
        }
        info!(interval_ms = interval.as_millis() as u64, "Continuation reaper started");
        Ok(())
    }

    /// Cancel every paused worker and stop the reaper. Later pauses are
    /// cancelled as soon as they park.
    pub fn shutdown(&self) {
        let now = Instant::now();
        let mut cancelled = 0usize;
        {
            let mut table = self.table.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            for entry in table.values_mut() {
                if entry.status == ContinuationStatus::Active {
                    entry.evict(now);
                    cancelled += 1;
                }
            }
        }
        if let Some(reaper) = self.reaper.lock().take() {
            let _ = reaper.stop.send(());
        }
        info!(cancelled = cancelled, "Continuation manager shut down");
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> ContinuationStats {
        let mut stats = ContinuationStats {
            paused_total: self.paused_total.load(Ordering::Relaxed),
            resumed_total: self.resumed_total.load(Ordering::Relaxed),
            evicted_total: self.evicted_total.load(Ordering::Relaxed),
            ..ContinuationStats::default()
        };
        for entry in self.table.lock().values() {
            match entry.status {
                ContinuationStatus::Active => stats.active += 1,
                ContinuationStatus::Answered => stats.answered += 1,
                ContinuationStatus::Expired => stats.expired += 1,
            }
        }
        stats
    }
}

impl Drop for ContinuationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
