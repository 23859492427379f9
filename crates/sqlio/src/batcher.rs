//! Concurrent batcher
//!
//! Coalesces single-record submissions from many producers into size- and
//! age-bounded batches written through one [`Inserter`].
//!
//! Every [`Batcher::collect`] call joins the active batch or opens a new
//! one and returns the batch's [`State`]. A batch closes when a producer
//! finds it full or too old; it is then flushed on a background task. A
//! single expiry watcher flushes an active batch nobody else closes.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::insert::Inserter;
use crate::mapping::Entity;
use crate::options::Options;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Batcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Records per batch
    pub max_elements: usize,
    /// Batch age after which it no longer accepts records
    #[serde(with = "millis")]
    pub max_duration: Duration,
    /// Tuples per INSERT statement
    pub batch_size: usize,
    /// Insert options applied to every flush
    #[serde(skip)]
    pub options: Options,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_elements: 1000,
            max_duration: Duration::from_millis(100),
            batch_size: 1000,
            options: Options::default(),
        }
    }
}

impl BatcherConfig {
    /// Set records per batch
    pub fn with_max_elements(mut self, n: usize) -> Self {
        self.max_elements = n;
        self
    }

    /// Set the maximum batch age
    pub fn with_max_duration(mut self, d: Duration) -> Self {
        self.max_duration = d;
        self
    }

    /// Set tuples per INSERT statement
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Set insert options
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    fn insert_options(&self) -> Options {
        self.options.clone().with_batch_size(self.batch_size.max(1))
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

type Outcome = Option<std::result::Result<(), Arc<Error>>>;

/// Completion handle of one batch
///
/// All producers of a batch observe the same outcome.
#[derive(Debug, Clone)]
pub struct State {
    rx: watch::Receiver<Outcome>,
}

impl State {
    /// Wait until the batch holding the record has been written
    pub async fn wait(mut self) -> Result<()> {
        let done = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::internal("batch dropped before completion"))?;
        match &*done {
            Some(Err(e)) => Err(Error::Shared(e.clone())),
            _ => Ok(()),
        }
    }

    /// Whether the batch has completed
    pub fn is_done(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

/// Batcher statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatcherStats {
    /// Records accepted by `collect`
    pub records_collected: u64,
    /// Records written
    pub records_written: u64,
    /// Batches flushed successfully
    pub batches_flushed: u64,
    /// Batches whose flush failed
    pub batches_failed: u64,
    /// Total flush duration (milliseconds)
    pub total_flush_time_ms: u64,
}

/// Atomic batcher statistics
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct AtomicBatcherStats {
    pub records_collected: AtomicU64,
    pub records_written: AtomicU64,
    pub batches_flushed: AtomicU64,
    pub batches_failed: AtomicU64,
    pub total_flush_time_ms: AtomicU64,
}

impl AtomicBatcherStats {
    fn record_flush(&self, records: u64, elapsed: Duration) {
        self.records_written.fetch_add(records, Ordering::Relaxed);
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.total_flush_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot
    pub fn snapshot(&self) -> BatcherStats {
        BatcherStats {
            records_collected: self.records_collected.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            total_flush_time_ms: self.total_flush_time_ms.load(Ordering::Relaxed),
        }
    }
}

struct Batch<R> {
    id: u64,
    count: AtomicUsize,
    started: Mutex<Instant>,
    records: Mutex<Vec<R>>,
    flushed: AtomicBool,
    completion: Mutex<watch::Sender<Outcome>>,
}

impl<R> Batch<R> {
    fn new(id: u64, capacity: usize) -> Self {
        Self {
            id,
            count: AtomicUsize::new(0),
            started: Mutex::new(Instant::now()),
            records: Mutex::new(Vec::with_capacity(capacity)),
            flushed: AtomicBool::new(false),
            completion: Mutex::new(watch::channel(None).0),
        }
    }

    fn expired(&self, max_duration: Duration) -> bool {
        self.started.lock().elapsed() >= max_duration
    }

    /// Reserve a slot; fails once the batch is full or too old
    fn try_acquire(&self, max_elements: usize, max_duration: Duration) -> bool {
        let n = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        n <= max_elements && !self.expired(max_duration)
    }

    fn state(&self) -> State {
        State {
            rx: self.completion.lock().subscribe(),
        }
    }

    fn complete(&self, outcome: std::result::Result<(), Arc<Error>>) {
        self.completion.lock().send_replace(Some(outcome));
    }
}

/// Free list of batches
struct Pool<R> {
    free: Mutex<Vec<Arc<Batch<R>>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<R> Pool<R> {
    fn get(&self) -> Arc<Batch<R>> {
        let batch = self.free.lock().pop().unwrap_or_else(|| {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            Arc::new(Batch::new(id, self.capacity))
        });
        batch.count.store(0, Ordering::Release);
        batch.flushed.store(false, Ordering::Release);
        *batch.started.lock() = Instant::now();
        *batch.completion.lock() = watch::channel(None).0;
        batch
    }

    fn put(&self, batch: Arc<Batch<R>>) {
        batch.records.lock().clear();
        self.free.lock().push(batch);
    }
}

struct Shared<R> {
    ctx: Context,
    inserter: Arc<Inserter>,
    config: BatcherConfig,
    active: Mutex<Option<Arc<Batch<R>>>>,
    pool: Pool<R>,
    is_watching: AtomicBool,
    stats: AtomicBatcherStats,
}

impl<R: Entity> Shared<R> {
    /// Write the batch once; later calls are no-ops
    async fn try_flush(&self, batch: Arc<Batch<R>>) {
        if batch
            .flushed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let mut records = std::mem::take(&mut *batch.records.lock());
        let start = Instant::now();
        let outcome = if records.is_empty() {
            Ok(())
        } else {
            self.inserter
                .exec(&self.ctx, &mut records, Some(self.config.insert_options()))
                .await
                .map(|r| r.rows_affected)
                .map(|rows| self.stats.record_flush(rows, start.elapsed()))
        };
        match &outcome {
            Ok(()) => debug!(batch = batch.id, records = records.len(), "batch flushed"),
            Err(e) => {
                self.stats.record_failure();
                warn!(batch = batch.id, records = records.len(), error = %e, "batch flush failed");
            }
        }
        batch.complete(outcome.map_err(Arc::new));
        self.pool.put(batch);
    }
}

/// Coalesces concurrent single-record inserts
pub struct Batcher<R: Entity> {
    shared: Arc<Shared<R>>,
}

impl<R: Entity> Clone for Batcher<R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<R: Entity> std::fmt::Debug for Batcher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("table", &self.shared.inserter.table())
            .field("max_elements", &self.shared.config.max_elements)
            .field("max_duration", &self.shared.config.max_duration)
            .field("batch_size", &self.shared.config.batch_size)
            .finish()
    }
}

impl<R: Entity> Batcher<R> {
    /// Batcher writing through `inserter`; `ctx` bounds every flush
    pub fn new(ctx: Context, inserter: Arc<Inserter>, config: BatcherConfig) -> Self {
        let capacity = config.max_elements.max(1);
        Self {
            shared: Arc::new(Shared {
                ctx,
                inserter,
                pool: Pool {
                    free: Mutex::new(Vec::new()),
                    next_id: AtomicU64::new(1),
                    capacity,
                },
                config,
                active: Mutex::new(None),
                is_watching: AtomicBool::new(false),
                stats: AtomicBatcherStats::default(),
            }),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &BatcherConfig {
        &self.shared.config
    }

    /// Add `record` to the active batch
    ///
    /// Await [`State::wait`] on the returned handle to learn whether the
    /// batch holding the record was written.
    pub fn collect(&self, record: R) -> Result<State> {
        if self.shared.ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let max_elements = self.shared.config.max_elements.max(1);
        let max_duration = self.shared.config.max_duration;
        self.shared.stats.records_collected.fetch_add(1, Ordering::Relaxed);

        let mut active = self.shared.active.lock();
        if let Some(batch) = active.as_ref() {
            if batch.try_acquire(max_elements, max_duration) {
                batch.records.lock().push(record);
                return Ok(batch.state());
            }
        }
        if let Some(closed) = active.take() {
            trace!(batch = closed.id, "batch closed");
            self.spawn_flush(closed);
        }

        let batch = self.shared.pool.get();
        batch.count.fetch_add(1, Ordering::AcqRel);
        batch.records.lock().push(record);
        let state = batch.state();
        *active = Some(batch);
        self.ensure_watcher();
        Ok(state)
    }

    /// Flush the active batch now and wait for it
    pub async fn flush(&self) -> Result<()> {
        let Some(batch) = self.shared.active.lock().take() else {
            return Ok(());
        };
        let state = batch.state();
        self.shared.try_flush(batch).await;
        state.wait().await
    }

    /// Snapshot of the statistics
    pub fn stats(&self) -> BatcherStats {
        self.shared.stats.snapshot()
    }

    fn spawn_flush(&self, batch: Arc<Batch<R>>) {
        let shared = self.shared.clone();
        tokio::spawn(async move { shared.try_flush(batch).await });
    }

    /// Start the expiry watcher unless one is running
    ///
    /// Called with the active-batch lock held.
    fn ensure_watcher(&self) {
        if self
            .shared
            .is_watching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let shared = self.shared.clone();
        let tick = (shared.config.max_duration / 2).max(Duration::from_millis(1));
        tokio::spawn(async move {
            trace!("expiry watcher started");
            loop {
                tokio::select! {
                    _ = shared.ctx.cancelled() => {}
                    _ = tokio::time::sleep(tick) => {}
                }
                let expired = {
                    let mut active = shared.active.lock();
                    let cancelled = shared.ctx.is_cancelled();
                    match active.as_ref() {
                        Some(b) if cancelled || b.expired(shared.config.max_duration) => {
                            let batch = active.take();
                            shared.is_watching.store(false, Ordering::Release);
                            batch
                        }
                        Some(_) => continue,
                        None => {
                            shared.is_watching.store(false, Ordering::Release);
                            None
                        }
                    }
                };
                if let Some(batch) = expired {
                    debug!(batch = batch.id, "expired batch flushed by watcher");
                    shared.try_flush(batch).await;
                }
                trace!("expiry watcher stopped");
                return;
            }
        });
    }
}
