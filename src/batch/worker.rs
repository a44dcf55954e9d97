//! Periodic flush worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::collector::PriorityQueue;
use super::executor::{BatchExecutor, BatchReport, ItemHandler};
use crate::{Error, ErrorContext, Result};

/// Clears the processing flag however the batch ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drains one batch per tick and hands it to the executor.
pub struct FlushWorker<T, H> {
    queue: Arc<PriorityQueue<T>>,
    executor: BatchExecutor,
    handler: Arc<H>,
    processing: AtomicBool,
    flush_lock: tokio::sync::Mutex<()>,
    batches: AtomicU64,
    processed: AtomicU64,
}

impl<T, H> FlushWorker<T, H>
where
    T: Send + Sync + 'static,
    H: ItemHandler<T> + 'static,
{
    pub fn new(queue: Arc<PriorityQueue<T>>, executor: BatchExecutor, handler: Arc<H>) -> Self {
        Self {
            queue,
            executor,
            handler,
            processing: AtomicBool::new(false),
            flush_lock: tokio::sync::Mutex::new(()),
            batches: AtomicU64::new(0),
            processed: AtomicU64::new(0),
        }
    }

    pub fn queue(&self) -> &Arc<PriorityQueue<T>> {
        &self.queue
    }

    /// True while a drained batch is being processed.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub fn batches_processed(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn items_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Drain and process one batch. Returns `None` when the queue was empty.
    ///
    /// The batch runs on its own task: dropping the returned future does not
    /// abandon drained items, and the next flush waits for it.
    pub async fn flush_once(self: &Arc<Self>) -> Result<Option<BatchReport>> {
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.flush_batch().await })
            .await
            .map_err(|e| {
                Error::runtime_with_context(
                    format!("batch task failed: {e}"),
                    ErrorContext::new().with_source("flush_worker"),
                )
            })?
    }

    async fn flush_batch(&self) -> Result<Option<BatchReport>> {
        let _serialized = self.flush_lock.lock().await;
        let batch = self.queue.drain(self.queue.config().batch_size)?;
        if batch.is_empty() {
            return Ok(None);
        }

        let size = batch.len();
        let report = {
            let _processing = ProcessingGuard::raise(&self.processing);
            debug!(size, "flushing batch");
            self.executor.execute(batch, self.handler.as_ref()).await
        };

        self.batches.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(size as u64, Ordering::Relaxed);
        if !report.all_succeeded() {
            warn!(
                size,
                failed = report.failure_count(),
                "batch finished with failures"
            );
        }
        Ok(Some(report))
    }

    /// Tick until `stop` is cancelled. Items still queued at that point are
    /// left for [`drain_remaining`](Self::drain_remaining); a batch already
    /// in progress keeps running.
    pub async fn run(self: Arc<Self>, stop: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.queue.config().flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.queue.config().flush_interval.as_millis() as u64,
            batch_size = self.queue.config().batch_size,
            "flush worker started"
        );
        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!("flush worker stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            tokio::select! {
                res = self.flush_once() => {
                    res?;
                }
                _ = stop.cancelled() => {
                    debug!("flush worker stopping, in-progress batch left to finish");
                    return Ok(());
                }
            }
        }
    }

    /// Process batches until the queue is empty, after any batch still in
    /// progress.
    pub async fn drain_remaining(self: &Arc<Self>) -> Result<usize> {
        let mut total = 0;
        while let Some(report) = self.flush_once().await? {
            total += report.total_processed;
        }
        if total > 0 {
            info!(items = total, "drained remaining queued items");
        }
        Ok(total)
    }
}
