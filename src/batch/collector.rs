//! Priority queue collector.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use crate::types::{CompletionResponse, Priority};
use crate::{Error, ErrorContext, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            high: 100,
            normal: 500,
            low: 1000,
        }
    }
}

impl QueueLimits {
    pub fn for_priority(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
            Priority::Critical => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Items drained per flush tick.
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub limits: QueueLimits,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            flush_interval: Duration::from_millis(1000),
            limits: QueueLimits::default(),
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_batch_size(mut self, s: usize) -> Self {
        self.batch_size = s;
        self
    }
    pub fn with_flush_interval(mut self, d: Duration) -> Self {
        self.flush_interval = d;
        self
    }
    pub fn with_limits(mut self, limits: QueueLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Shared cancellation marker between a queued item and its caller's handle.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct BatchItem<T> {
    pub id: String,
    pub priority: Priority,
    pub data: T,
    pub added_at: Instant,
    cancel: CancelFlag,
}

impl<T> BatchItem<T> {
    pub fn new(priority: Priority, data: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            priority,
            data,
            added_at: Instant::now(),
            cancel: CancelFlag::new(),
        }
    }
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
    /// Handle the caller keeps to cancel this item while it waits.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
    pub fn waited(&self) -> Duration {
        self.added_at.elapsed()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Queued {
        position: usize,
        estimated_wait_seconds: f64,
    },
    /// Critical items bypass the queue.
    NotQueued,
}

impl EnqueueOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, EnqueueOutcome::Queued { .. })
    }
    pub fn position(&self) -> Option<usize> {
        match self {
            EnqueueOutcome::Queued { position, .. } => Some(*position),
            EnqueueOutcome::NotQueued => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueSizes {
    pub critical: usize,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

impl QueueSizes {
    pub fn total(&self) -> usize {
        self.high + self.normal + self.low
    }
}

struct Tiers<T> {
    high: VecDeque<BatchItem<T>>,
    normal: VecDeque<BatchItem<T>>,
    low: VecDeque<BatchItem<T>>,
}

impl<T> Tiers<T> {
    fn tier(&self, p: Priority) -> Option<&VecDeque<BatchItem<T>>> {
        match p {
            Priority::High => Some(&self.high),
            Priority::Normal => Some(&self.normal),
            Priority::Low => Some(&self.low),
            Priority::Critical => None,
        }
    }
    fn tier_mut(&mut self, p: Priority) -> Option<&mut VecDeque<BatchItem<T>>> {
        match p {
            Priority::High => Some(&mut self.high),
            Priority::Normal => Some(&mut self.normal),
            Priority::Low => Some(&mut self.low),
            Priority::Critical => None,
        }
    }
    fn live(&self, p: Priority) -> usize {
        self.tier(p)
            .map(|q| q.iter().filter(|i| !i.is_cancelled()).count())
            .unwrap_or(0)
    }
}

/// Per-tier FIFO queues drained strictly `high > normal > low`.
pub struct PriorityQueue<T> {
    config: BatchConfig,
    tiers: Mutex<Tiers<T>>,
    enqueued: AtomicU64,
    skipped_cancelled: AtomicU64,
}

impl<T> PriorityQueue<T> {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            tiers: Mutex::new(Tiers {
                high: VecDeque::new(),
                normal: VecDeque::new(),
                low: VecDeque::new(),
            }),
            enqueued: AtomicU64::new(0),
            skipped_cancelled: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tiers<T>>> {
        self.tiers.lock().map_err(|_| {
            Error::runtime_with_context(
                "priority queue poisoned",
                ErrorContext::new().with_source("priority_queue"),
            )
        })
    }

    /// Place an item at the tail of its tier.
    pub fn enqueue(&self, item: BatchItem<T>) -> Result<EnqueueOutcome> {
        let priority = item.priority;
        if !priority.is_queued() {
            return Ok(EnqueueOutcome::NotQueued);
        }
        let limit = self.config.limits.for_priority(priority);
        let mut tiers = self.lock()?;

        let same_tier = tiers.live(priority);
        if same_tier >= limit {
            return Err(Error::QueueFull {
                tier: priority.as_str().to_string(),
                limit,
            });
        }
        let ahead: usize = Priority::QUEUED
            .iter()
            .filter(|p| **p > priority)
            .map(|p| tiers.live(*p))
            .sum();

        if let Some(q) = tiers.tier_mut(priority) {
            q.push_back(item);
        }
        self.enqueued.fetch_add(1, Ordering::Relaxed);

        let position = ahead + same_tier + 1;
        Ok(EnqueueOutcome::Queued {
            position,
            estimated_wait_seconds: self.estimate_wait(position).as_secs_f64(),
        })
    }

    /// `ceil(position / batch_size)` flush intervals.
    pub fn estimate_wait(&self, position: usize) -> Duration {
        let batch = self.config.batch_size.max(1);
        let ticks = (position + batch - 1) / batch;
        self.config.flush_interval * ticks as u32
    }

    /// Take up to `max` live items in tier order; cancelled items are discarded.
    pub fn drain(&self, max: usize) -> Result<Vec<BatchItem<T>>> {
        let mut tiers = self.lock()?;
        let mut batch = Vec::with_capacity(max);
        for p in Priority::QUEUED {
            let Some(q) = tiers.tier_mut(p) else { continue };
            while batch.len() < max {
                let Some(item) = q.pop_front() else { break };
                if item.is_cancelled() {
                    self.skipped_cancelled.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                batch.push(item);
            }
        }
        Ok(batch)
    }

    pub fn drain_all(&self) -> Result<Vec<BatchItem<T>>> {
        self.drain(usize::MAX)
    }

    /// Live (non-cancelled) items per tier; critical is always zero.
    pub fn sizes(&self) -> QueueSizes {
        match self.lock() {
            Ok(tiers) => QueueSizes {
                critical: 0,
                high: tiers.live(Priority::High),
                normal: tiers.live(Priority::Normal),
                low: tiers.live(Priority::Low),
            },
            Err(_) => QueueSizes::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sizes().total() == 0
    }

    pub fn total_enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn skipped_cancelled(&self) -> u64 {
        self.skipped_cancelled.load(Ordering::Relaxed)
    }
}

/// Caller-side handle for a queued completion.
///
/// Dropping the handle before the result arrives cancels the item; once the
/// flush worker has picked it up, cancellation has no effect.
pub struct QueuedCompletion {
    pub id: String,
    pub priority: Priority,
    pub position: usize,
    pub estimated_wait_seconds: f64,
    receiver: Option<oneshot::Receiver<Result<CompletionResponse>>>,
    cancel: CancelFlag,
    settled: bool,
}

impl QueuedCompletion {
    pub fn new(
        id: impl Into<String>,
        priority: Priority,
        outcome: &EnqueueOutcome,
        receiver: oneshot::Receiver<Result<CompletionResponse>>,
        cancel: CancelFlag,
    ) -> Self {
        let (position, estimated_wait_seconds) = match outcome {
            EnqueueOutcome::Queued {
                position,
                estimated_wait_seconds,
            } => (*position, *estimated_wait_seconds),
            EnqueueOutcome::NotQueued => (0, 0.0),
        };
        Self {
            id: id.into(),
            priority,
            position,
            estimated_wait_seconds,
            receiver: Some(receiver),
            cancel,
            settled: false,
        }
    }

    /// Wait for the flush worker to resolve this item.
    pub async fn wait(mut self) -> Result<CompletionResponse> {
        let Some(receiver) = self.receiver.take() else {
            return Err(Error::Cancelled);
        };
        let result = receiver.await.unwrap_or(Err(Error::Cancelled));
        self.settled = true;
        result
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for QueuedCompletion {
    fn drop(&mut self) {
        if !self.settled {
            self.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for QueuedCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedCompletion")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("position", &self.position)
            .field("estimated_wait_seconds", &self.estimated_wait_seconds)
            .finish()
    }
}
