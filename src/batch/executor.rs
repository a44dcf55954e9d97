//! Batch executor.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::collector::BatchItem;
use crate::{Error, Result};

/// Per-item work done by the executor.
///
/// `attempt` may be invoked several times for one item when it fails with a
/// retryable error; `finish` is invoked exactly once with the final outcome.
#[async_trait]
pub trait ItemHandler<T: Send + Sync>: Send + Sync {
    type Output: Send;

    async fn attempt(&self, item: &BatchItem<T>) -> Result<Self::Output>;

    fn finish(&self, item: BatchItem<T>, outcome: Result<Self::Output>);
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failures: Vec<(String, Error)>,
    pub retries: u32,
    pub execution_time: Duration,
    pub total_processed: usize,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
    pub fn success_rate(&self) -> f64 {
        if self.total_processed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total_processed as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStrategy {
    /// One item at a time, in drained order.
    #[default]
    Sequential,
    /// Items start in drained order with at most `max_concurrency` in flight.
    Concurrent { max_concurrency: usize },
}

#[derive(Debug, Clone)]
pub struct BatchExecutorConfig {
    pub strategy: BatchStrategy,
    pub max_retries: u32,
    /// Base delay before the first retry; doubles on each further attempt.
    pub retry_backoff: Duration,
}

impl Default for BatchExecutorConfig {
    fn default() -> Self {
        Self {
            strategy: BatchStrategy::default(),
            max_retries: 2,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl BatchExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_strategy(mut self, s: BatchStrategy) -> Self {
        self.strategy = s;
        self
    }
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }
    pub fn with_retry_backoff(mut self, d: Duration) -> Self {
        self.retry_backoff = d;
        self
    }
}

pub struct BatchExecutor {
    config: BatchExecutorConfig,
}

impl BatchExecutor {
    pub fn new() -> Self {
        Self {
            config: BatchExecutorConfig::default(),
        }
    }
    pub fn with_config(config: BatchExecutorConfig) -> Self {
        Self { config }
    }
    pub fn config(&self) -> &BatchExecutorConfig {
        &self.config
    }

    /// Process every item; a failing item never stops the rest of the batch.
    pub async fn execute<T, H>(&self, items: Vec<BatchItem<T>>, handler: &H) -> BatchReport
    where
        T: Send + Sync,
        H: ItemHandler<T>,
    {
        let start = Instant::now();
        let mut report = BatchReport {
            total_processed: items.len(),
            ..Default::default()
        };

        match self.config.strategy {
            BatchStrategy::Sequential => {
                for item in items {
                    let (outcome, retries) = self.attempt_with_retries(&item, handler).await;
                    Self::record(&mut report, &item, &outcome, retries);
                    handler.finish(item, outcome);
                }
            }
            BatchStrategy::Concurrent { max_concurrency } => {
                let mut results = stream::iter(items)
                    .map(|item| async move {
                        let (outcome, retries) = self.attempt_with_retries(&item, handler).await;
                        (item, outcome, retries)
                    })
                    .buffered(max_concurrency.max(1));
                while let Some((item, outcome, retries)) = results.next().await {
                    Self::record(&mut report, &item, &outcome, retries);
                    handler.finish(item, outcome);
                }
            }
        }

        report.execution_time = start.elapsed();
        report
    }

    async fn attempt_with_retries<T, H>(
        &self,
        item: &BatchItem<T>,
        handler: &H,
    ) -> (Result<H::Output>, u32)
    where
        T: Send + Sync,
        H: ItemHandler<T>,
    {
        let mut retries = 0;
        loop {
            match handler.attempt(item).await {
                Ok(out) => return (Ok(out), retries),
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    let delay = self.config.retry_backoff * 2u32.saturating_pow(retries);
                    debug!(item = %item.id, attempt = retries + 1, ?delay, error = %e, "retrying queued item");
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(e) => return (Err(e), retries),
            }
        }
    }

    fn record<T, O>(report: &mut BatchReport, item: &BatchItem<T>, outcome: &Result<O>, retries: u32) {
        report.retries += retries;
        match outcome {
            Ok(_) => report.succeeded += 1,
            Err(e) => {
                warn!(item = %item.id, priority = %item.priority, error = %e, "queued item failed");
                report.failures.push((item.id.clone(), e.clone()));
            }
        }
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new()
    }
}
