//! 优先级批处理模块：按优先级排队、定时批量刷新请求。
//!
//! # Priority Batching Module
//!
//! Non-critical completion requests wait in per-tier FIFO queues and are
//! drained by a periodic flush tick, so bursts of traffic are smoothed into
//! fixed-size batches instead of hitting upstream providers all at once.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`PriorityQueue`] | Per-tier queues (`high`, `normal`, `low`) with size limits |
//! | [`BatchConfig`] | Batch size, flush interval and per-tier limits |
//! | [`BatchItem`] | Queued payload with id, priority and cancellation flag |
//! | [`QueuedCompletion`] | Caller-side handle: position, wait estimate, awaitable result |
//! | [`BatchExecutor`] | Processes a drained batch with retries and failure isolation |
//! | [`FlushWorker`] | Interval loop that drains and executes one batch per tick |
//!
//! ## Example
//!
//! ```rust
//! use adaptive_ai_service::batch::{BatchConfig, BatchItem, PriorityQueue};
//! use adaptive_ai_service::types::Priority;
//!
//! let queue: PriorityQueue<&str> = PriorityQueue::new(BatchConfig::new().with_batch_size(2));
//! queue.enqueue(BatchItem::new(Priority::Low, "later")).unwrap();
//! queue.enqueue(BatchItem::new(Priority::High, "sooner")).unwrap();
//!
//! let batch = queue.drain(2).unwrap();
//! assert_eq!(batch[0].data, "sooner");
//! ```
//!
//! ## Ordering
//!
//! `critical` requests never enter a queue. The remaining tiers drain strictly
//! `high` before `normal` before `low`, FIFO within a tier. Cancelled items are
//! dropped at drain time and do not take a batch slot.

mod collector;
mod executor;
mod worker;

pub use collector::{
    BatchConfig, BatchItem, CancelFlag, EnqueueOutcome, PriorityQueue, QueueLimits, QueueSizes,
    QueuedCompletion,
};
pub use executor::{BatchExecutor, BatchExecutorConfig, BatchReport, BatchStrategy, ItemHandler};
pub use worker::FlushWorker;
