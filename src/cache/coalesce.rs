//! In-flight request coalescing.
//!
//! The first caller for a fingerprint spawns the computation; everyone else who
//! arrives before it finishes awaits the same shared outcome. The computation
//! runs in its own task, so a caller that goes away does not abort it.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::key::Fingerprint;
use crate::types::CompletionResponse;
use crate::{Error, ErrorContext, Result};

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T>>>;

struct InFlight<T: Clone> {
    generation: u64,
    outcome: SharedOutcome<T>,
}

struct Inner<T: Clone> {
    entries: Mutex<HashMap<Fingerprint, InFlight<T>>>,
    next_generation: AtomicU64,
    joined: AtomicU64,
}

impl<T: Clone> Inner<T> {
    fn release(&self, key: &Fingerprint, generation: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.get(key).map(|e| e.generation) == Some(generation) {
                entries.remove(key);
            }
        }
    }
}

/// Removes the in-flight entry when the computation ends, panics included.
struct Release<T: Clone> {
    inner: Arc<Inner<T>>,
    key: Fingerprint,
    generation: u64,
}

impl<T: Clone> Drop for Release<T> {
    fn drop(&mut self) {
        self.inner.release(&self.key, self.generation);
    }
}

pub struct Coalescer<T: Clone = CompletionResponse> {
    inner: Arc<Inner<T>>,
}

impl<T> Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                joined: AtomicU64::new(0),
            }),
        }
    }

    /// Run `computation` for `key`, or join the one already running.
    pub async fn run<F>(&self, key: Fingerprint, computation: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let outcome = {
            let mut entries = self.inner.entries.lock().map_err(|_| {
                Error::runtime_with_context(
                    "coalescer poisoned",
                    ErrorContext::new().with_source("coalescer"),
                )
            })?;

            if let Some(existing) = entries.get(&key) {
                self.inner.joined.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %key.short(), "joining in-flight computation");
                existing.outcome.clone()
            } else {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let guard = Release {
                    inner: Arc::clone(&self.inner),
                    key: key.clone(),
                    generation,
                };
                let handle = tokio::spawn(async move {
                    let result = computation.await;
                    drop(guard);
                    result
                });
                let outcome = async move {
                    handle.await.unwrap_or_else(|e| {
                        Err(Error::runtime_with_context(
                            "computation task failed",
                            ErrorContext::new()
                                .with_details(e.to_string())
                                .with_source("coalescer"),
                        ))
                    })
                }
                .boxed()
                .shared();
                entries.insert(
                    key,
                    InFlight {
                        generation,
                        outcome: outcome.clone(),
                    },
                );
                outcome
            }
        };
        outcome.await
    }

    /// Number of computations currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Total callers that joined an existing computation instead of starting one.
    pub fn joined(&self) -> u64 {
        self.inner.joined.load(Ordering::Relaxed)
    }
}

impl<T> Default for Coalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Coalescer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
