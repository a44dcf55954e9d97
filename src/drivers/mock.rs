//! Scripted in-process driver for tests and local demos.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{ProviderDriver, ProviderReply, ProviderRequest};
use crate::types::ProviderKind;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    Reply(String),
    /// Fails like a transport error.
    Fail(String),
    /// Fails like a non-2xx upstream reply.
    Status(u16),
}

/// Plays back queued outcomes, then repeats a fallback outcome forever.
#[derive(Debug)]
pub struct MockDriver {
    kind: ProviderKind,
    script: Mutex<VecDeque<MockOutcome>>,
    fallback: MockOutcome,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockDriver {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            fallback: MockOutcome::Reply(format!("{} says hello", kind.id())),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, text: impl Into<String>) -> Self {
        self.fallback = MockOutcome::Reply(text.into());
        self
    }

    pub fn always_failing(mut self, message: impl Into<String>) -> Self {
        self.fallback = MockOutcome::Fail(message.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue an outcome to be used before the fallback.
    pub fn then(self, outcome: MockOutcome) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProviderDriver for MockDriver {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(&self, request: &ProviderRequest) -> Result<ProviderReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let outcome = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match outcome {
            MockOutcome::Reply(content) => Ok(ProviderReply {
                content,
                model: request.model.clone(),
                finish_reason: Some("stop".into()),
                usage: None,
            }),
            MockOutcome::Fail(message) => Err(Error::provider(self.kind.id(), message)),
            MockOutcome::Status(code) => Err(Error::provider_status(
                self.kind.id(),
                code,
                format!("HTTP {}", code),
            )),
        }
    }
}
