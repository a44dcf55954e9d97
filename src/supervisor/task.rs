//! Supervised task runner.

use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::policy::RestartPolicy;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Starting,
    Running,
    Crashed,
    BackingOff,
    Stopped,
}

/// Async liveness check; `false` restarts the running task.
pub type HealthProbe = Arc<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// Handle to a task running under a [`RestartPolicy`].
///
/// The factory is called once per (re)start with a token that is cancelled
/// when the supervisor stops or the health probe fails; a well-behaved task
/// returns `Ok(())` soon after.
pub struct Supervisor {
    name: String,
    state: watch::Receiver<SupervisorState>,
    stop: CancellationToken,
    restarts: Arc<AtomicU32>,
    last_error: Arc<Mutex<Option<String>>>,
}

enum Exit {
    Returned(std::result::Result<Result<()>, JoinError>),
    StopRequested,
    Unhealthy,
}

struct Shared {
    name: String,
    policy: RestartPolicy,
    probe: Option<HealthProbe>,
    state: watch::Sender<SupervisorState>,
    stop: CancellationToken,
    restarts: Arc<AtomicU32>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl Supervisor {
    pub fn spawn<F, Fut>(name: impl Into<String>, policy: RestartPolicy, factory: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::start(name.into(), policy, None, factory)
    }

    pub fn spawn_with_probe<F, Fut>(
        name: impl Into<String>,
        policy: RestartPolicy,
        probe: HealthProbe,
        factory: F,
    ) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::start(name.into(), policy, Some(probe), factory)
    }

    fn start<F, Fut>(name: String, policy: RestartPolicy, probe: Option<HealthProbe>, factory: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(SupervisorState::Starting);
        let stop = CancellationToken::new();
        let restarts = Arc::new(AtomicU32::new(0));
        let last_error = Arc::new(Mutex::new(None));
        let shared = Shared {
            name: name.clone(),
            policy,
            probe,
            state: tx,
            stop: stop.clone(),
            restarts: Arc::clone(&restarts),
            last_error: Arc::clone(&last_error),
        };
        tokio::spawn(supervise(shared, factory));
        Self {
            name,
            state: rx,
            stop,
            restarts,
            last_error,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Request a stop without waiting for it.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Wait until the supervisor reaches `Stopped`.
    pub async fn wait(&self) {
        let mut rx = self.state.clone();
        // A closed channel means the supervising task is gone.
        let _ = rx.wait_for(|s| *s == SupervisorState::Stopped).await;
    }

    pub async fn shutdown(&self) {
        self.stop();
        self.wait().await;
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("restarts", &self.restarts())
            .finish()
    }
}

async fn unhealthy(probe: Option<HealthProbe>, interval: Option<Duration>) {
    let (Some(probe), Some(every)) = (probe, interval) else {
        return std::future::pending().await;
    };
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    loop {
        ticker.tick().await;
        if !probe().await {
            return;
        }
    }
}

async fn supervise<F, Fut>(shared: Shared, factory: F)
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = shared.name.as_str();
    let policy = &shared.policy;

    loop {
        shared.state.send_replace(SupervisorState::Starting);
        let run_token = shared.stop.child_token();
        let mut task = tokio::spawn(factory(run_token.clone()));
        shared.state.send_replace(SupervisorState::Running);
        info!(task = name, restarts = shared.restarts.load(Ordering::Relaxed), "supervised task running");

        let exit = tokio::select! {
            res = &mut task => Exit::Returned(res),
            _ = shared.stop.cancelled() => Exit::StopRequested,
            _ = unhealthy(shared.probe.clone(), policy.health_check_interval) => Exit::Unhealthy,
        };

        let reason = match exit {
            Exit::Returned(Ok(Ok(()))) => {
                info!(task = name, "supervised task finished");
                break;
            }
            Exit::Returned(Ok(Err(e))) => e.to_string(),
            Exit::Returned(Err(e)) if e.is_panic() => "task panicked".to_string(),
            Exit::Returned(Err(e)) => e.to_string(),
            Exit::StopRequested => {
                if tokio::time::timeout(policy.stop_grace, &mut task).await.is_err() {
                    warn!(task = name, "task ignored stop request, aborting");
                    task.abort();
                }
                info!(task = name, "supervised task stopped");
                break;
            }
            Exit::Unhealthy => {
                run_token.cancel();
                task.abort();
                let _ = task.await;
                "health check failed".to_string()
            }
        };

        if shared.stop.is_cancelled() {
            break;
        }

        warn!(task = name, error = %reason, "supervised task crashed");
        if let Ok(mut last) = shared.last_error.lock() {
            *last = Some(reason);
        }
        shared.state.send_replace(SupervisorState::Crashed);

        let attempt = shared.restarts.load(Ordering::Relaxed) + 1;
        if attempt > policy.max_restarts {
            error!(task = name, max_restarts = policy.max_restarts, "restart budget exhausted, giving up");
            break;
        }
        shared.restarts.store(attempt, Ordering::Relaxed);

        let delay = policy.backoff_for(attempt);
        shared.state.send_replace(SupervisorState::BackingOff);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.stop.cancelled() => break,
        }
    }

    shared.state.send_replace(SupervisorState::Stopped);
}
