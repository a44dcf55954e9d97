//! Restart policy.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Restarts allowed after crashes before the supervisor gives up.
    pub max_restarts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// How often the health probe runs, if one is installed.
    pub health_check_interval: Option<Duration>,
    /// Time a stopping task gets to return before it is aborted.
    pub stop_grace: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            health_check_interval: None,
            stop_grace: Duration::from_secs(10),
        }
    }
}

impl RestartPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never restart; the first crash stops the supervisor.
    pub fn never() -> Self {
        Self {
            max_restarts: 0,
            ..Self::default()
        }
    }

    pub fn with_max_restarts(mut self, n: u32) -> Self {
        self.max_restarts = n;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = Some(interval);
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Delay before restart number `restart` (1-based): doubles each time,
    /// capped at `max_backoff`.
    pub fn backoff_for(&self, restart: u32) -> Duration {
        let exp = restart.saturating_sub(1).min(20);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}
