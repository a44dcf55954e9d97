use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerSnapshot {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 1,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive failures that open the breaker.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { remaining: Duration },
}

#[derive(Debug)]
struct State {
    consecutive_failures: u32,
    total_failures: u64,
    open_until: Option<Instant>,
    last_error: Option<String>,
}

/// Failure-counting breaker that takes a provider out of rotation for a
/// cool-down window.
///
/// The breaker closes by itself once the window elapses; the next call is the
/// probe. `last_error` survives the close so operators can still see why the
/// provider was degraded.
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    state: std::sync::Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: std::sync::Mutex::new(State {
                consecutive_failures: 0,
                total_failures: 0,
                open_until: None,
                last_error: None,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    pub fn state(&self) -> BreakerState {
        let Ok(mut st) = self.state.lock() else {
            return BreakerState::Closed;
        };
        match st.open_until {
            Some(until) => {
                let now = Instant::now();
                if now < until {
                    BreakerState::Open {
                        remaining: until - now,
                    }
                } else {
                    // cooldown expired
                    st.open_until = None;
                    st.consecutive_failures = 0;
                    BreakerState::Closed
                }
            }
            None => BreakerState::Closed,
        }
    }

    pub fn allow(&self) -> bool {
        matches!(self.state(), BreakerState::Closed)
    }

    pub fn on_success(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.consecutive_failures = 0;
            st.open_until = None;
        }
    }

    pub fn on_failure(&self, reason: impl Into<String>) {
        if let Ok(mut st) = self.state.lock() {
            st.consecutive_failures = st.consecutive_failures.saturating_add(1);
            st.total_failures = st.total_failures.saturating_add(1);
            st.last_error = Some(reason.into());
            if st.consecutive_failures >= self.cfg.failure_threshold {
                st.open_until = Some(Instant::now() + self.cfg.cooldown);
            }
        }
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let open_remaining_ms = match self.state() {
            BreakerState::Open { remaining } => Some(remaining.as_millis() as u64),
            BreakerState::Closed => None,
        };
        let (consecutive_failures, total_failures, last_error) = match self.state.lock() {
            Ok(st) => (st.consecutive_failures, st.total_failures, st.last_error.clone()),
            Err(_) => (0, 0, None),
        };
        CircuitBreakerSnapshot {
            failure_threshold: self.cfg.failure_threshold,
            cooldown_ms: self.cfg.cooldown.as_millis() as u64,
            consecutive_failures,
            total_failures,
            open_remaining_ms,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.cooldown, Duration::from_secs(30));
        assert_eq!(CircuitBreakerConfig::new().with_failure_threshold(0).failure_threshold, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold_and_closes_after_cooldown() {
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(2)
                .with_cooldown(Duration::from_secs(30)),
        );
        cb.on_failure("timeout");
        assert!(cb.allow());
        cb.on_failure("HTTP 500");
        assert!(matches!(cb.state(), BreakerState::Open { .. }));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cb.allow());
        let snap = cb.snapshot();
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.total_failures, 2);
        assert_eq!(snap.last_error.as_deref(), Some("HTTP 500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::new().with_failure_threshold(3));
        cb.on_failure("a");
        cb.on_failure("b");
        cb.on_success();
        assert_eq!(cb.snapshot().consecutive_failures, 0);
        assert!(cb.snapshot().open_remaining_ms.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_remaining() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::new().with_cooldown(Duration::from_secs(10)));
        cb.on_failure("down");
        tokio::time::advance(Duration::from_secs(4)).await;
        let remaining = cb.snapshot().open_remaining_ms.unwrap();
        assert!(remaining <= 6_000 && remaining > 5_000, "remaining = {remaining}");
    }
}
