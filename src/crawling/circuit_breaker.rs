//! Three-state circuit breaker
//!
//! CLOSED passes calls through and counts consecutive qualifying failures.
//! Reaching the threshold opens the breaker: calls fail fast until the reset
//! timeout elapses. The breaker then goes HALF_OPEN and admits a limited
//! number of trial calls. Enough consecutive trial successes close it; any
//! trial failure opens it again.
//!
//! Each guarded call runs under its own timeout, and a timeout is a failure.
//! Which errors count as failures is decided by a predicate supplied per
//! resource, so e.g. bad input does not trip a breaker guarding a browser.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::BrowserConfig;

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Breaker tuning
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive qualifying failures that open the breaker
    pub failure_threshold: u32,
    /// Time spent OPEN before trial calls are allowed
    pub reset_timeout: Duration,
    /// Trial calls admitted in HALF_OPEN, and successes needed to close
    pub half_open_max_calls: u32,
    /// Timeout applied to every guarded call
    pub call_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl BreakerConfig {
    pub fn from_browser_config(config: &BrowserConfig) -> Self {
        Self {
            failure_threshold: config.breaker_failure_threshold.max(1),
            reset_timeout: Duration::from_secs(config.breaker_reset_timeout_secs),
            half_open_max_calls: config.breaker_half_open_max_calls.max(1),
            call_timeout: Duration::from_secs(config.breaker_call_timeout_secs),
        }
    }
}

/// Error returned by a guarded call
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Rejected without running the operation
    #[error("circuit '{name}' is open, retry in {retry_after:?}")]
    Open { name: String, retry_after: Duration },

    /// The operation exceeded the call timeout
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The operation itself failed
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Point-in-time breaker health
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerHealth {
    pub name: String,
    pub state: CircuitState,
    /// Share of admitted calls that failed
    pub failure_rate: f64,
    /// Remaining OPEN time, if open
    pub time_to_reset_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// Trial calls admitted in the current HALF_OPEN period
    half_open_admitted: u32,
    last_state_change: Instant,
    total_calls: u64,
    total_failures: u64,
    total_rejections: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            half_open_admitted: 0,
            last_state_change: Instant::now(),
            total_calls: 0,
            total_failures: 0,
            total_rejections: 0,
        }
    }
}

type FailurePredicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// Circuit breaker guarding one resource
pub struct CircuitBreaker<E> {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
    is_failure: FailurePredicate<E>,
}

impl<E> CircuitBreaker<E> {
    /// Create a breaker; `is_failure` decides which errors count toward tripping
    pub fn new(
        name: impl Into<String>,
        config: BreakerConfig,
        is_failure: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
            is_failure: Box::new(is_failure),
        }
    }

    /// Run `op` through the breaker
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit()?;

        match tokio::time::timeout(self.config.call_timeout, op()).await {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                if (self.is_failure)(&e) {
                    self.on_failure();
                } else {
                    self.on_success();
                }
                Err(CircuitError::Inner(e))
            }
            Err(_) => {
                self.on_failure();
                Err(CircuitError::Timeout(self.config.call_timeout))
            }
        }
    }

    /// Whether a call would currently be admitted (does not reserve a slot)
    pub fn is_call_permitted(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => inner.last_state_change.elapsed() >= self.config.reset_timeout,
            CircuitState::HalfOpen => inner.half_open_admitted < self.config.half_open_max_calls,
        }
    }

    fn admit(&self) -> Result<(), CircuitError<E>> {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner.last_state_change.elapsed();
            if elapsed >= self.config.reset_timeout {
                self.transition(&mut inner, CircuitState::HalfOpen);
            } else {
                inner.total_rejections += 1;
                return Err(CircuitError::Open {
                    name: self.name.clone(),
                    retry_after: self.config.reset_timeout - elapsed,
                });
            }
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.half_open_admitted >= self.config.half_open_max_calls {
                inner.total_rejections += 1;
                return Err(CircuitError::Open {
                    name: self.name.clone(),
                    retry_after: Duration::ZERO,
                });
            }
            inner.half_open_admitted += 1;
        }

        inner.total_calls += 1;
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.consecutive_successes += 1;

        if inner.state == CircuitState::HalfOpen
            && inner.consecutive_successes >= self.config.half_open_max_calls
        {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.total_failures += 1;
        inner.consecutive_successes = 0;
        inner.consecutive_failures += 1;

        match inner.state {
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            CircuitState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                self.transition(&mut inner, CircuitState::Open)
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        if inner.state == to {
            return;
        }
        match to {
            CircuitState::Open => warn!(
                "Circuit '{}' opened after {} consecutive failures",
                self.name, inner.consecutive_failures
            ),
            _ => info!("Circuit '{}' {} -> {}", self.name, inner.state, to),
        }
        inner.state = to;
        inner.last_state_change = Instant::now();
        inner.half_open_admitted = 0;
        inner.consecutive_successes = 0;
        if to == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    /// Current state (an elapsed OPEN period is reported as HALF_OPEN)
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        if inner.state == CircuitState::Open
            && inner.last_state_change.elapsed() >= self.config.reset_timeout
        {
            CircuitState::HalfOpen
        } else {
            inner.state
        }
    }

    pub fn health(&self) -> BreakerHealth {
        let state = self.state();
        let inner = self.inner.lock();
        let failure_rate = if inner.total_calls == 0 {
            0.0
        } else {
            inner.total_failures as f64 / inner.total_calls as f64
        };
        let time_to_reset_ms = (state == CircuitState::Open).then(|| {
            self.config
                .reset_timeout
                .saturating_sub(inner.last_state_change.elapsed())
                .as_millis() as u64
        });

        BreakerHealth {
            name: self.name.clone(),
            state,
            failure_rate,
            time_to_reset_ms,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
        }
    }

    /// Force the breaker closed and clear consecutive counters
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        info!("Circuit '{}' manually reset", self.name);
        inner.state = CircuitState::Closed;
        inner.last_state_change = Instant::now();
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.half_open_admitted = 0;
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Network,
        BadInput,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn breaker(threshold: u32, reset_ms: u64, half_open: u32) -> CircuitBreaker<TestError> {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_millis(reset_ms),
                half_open_max_calls: half_open,
                call_timeout: Duration::from_millis(200),
            },
            |e: &TestError| *e == TestError::Network,
        )
    }

    async fn fail(b: &CircuitBreaker<TestError>) -> Result<(), CircuitError<TestError>> {
        b.call(|| async { Err::<(), _>(TestError::Network) }).await
    }

    async fn succeed(b: &CircuitBreaker<TestError>) -> Result<(), CircuitError<TestError>> {
        b.call(|| async { Ok::<(), TestError>(()) }).await
    }

    #[tokio::test]
    async fn opens_after_threshold_and_fails_fast() {
        let b = breaker(3, 10_000, 1);
        for _ in 0..2 {
            assert!(matches!(fail(&b).await, Err(CircuitError::Inner(TestError::Network))));
            assert_eq!(b.state(), CircuitState::Closed);
        }
        assert!(fail(&b).await.is_err());
        assert_eq!(b.state(), CircuitState::Open);

        let ran = Arc::new(AtomicU32::new(0));
        let counter = ran.clone();
        let result = b
            .call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), TestError>(())
            })
            .await;
        assert!(result.unwrap_err().is_open());
        assert_eq!(ran.load(Ordering::SeqCst), 0, "open breaker must not run the call");

        let health = b.health();
        assert_eq!(health.state, CircuitState::Open);
        assert_eq!(health.total_rejections, 1);
        assert!(health.time_to_reset_ms.is_some());
        assert!((health.failure_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failures() {
        let b = breaker(2, 10_000, 1);
        fail(&b).await.ok();
        succeed(&b).await.unwrap();
        fail(&b).await.ok();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn non_qualifying_errors_do_not_trip() {
        let b = breaker(1, 10_000, 1);
        let err = b.call(|| async { Err::<(), _>(TestError::BadInput) }).await;
        assert!(matches!(err, Err(CircuitError::Inner(TestError::BadInput))));
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let b = breaker(1, 10_000, 1);
        let result = b
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), TestError>(())
            })
            .await;
        assert!(matches!(result, Err(CircuitError::Timeout(_))));
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_success_closes() {
        let b = breaker(1, 50, 2);
        fail(&b).await.ok();
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(b.state(), CircuitState::HalfOpen);

        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::HalfOpen);
        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let b = breaker(1, 50, 2);
        fail(&b).await.ok();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(matches!(fail(&b).await, Err(CircuitError::Inner(_))));
        assert_eq!(b.state(), CircuitState::Open);
        assert!(succeed(&b).await.unwrap_err().is_open());
    }

    #[tokio::test]
    async fn half_open_admits_a_bounded_trial_batch() {
        let b = Arc::new(breaker(1, 50, 1));
        fail(&b).await.ok();
        tokio::time::sleep(Duration::from_millis(80)).await;

        // first trial holds its slot while a second call is attempted
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let trial = {
            let b = b.clone();
            tokio::spawn(async move {
                b.call(|| async move {
                    rx.await.ok();
                    Ok::<(), TestError>(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(succeed(&b).await.unwrap_err().is_open());

        tx.send(()).ok();
        assert!(trial.await.unwrap().is_ok());
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn manual_reset_closes() {
        let b = breaker(1, 10_000, 1);
        fail(&b).await.ok();
        assert_eq!(b.state(), CircuitState::Open);
        b.reset();
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(succeed(&b).await.is_ok());
    }
}
