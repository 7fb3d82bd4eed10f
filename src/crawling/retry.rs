//! Retry with a fixed backoff schedule
//!
//! One policy type for every fallible external call that deserves retries
//! (browser launches today). The schedule lists the delay before each retry,
//! so `[1s, 2s, 5s]` means four attempts in total.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff schedule plus attempt bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(&[1_000, 2_000, 5_000])
    }
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_millis(delays: &[u64]) -> Self {
        Self::new(delays.iter().map(|ms| Duration::from_millis(*ms)).collect())
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    /// Total attempts, the first one included
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: usize) -> Option<Duration> {
        retry.checked_sub(1).and_then(|i| self.delays.get(i)).copied()
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or the
    /// schedule is exhausted. `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, P>(&self, label: &str, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let delay = match self.delay_for(attempt) {
                        Some(d) if retryable(&e) => d,
                        _ => return Err(e),
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        label,
                        attempt,
                        self.max_attempts(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn schedule_defines_attempts() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts(), 4);
        assert_eq!(p.delay_for(1), Some(Duration::from_secs(1)));
        assert_eq!(p.delay_for(3), Some(Duration::from_secs(5)));
        assert_eq!(p.delay_for(4), None);
        assert_eq!(p.delay_for(0), None);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let p = RetryPolicy::from_millis(&[1, 1, 1]);
        let calls = AtomicUsize::new(0);
        let result: Result<usize, String> = p
            .run(
                "op",
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err(format!("attempt {} failed", attempt))
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |_| true,
            )
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_schedule() {
        let p = RetryPolicy::from_millis(&[1, 1]);
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = p
            .run(
                "op",
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("down".to_string()) }
                },
                |_| true,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let p = RetryPolicy::from_millis(&[1, 1]);
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = p
            .run(
                "op",
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal".to_string()) }
                },
                |e: &String| e != "fatal",
            )
            .await;
        assert_eq!(result, Err("fatal".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
