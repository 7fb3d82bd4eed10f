//! Adaptive batch sizing and request timeouts
//!
//! An additive increase/decrease controller over a rolling window of
//! response times. At most one step per adjustment interval: a slow origin
//! loses one slot, a fast one gains one, always within `[min, max]`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::{ConcurrencyConfig, CrawlerConfig};
use crate::util::mean_ms;

/// Multiple of the average response time used as the request timeout
const TIMEOUT_FACTOR: f64 = 3.0;

/// `value` limited to `[lo, hi]`; `lo` wins when the bounds are inverted
fn bounded<T: Ord>(value: T, lo: T, hi: T) -> T {
    value.min(hi).max(lo)
}

/// Direction of one adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyChange {
    Increased { from: usize, to: usize },
    Decreased { from: usize, to: usize },
}

/// Timeout bounds taken from the crawler config
#[derive(Debug, Clone, Copy)]
pub struct TimeoutBounds {
    pub min: Duration,
    pub max: Duration,
    pub initial: Duration,
}

impl TimeoutBounds {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            min: Duration::from_secs(config.min_timeout_secs),
            max: Duration::from_secs(config.max_timeout_secs),
            initial: Duration::from_secs(config.initial_timeout_secs),
        }
    }
}

impl Default for TimeoutBounds {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// Per-session concurrency controller
#[derive(Debug)]
pub struct AdaptiveConcurrency {
    config: ConcurrencyConfig,
    timeouts: TimeoutBounds,
    current: usize,
    samples: VecDeque<u64>,
    last_adjustment: Instant,
    adjustments: u32,
}

impl AdaptiveConcurrency {
    pub fn new(config: ConcurrencyConfig, timeouts: TimeoutBounds) -> Self {
        let current = bounded(config.initial, config.min.max(1), config.max.max(1));
        Self {
            samples: VecDeque::with_capacity(config.window_size),
            config,
            timeouts,
            current,
            last_adjustment: Instant::now(),
            adjustments: 0,
        }
    }

    /// Current batch size
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn adjustments(&self) -> u32 {
        self.adjustments
    }

    /// Record one response time into the rolling window
    pub fn record_response_time(&mut self, elapsed: Duration) {
        if self.samples.len() == self.config.window_size.max(1) {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed.as_millis() as u64);
    }

    /// Rolling average in milliseconds, if anything has been recorded
    pub fn average_response_ms(&self) -> Option<f64> {
        mean_ms(self.samples.iter().copied())
    }

    /// Request timeout: three times the rolling average, clamped to the
    /// configured floor and ceiling
    pub fn adaptive_timeout(&self) -> Duration {
        match self.average_response_ms() {
            Some(avg) => bounded(
                Duration::from_millis((avg * TIMEOUT_FACTOR) as u64),
                self.timeouts.min,
                self.timeouts.max,
            ),
            None => bounded(self.timeouts.initial, self.timeouts.min, self.timeouts.max),
        }
    }

    /// Adjust if the interval has elapsed since the last adjustment
    pub fn maybe_adjust(&mut self) -> Option<ConcurrencyChange> {
        self.maybe_adjust_at(Instant::now())
    }

    pub(crate) fn maybe_adjust_at(&mut self, now: Instant) -> Option<ConcurrencyChange> {
        let interval = Duration::from_secs(self.config.adjust_interval_secs);
        if now.saturating_duration_since(self.last_adjustment) < interval {
            return None;
        }
        let avg = self.average_response_ms()?;
        self.last_adjustment = now;

        let from = self.current;
        let change = if avg > self.config.high_water_ms as f64 && from > self.config.min {
            self.current = from - 1;
            ConcurrencyChange::Decreased { from, to: self.current }
        } else if avg < self.config.low_water_ms as f64 && from < self.config.max {
            self.current = from + 1;
            ConcurrencyChange::Increased { from, to: self.current }
        } else {
            return None;
        };

        self.adjustments += 1;
        info!(
            "Concurrency {} -> {} (avg response {:.0}ms)",
            from, self.current, avg
        );
        Some(change)
    }
}
