//! Headless browser rendering configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding the browser binary
pub const ENV_BROWSER_EXECUTABLE: &str = "BROWSER_EXECUTABLE_PATH";

/// Environment variable toggling tier-based rendering decisions
pub const ENV_TIER_BASED_RENDERING: &str = "TIER_BASED_RENDERING";

/// Headless browser pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Path to the Chromium/Chrome binary (autodetected when unset)
    pub executable_path: Option<PathBuf>,
    /// Decide browser usage from page tiers instead of JS-heaviness alone
    pub tier_based_rendering: bool,
    /// Maximum concurrently open pages
    pub max_pages: usize,
    /// Navigation timeout (seconds)
    pub navigation_timeout_secs: u64,
    /// Time allowed for client-side rendering to settle (milliseconds)
    pub settle_ms: u64,
    /// Minimum interval between pool health checks (seconds)
    pub health_check_interval_secs: u64,
    /// Time box for one health check (seconds)
    pub health_check_timeout_secs: u64,
    /// Delays before each launch retry (milliseconds); one retry per entry
    pub launch_backoff_ms: Vec<u64>,
    /// Consecutive failures before the breaker opens
    pub breaker_failure_threshold: u32,
    /// Time the breaker stays open before a trial (seconds)
    pub breaker_reset_timeout_secs: u64,
    /// Trial calls allowed while half-open
    pub breaker_half_open_max_calls: u32,
    /// Per-call timeout enforced by the breaker (seconds)
    pub breaker_call_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            tier_based_rendering: true,
            max_pages: 4,
            navigation_timeout_secs: 45,
            settle_ms: 1_500,
            health_check_interval_secs: 30,
            health_check_timeout_secs: 5,
            launch_backoff_ms: vec![1_000, 2_000, 5_000],
            breaker_failure_threshold: 3,
            breaker_reset_timeout_secs: 60,
            breaker_half_open_max_calls: 1,
            breaker_call_timeout_secs: 60,
        }
    }
}

/// Parse a boolean feature flag value ("1", "true", "yes", "on")
pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
