//! Shared headless-browser pool
//!
//! One pool is created by the composition root and shared by every crawl
//! session. Engine startup is lazy, serialized by an init lock, retried on a
//! backoff schedule and guarded by a circuit breaker. A health check runs at
//! most once per interval when a lease is taken; an unhealthy engine is torn
//! down and relaunched on the next acquire.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::crawling::circuit_breaker::{BreakerConfig, BreakerHealth, CircuitBreaker, CircuitError};
use crate::crawling::retry::RetryPolicy;

/// Browser errors
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("browser connection lost: {0}")]
    ConnectionLost(String),

    #[error("browser unhealthy: {0}")]
    Unhealthy(String),

    #[error("browser pool unavailable: {0}")]
    PoolUnavailable(String),

    #[error("browser pool is shut down")]
    ShutDown,

    #[error("navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error("navigation failed: {0}")]
    Navigation(String),
}

impl BrowserError {
    /// Faults of the browser itself rather than of one page; these trip the
    /// breaker and disable browser use for the rest of a session
    pub fn is_cluster_fault(&self) -> bool {
        !matches!(self, BrowserError::NavigationTimeout(_) | BrowserError::Navigation(_))
    }

    fn from_circuit(err: CircuitError<BrowserError>) -> Self {
        match err {
            CircuitError::Open { .. } => BrowserError::PoolUnavailable(err.to_string()),
            CircuitError::Timeout(d) => BrowserError::Unhealthy(format!("call timed out after {:?}", d)),
            CircuitError::Inner(e) => e,
        }
    }
}

/// Per-render settings
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub navigation_timeout: Duration,
    /// Wait after navigation for client-side rendering
    pub settle: Duration,
    /// Request URL patterns to block
    pub blocked_patterns: Vec<String>,
}

impl RenderOptions {
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            settle: Duration::from_millis(config.settle_ms),
            blocked_patterns: super::blocking::blocked_url_patterns(),
        }
    }
}

/// A running browser able to render pages
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Navigate to `url` and return the rendered DOM as HTML
    async fn render(&self, url: &str, options: &RenderOptions) -> Result<String, BrowserError>;

    /// Cheap liveness probe
    async fn health_check(&self) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}

/// Starts render engines
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn RenderEngine>, BrowserError>;
}

/// Pool counters
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub launches: u64,
    pub launch_failures: u64,
    pub renders: u64,
    pub render_failures: u64,
    pub health_checks: u64,
    pub unhealthy_teardowns: u64,
}

#[derive(Default)]
struct PoolCounters {
    launches: AtomicU64,
    launch_failures: AtomicU64,
    renders: AtomicU64,
    render_failures: AtomicU64,
    health_checks: AtomicU64,
    unhealthy_teardowns: AtomicU64,
}

/// A render slot on a live engine; dropping it frees the slot
pub struct BrowserLease {
    engine: Arc<dyn RenderEngine>,
    _permit: OwnedSemaphorePermit,
}

impl BrowserLease {
    pub async fn render(&self, url: &str, options: &RenderOptions) -> Result<String, BrowserError> {
        self.engine.render(url, options).await
    }
}

pub struct BrowserPool {
    launcher: Arc<dyn EngineLauncher>,
    /// Doubles as the init lock
    engine: tokio::sync::Mutex<Option<Arc<dyn RenderEngine>>>,
    slots: Arc<Semaphore>,
    breaker: CircuitBreaker<BrowserError>,
    retry: RetryPolicy,
    health_interval: Duration,
    health_timeout: Duration,
    last_health_check: Mutex<Option<Instant>>,
    counters: PoolCounters,
}

impl BrowserPool {
    pub fn new(launcher: Arc<dyn EngineLauncher>, config: &BrowserConfig) -> Self {
        Self {
            launcher,
            engine: tokio::sync::Mutex::new(None),
            slots: Arc::new(Semaphore::new(config.max_pages.max(1))),
            breaker: CircuitBreaker::new(
                "browser-pool",
                BreakerConfig::from_browser_config(config),
                BrowserError::is_cluster_fault,
            ),
            retry: RetryPolicy::from_millis(&config.launch_backoff_ms),
            health_interval: Duration::from_secs(config.health_check_interval_secs),
            health_timeout: Duration::from_secs(config.health_check_timeout_secs.max(1)),
            last_health_check: Mutex::new(None),
            counters: PoolCounters::default(),
        }
    }

    /// Take a render slot, starting or repairing the engine first if needed
    pub async fn acquire(&self) -> Result<BrowserLease, BrowserError> {
        if self.slots.is_closed() {
            return Err(BrowserError::ShutDown);
        }
        let engine = self.ensure_engine().await?;
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BrowserError::ShutDown)?;
        Ok(BrowserLease { engine, _permit: permit })
    }

    /// Return a slot
    pub fn release(&self, lease: BrowserLease) {
        drop(lease);
    }

    /// Render one page through the breaker; cluster faults tear the engine down
    pub async fn render(&self, url: &str, options: &RenderOptions) -> Result<String, BrowserError> {
        let lease = self.acquire().await?;
        self.counters.renders.fetch_add(1, Ordering::Relaxed);

        let result = self
            .breaker
            .call(|| lease.render(url, options))
            .await
            .map_err(BrowserError::from_circuit);
        self.release(lease);

        if let Err(e) = &result {
            self.counters.render_failures.fetch_add(1, Ordering::Relaxed);
            if e.is_cluster_fault() {
                warn!("Browser fault while rendering {}: {}", url, e);
                self.teardown().await;
            }
        }
        result
    }

    async fn ensure_engine(&self) -> Result<Arc<dyn RenderEngine>, BrowserError> {
        let mut guard = self.engine.lock().await;

        if let Some(engine) = guard.as_ref() {
            if !self.health_check_due() {
                return Ok(engine.clone());
            }
            match self.probe(engine.as_ref()).await {
                Ok(()) => return Ok(engine.clone()),
                Err(e) => {
                    warn!("Browser failed health check, relaunching: {}", e);
                    self.counters.unhealthy_teardowns.fetch_add(1, Ordering::Relaxed);
                    if let Some(old) = guard.take() {
                        self.close_engine(old).await;
                    }
                }
            }
        }

        if !self.breaker.is_call_permitted() {
            return Err(BrowserError::PoolUnavailable(format!(
                "circuit '{}' is {}",
                self.breaker.name(),
                self.breaker.state()
            )));
        }

        let breaker = &self.breaker;
        let launcher = &self.launcher;
        let counters = &self.counters;
        let engine = self
            .retry
            .run(
                "browser launch",
                move |attempt| {
                    debug!("Launching browser (attempt {})", attempt);
                    breaker.call(move || {
                        counters.launches.fetch_add(1, Ordering::Relaxed);
                        launcher.launch()
                    })
                },
                |e: &CircuitError<BrowserError>| !e.is_open(),
            )
            .await
            .map_err(|e| {
                self.counters.launch_failures.fetch_add(1, Ordering::Relaxed);
                BrowserError::from_circuit(e)
            })?;

        info!("Browser engine started");
        *self.last_health_check.lock() = Some(Instant::now());
        *guard = Some(engine.clone());
        Ok(engine)
    }

    fn health_check_due(&self) -> bool {
        match *self.last_health_check.lock() {
            Some(at) => at.elapsed() >= self.health_interval,
            None => true,
        }
    }

    async fn probe(&self, engine: &dyn RenderEngine) -> Result<(), BrowserError> {
        self.counters.health_checks.fetch_add(1, Ordering::Relaxed);
        *self.last_health_check.lock() = Some(Instant::now());
        match tokio::time::timeout(self.health_timeout, engine.health_check()).await {
            Ok(result) => result,
            Err(_) => Err(BrowserError::Unhealthy(format!(
                "health check timed out after {:?}",
                self.health_timeout
            ))),
        }
    }

    /// Probe the running engine now; an unhealthy engine is torn down
    pub async fn health_check(&self) -> Result<(), BrowserError> {
        let mut guard = self.engine.lock().await;
        let Some(engine) = guard.as_ref() else {
            return Err(BrowserError::Unhealthy("browser not running".to_string()));
        };
        let result = self.probe(engine.as_ref()).await;
        if result.is_err() {
            self.counters.unhealthy_teardowns.fetch_add(1, Ordering::Relaxed);
            if let Some(old) = guard.take() {
                self.close_engine(old).await;
            }
        }
        result
    }

    async fn teardown(&self) {
        let old = self.engine.lock().await.take();
        if let Some(old) = old {
            self.close_engine(old).await;
        }
    }

    async fn close_engine(&self, engine: Arc<dyn RenderEngine>) {
        match tokio::time::timeout(self.health_timeout, engine.close()).await {
            Ok(Ok(())) => debug!("Browser engine closed"),
            Ok(Err(e)) => debug!("Error closing browser engine: {}", e),
            Err(_) => debug!("Timed out closing browser engine"),
        }
    }

    /// Close the engine and refuse further leases
    pub async fn shutdown(&self) {
        self.slots.close();
        self.teardown().await;
        info!("Browser pool shut down");
    }

    pub async fn is_running(&self) -> bool {
        self.engine.lock().await.is_some()
    }

    pub fn breaker_health(&self) -> BreakerHealth {
        self.breaker.health()
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.counters;
        PoolStats {
            launches: c.launches.load(Ordering::Relaxed),
            launch_failures: c.launch_failures.load(Ordering::Relaxed),
            renders: c.renders.load(Ordering::Relaxed),
            render_failures: c.render_failures.load(Ordering::Relaxed),
            health_checks: c.health_checks.load(Ordering::Relaxed),
            unhealthy_teardowns: c.unhealthy_teardowns.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32};

    /// Engine that echoes a canned page and can be made unhealthy
    pub struct FakeEngine {
        pub html: String,
        pub healthy: AtomicBool,
        pub fail_with: Mutex<Option<BrowserError>>,
        pub renders: AtomicU32,
        pub closed: AtomicBool,
    }

    #[async_trait]
    impl RenderEngine for FakeEngine {
        async fn render(&self, url: &str, _options: &RenderOptions) -> Result<String, BrowserError> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.fail_with.lock().clone() {
                return Err(e);
            }
            Ok(self.html.replace("{url}", url))
        }

        async fn health_check(&self) -> Result<(), BrowserError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(BrowserError::ConnectionLost("gone".into()))
            }
        }

        async fn close(&self) -> Result<(), BrowserError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Launcher failing its first `fail_first` launches
    pub struct FakeLauncher {
        pub html: String,
        pub fail_first: u32,
        pub launches: AtomicU32,
        pub engines: Mutex<Vec<Arc<FakeEngine>>>,
    }

    impl FakeLauncher {
        pub fn new(html: &str, fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                html: html.to_string(),
                fail_first,
                launches: AtomicU32::new(0),
                engines: Mutex::new(Vec::new()),
            })
        }

        pub fn last_engine(&self) -> Option<Arc<FakeEngine>> {
            self.engines.lock().last().cloned()
        }
    }

    #[async_trait]
    impl EngineLauncher for FakeLauncher {
        async fn launch(&self) -> Result<Arc<dyn RenderEngine>, BrowserError> {
            let n = self.launches.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(BrowserError::LaunchFailed(format!("launch {} refused", n + 1)));
            }
            let engine = Arc::new(FakeEngine {
                html: self.html.clone(),
                healthy: AtomicBool::new(true),
                fail_with: Mutex::new(None),
                renders: AtomicU32::new(0),
                closed: AtomicBool::new(false),
            });
            self.engines.lock().push(engine.clone());
            Ok(engine)
        }
    }

    pub fn fast_config() -> BrowserConfig {
        BrowserConfig {
            max_pages: 2,
            launch_backoff_ms: vec![1, 1, 1],
            health_check_interval_secs: 0,
            health_check_timeout_secs: 1,
            breaker_failure_threshold: 10,
            breaker_reset_timeout_secs: 60,
            breaker_call_timeout_secs: 5,
            ..BrowserConfig::default()
        }
    }

    pub fn options() -> RenderOptions {
        RenderOptions {
            navigation_timeout: Duration::from_secs(1),
            settle: Duration::ZERO,
            blocked_patterns: Vec::new(),
        }
    }
}
