//! Chromium engine over the DevTools protocol

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use futures::StreamExt;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use super::pool::{BrowserError, EngineLauncher, RenderEngine, RenderOptions};
use crate::config::BrowserConfig;

/// Best-effort wait for the load event after `goto` resolves
const LOAD_WAIT: Duration = Duration::from_secs(10);

/// Launches headless Chromium
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
    user_agent: String,
}

impl ChromeLauncher {
    pub fn new(config: &BrowserConfig, user_agent: impl Into<String>) -> Self {
        Self {
            executable: config.executable_path.clone(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl EngineLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Arc<dyn RenderEngine>, BrowserError> {
        let mut builder = CdpBrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--mute-audio")
            .arg(format!("--user-agent={}", self.user_agent));
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Arc::new(ChromeEngine {
            browser: RwLock::new(Some(browser)),
            handler: Mutex::new(Some(handler_task)),
        }))
    }
}

struct ChromeEngine {
    browser: RwLock<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

fn protocol(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::Protocol(e.to_string())
}

impl ChromeEngine {
    fn connection_alive(&self) -> bool {
        self.handler
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    async fn render(&self, url: &str, options: &RenderOptions) -> Result<String, BrowserError> {
        if !self.connection_alive() {
            return Err(BrowserError::ConnectionLost("event handler stopped".to_string()));
        }
        let guard = self.browser.read().await;
        let browser = guard.as_ref().ok_or(BrowserError::ShutDown)?;

        // Tab-level failures are browser faults; navigation failures are page faults
        let page = browser.new_page("about:blank").await.map_err(protocol)?;

        let result = async {
            page.execute(EnableParams::default()).await.map_err(protocol)?;
            if !options.blocked_patterns.is_empty() {
                page.execute(SetBlockedUrLsParams::new(options.blocked_patterns.clone()))
                    .await
                    .map_err(protocol)?;
            }

            tokio::time::timeout(options.navigation_timeout, page.goto(url))
                .await
                .map_err(|_| BrowserError::NavigationTimeout(options.navigation_timeout))?
                .map_err(|e| BrowserError::Navigation(e.to_string()))?;

            let _ = tokio::time::timeout(LOAD_WAIT, page.wait_for_navigation()).await;
            if !options.settle.is_zero() {
                tokio::time::sleep(options.settle).await;
            }

            tokio::time::timeout(options.navigation_timeout, page.content())
                .await
                .map_err(|_| BrowserError::NavigationTimeout(options.navigation_timeout))?
                .map_err(protocol)
        }
        .await;

        if let Err(e) = page.close().await {
            debug!("Page close error for {}: {}", url, e);
        }
        result
    }

    async fn health_check(&self) -> Result<(), BrowserError> {
        if !self.connection_alive() {
            return Err(BrowserError::ConnectionLost("event handler stopped".to_string()));
        }
        let guard = self.browser.read().await;
        let browser = guard.as_ref().ok_or(BrowserError::ShutDown)?;
        browser
            .version()
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Unhealthy(e.to_string()))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let browser = self.browser.write().await.take();
        let result = match browser {
            Some(mut browser) => browser.close().await.map(|_| ()).map_err(protocol),
            None => Ok(()),
        };
        if let Some(task) = self.handler.lock().take() {
            task.abort();
        }
        result
    }
}
