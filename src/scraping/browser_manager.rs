//! Native browser management using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (Chrome, Chromium or Brave).
//! * The [`PageDriver`] capability the fetch pipeline is written against.
//! * [`ChromiumDriver`], the CDP-backed implementation of that capability.
//!
//! The session is headed by default: share pages are often gated by a
//! verification challenge that a human has to clear in the visible window.

use crate::core::config::{self, ExtractorConfig};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A4 paper, in inches.
const A4_WIDTH_IN: f64 = 8.27;
const A4_HEIGHT_IN: f64 = 11.69;

/// Browser-automation capability consumed by the fetch pipeline.
///
/// One implementation drives a real Chromium over CDP; tests substitute an
/// in-memory page.
#[async_trait]
pub trait PageDriver: Send {
    /// Load `url`, giving up after `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Evaluate `script` in the page and return its JSON value (`null` for `undefined`).
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    /// Current serialized page markup.
    async fn content(&mut self) -> Result<String>;

    /// Render the full page as an A4 PDF with backgrounds.
    async fn print_pdf(&mut self) -> Result<Vec<u8>>;

    async fn pause(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn close(&mut self) -> Result<()>;
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Executable names looked up on `PATH`, most preferred first.
const PATH_NAMES: &[&str] = &["google-chrome", "chromium", "chromium-browser", "brave-browser"];

#[cfg(target_os = "macos")]
const INSTALL_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];
#[cfg(target_os = "windows")]
const INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const INSTALL_PATHS: &[&str] = &["/usr/bin/google-chrome", "/usr/bin/chromium"];

/// Find a Chromium-family browser: `CHROME_EXECUTABLE`, then `PATH`, then
/// the platform's usual install locations.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = config::chrome_executable_override() {
        return Some(p);
    }
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    find_on_path(std::env::split_paths(&path_var), PATH_NAMES).or_else(|| {
        INSTALL_PATHS
            .iter()
            .find(|c| Path::new(c).is_file())
            .map(|c| c.to_string())
    })
}

fn find_on_path(dirs: impl IntoIterator<Item = PathBuf>, names: &[&str]) -> Option<String> {
    let dirs: Vec<PathBuf> = dirs.into_iter().collect();
    names.iter().find_map(|name| {
        dirs.iter()
            .map(|dir| dir.join(name))
            .find(|full| full.is_file())
            .map(|full| full.to_string_lossy().into_owned())
    })
}

/// Build a `BrowserConfig` with the configured desktop user agent.
///
/// Headed unless the config asks otherwise, so verification pages can be
/// solved by hand.
pub fn build_browser_config(exe: &str, cfg: &ExtractorConfig) -> Result<BrowserConfig> {
    let (width, height) = (1280, 900);

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", cfg.user_agent()));

    if !cfg.headless() {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── CDP-backed driver ────────────────────────────────────────────────────────

/// One exclusively-owned browser with a single tab.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    closed: bool,
}

impl ChromiumDriver {
    /// Launch the browser and open a blank tab.
    pub async fn launch(exe: &str, cfg: &ExtractorConfig) -> Result<Self> {
        info!("🚀 Launching browser ({})", exe);
        let config = build_browser_config(exe, cfg)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                browser.close().await.ok();
                handler_task.abort();
                return Err(anyhow!("Failed to open tab: {}", e));
            }
        };

        Ok(Self {
            browser,
            page,
            handler_task,
            closed: false,
        })
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(anyhow!("navigation to {} failed: {}", url, e)),
            Err(_) => Err(anyhow!(
                "navigation to {} timed out after {}s",
                url,
                timeout.as_secs()
            )),
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("script evaluation failed: {}", e))?;
        // `undefined` results carry no value.
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&mut self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| anyhow!("Failed to get page content: {}", e))
    }

    async fn print_pdf(&mut self) -> Result<Vec<u8>> {
        let params = PrintToPdfParams::builder()
            .print_background(true)
            .paper_width(A4_WIDTH_IN)
            .paper_height(A4_HEIGHT_IN)
            .build();
        self.page
            .pdf(params)
            .await
            .map_err(|e| anyhow!("PDF generation failed: {}", e))
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("Browser close failed: {}", e));
        self.browser.wait().await.ok();
        self.handler_task.abort();
        info!("🛑 Browser closed");
        result
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        if !self.closed {
            self.handler_task.abort();
        }
    }
}
