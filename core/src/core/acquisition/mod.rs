//! Chart export through a headless browser.
//!
//! The upstream page renders its graph with Highcharts; the export menu offers
//! a client-side PNG download. Everything page-specific (selectors, labels,
//! timeouts) comes from [`AcquisitionSettings`].

use crate::types::AcquisitionSettings;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, SetDownloadBehaviorBehavior,
    SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum AcquisitionError {
        #[error("navigation failed: {0}")]
        Navigation(String),

        #[error("element not found: {0}")]
        ElementNotFound(String),

        #[error("export did not complete within {0:?}")]
        ExportTimeout(std::time::Duration),

        #[error("browser session error: {0}")]
        Session(String),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
    }
}

use error::AcquisitionError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Produces the raw bytes of an exported chart image.
#[async_trait]
pub trait ChartExporter: Send + Sync {
    async fn export(&self, url: &str) -> Result<Vec<u8>, AcquisitionError>;
}

/// Polls `probe` until it yields a value or `timeout` elapses. A probe still
/// pending at the deadline is abandoned.
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, probe()).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(_) => return None,
        }
        if tokio::time::Instant::now() + interval > deadline {
            return None;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Runs one browser step, failing with `class` when it errors or does not
/// finish within `timeout`.
pub async fn bounded<T, E, Fut>(
    timeout: Duration,
    step: &str,
    class: fn(String) -> AcquisitionError,
    fut: Fut,
) -> Result<T, AcquisitionError>
where
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(class(format!("{step}: {e}"))),
        Err(_) => Err(class(format!("{step}: no response within {timeout:?}"))),
    }
}

/// XPath string literal for arbitrary text, including mixed quotes.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('"') {
        return format!("\"{text}\"");
    }
    if !text.contains('\'') {
        return format!("'{text}'");
    }
    let parts: Vec<String> = text
        .split('"')
        .map(|part| format!("\"{part}\""))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}

/// XPath matching the innermost element whose own text contains `text`.
pub fn text_xpath(text: &str) -> String {
    format!("//*[text()[contains(normalize-space(.), {})]]", xpath_literal(text))
}

/// JavaScript expression that is `true` when `selector` matches a rendered,
/// visible element.
pub fn visibility_script(selector: &str) -> String {
    let selector = serde_json::Value::String(selector.to_string());
    format!(
        "(() => {{ const el = document.querySelector({selector}); \
         if (!el) return false; \
         const rect = el.getBoundingClientRect(); \
         const style = window.getComputedStyle(el); \
         return rect.width > 0 && rect.height > 0 \
             && style.visibility !== 'hidden' && style.display !== 'none'; }})()"
    )
}

/// Drives a fresh headless Chromium per export.
pub struct BrowserExporter {
    pub settings: AcquisitionSettings,
}

impl BrowserExporter {
    pub fn new(settings: AcquisitionSettings) -> Self {
        Self { settings }
    }

    async fn drive(
        &self,
        session: &BrowserSession,
        url: &str,
        download_dir: &Path,
    ) -> Result<Vec<u8>, AcquisitionError> {
        let step_timeout = self.settings.step_timeout();
        let browser = &session.browser;

        let page = bounded(
            step_timeout,
            "open page",
            AcquisitionError::Session,
            browser.new_page("about:blank"),
        )
        .await?;
        bounded(
            step_timeout,
            "set user agent",
            AcquisitionError::Session,
            page.set_user_agent(SetUserAgentOverrideParams::new(
                self.settings.user_agent.clone(),
            )),
        )
        .await?;

        let download_behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(download_dir.to_string_lossy())
            .events_enabled(true)
            .build()
            .map_err(AcquisitionError::Session)?;
        bounded(
            step_timeout,
            "set download behavior",
            AcquisitionError::Session,
            browser.execute(download_behavior),
        )
        .await?;
        let mut downloads = bounded(
            step_timeout,
            "listen for downloads",
            AcquisitionError::Session,
            browser.event_listener::<EventDownloadProgress>(),
        )
        .await?;

        info!(url, "Navigating");
        bounded(step_timeout, url, AcquisitionError::Navigation, page.goto(url)).await?;

        self.wait_visible(&page, &self.settings.container_selector)
            .await?;
        info!("Graph container visible");

        let menu_button = self
            .wait_for_css(&page, &self.settings.menu_button_selector)
            .await?;
        tokio::time::sleep(self.settings.settle_delay()).await;
        bounded(
            step_timeout,
            "click export menu",
            AcquisitionError::ElementNotFound,
            menu_button.click(),
        )
        .await?;
        info!("Menu clicked");

        let export_option = self
            .wait_for_text(&page, &self.settings.export_option_text)
            .await?;
        tokio::time::sleep(self.settings.settle_delay()).await;
        info!(option = %self.settings.export_option_text, "Clicking export option");
        bounded(
            step_timeout,
            &self.settings.export_option_text,
            AcquisitionError::ElementNotFound,
            export_option.click(),
        )
        .await?;

        let completed = tokio::time::timeout(step_timeout, async {
            while let Some(event) = downloads.next().await {
                debug!(
                    received = event.received_bytes,
                    total = event.total_bytes,
                    "Download progress"
                );
                match event.state {
                    DownloadProgressState::Completed => return Some(event.guid.clone()),
                    DownloadProgressState::Canceled => return None,
                    DownloadProgressState::InProgress => {}
                }
            }
            None
        })
        .await;
        let guid = match completed {
            Ok(Some(guid)) => guid,
            Ok(None) | Err(_) => return Err(AcquisitionError::ExportTimeout(step_timeout)),
        };

        let path = download_dir.join(&guid);
        info!(path = %path.display(), "Download acquired, loading into memory");
        Ok(tokio::fs::read(&path).await?)
    }

    async fn wait_visible(&self, page: &Page, selector: &str) -> Result<(), AcquisitionError> {
        let script = visibility_script(selector);
        let script = script.as_str();
        poll_until(self.settings.step_timeout(), POLL_INTERVAL, move || async move {
            match page.evaluate(script).await {
                Ok(result) => result.into_value::<bool>().ok().filter(|visible| *visible),
                Err(_) => None,
            }
        })
        .await
        .map(|_| ())
        .ok_or_else(|| AcquisitionError::ElementNotFound(selector.to_string()))
    }

    async fn wait_for_css(&self, page: &Page, selector: &str) -> Result<Element, AcquisitionError> {
        self.wait_visible(page, selector).await?;
        bounded(
            self.settings.step_timeout(),
            selector,
            AcquisitionError::ElementNotFound,
            page.find_element(selector),
        )
        .await
    }

    async fn wait_for_text(&self, page: &Page, text: &str) -> Result<Element, AcquisitionError> {
        let xpath = text_xpath(text);
        let xpath = xpath.as_str();
        poll_until(self.settings.step_timeout(), POLL_INTERVAL, move || async move {
            page.find_xpath(xpath).await.ok()
        })
        .await
        .ok_or_else(|| AcquisitionError::ElementNotFound(text.to_string()))
    }
}

#[async_trait]
impl ChartExporter for BrowserExporter {
    async fn export(&self, url: &str) -> Result<Vec<u8>, AcquisitionError> {
        // Removed with its contents when dropped, whatever the outcome.
        let download_dir = tempfile::Builder::new()
            .prefix("hydrograph-download-")
            .tempdir()?;

        let session = BrowserSession::launch(&self.settings).await?;
        let result = self.drive(&session, url, download_dir.path()).await;
        session.close(self.settings.step_timeout()).await;
        result
    }
}

/// A launched browser and the task pumping its DevTools connection.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(settings: &AcquisitionSettings) -> Result<Self, AcquisitionError> {
        let mut builder = BrowserConfig::builder().request_timeout(settings.step_timeout());
        if let Some(executable) = &settings.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(AcquisitionError::Session)?;

        let (browser, mut handler) = bounded(
            settings.step_timeout(),
            "launch browser",
            AcquisitionError::Session,
            Browser::launch(config),
        )
        .await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                // A single undecodable message does not end the connection.
                if let Err(e) = event {
                    debug!(error = %e, "DevTools handler error");
                    tokio::task::yield_now().await;
                }
            }
        });
        Ok(Self { browser, handler })
    }

    /// Asks the browser to quit, killing it when it does not comply within
    /// `timeout`. Never blocks longer than twice `timeout`.
    async fn close(mut self, timeout: Duration) {
        let closed = match tokio::time::timeout(timeout, self.browser.close()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Browser did not close cleanly");
                false
            }
            Err(_) => {
                warn!(?timeout, "Browser did not answer the close request");
                false
            }
        };
        if !closed {
            self.kill().await;
        }
        match tokio::time::timeout(timeout, self.browser.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Browser process wait failed"),
            Err(_) => {
                warn!("Browser process still running");
                self.kill().await;
            }
        }
        self.handler.abort();
    }

    async fn kill(&mut self) {
        if let Some(Err(e)) = self.browser.kill().await {
            warn!(error = %e, "Failed to kill browser process");
        }
    }
}
