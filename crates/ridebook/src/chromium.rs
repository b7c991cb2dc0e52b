//! Chromium driver over the DevTools protocol.
//!
//! Element operations run as small scripts in the page. Matched nodes are
//! tagged with a `data-ridebook-handle` attribute whose value carries a
//! per-document nonce, so a handle from a previous document never resolves
//! to a node of the current one.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::page::{Page as CdpPage, ScreenshotParams};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::driver::{AutomationDriver, DriverConfig, ElementHandle, SelectBy, SelectOption};
use crate::locator::Locator;
use crate::result::{RidebookError, RidebookResult};
use crate::wait::{poll_until, LoadState, WaitOptions, NETWORK_IDLE_THRESHOLD_MS};

/// Attribute used to tag matched nodes
const HANDLE_ATTRIBUTE: &str = "data-ridebook-handle";

fn handle_selector(id: &str) -> String {
    format!("[{HANDLE_ATTRIBUTE}={id:?}]")
}

/// Wrap a function body so `el` is bound to the handle's node (or `null`)
fn with_element(script: &str, handle: Option<&ElementHandle>) -> String {
    let el = handle.map_or_else(
        || String::from("null"),
        |h| format!("document.querySelector({:?})", handle_selector(&h.id)),
    );
    format!("(() => {{ const el = {el}; {script} }})()")
}

fn query_script(locator: &Locator, scope: Option<&ElementHandle>) -> String {
    let root = scope.map_or_else(
        || String::from("document"),
        |h| format!("document.querySelector({:?})", handle_selector(&h.id)),
    );
    format!(
        "(() => {{ \
           const root = {root}; \
           if (!root) return []; \
           window.__ridebookDoc = window.__ridebookDoc || Math.random().toString(36).slice(2); \
           window.__ridebookNext = window.__ridebookNext || 0; \
           return {matches}.map(el => {{ \
             if (!el.getAttribute('{HANDLE_ATTRIBUTE}')) {{ \
               el.setAttribute('{HANDLE_ATTRIBUTE}', window.__ridebookDoc + ':' + (++window.__ridebookNext)); \
             }} \
             return {{ id: el.getAttribute('{HANDLE_ATTRIBUTE}'), tag: el.tagName }}; \
           }}); \
         }})()",
        matches = locator.to_query_all("root"),
    )
}

fn select_script(by: &SelectBy) -> String {
    let pick = match by {
        SelectBy::Label(label) => format!("opts.find(o => o.text.trim() === {label:?})"),
        SelectBy::Value(value) => format!("opts.find(o => o.value === {value:?})"),
        SelectBy::Index(index) => format!("opts[{index}]"),
    };
    format!(
        "if (!el || !el.options) return false; \
         const opts = Array.from(el.options); \
         const opt = {pick}; \
         if (!opt) return false; \
         el.value = opt.value; \
         opt.selected = true; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
         return true;"
    )
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    tag: String,
}

/// Driver backed by a real Chromium page
#[derive(Debug)]
pub struct ChromiumDriver {
    config: DriverConfig,
    browser: Mutex<CdpBrowser>,
    page: CdpPage,
    handler: tokio::task::JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page
    pub async fn launch(config: DriverConfig) -> RidebookResult<Self> {
        let mut builder = CdpConfig::builder().window_size(config.viewport_width, config.viewport_height);
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.executable_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder
            .build()
            .map_err(|message| RidebookError::BrowserLaunch { message })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| RidebookError::BrowserLaunch {
                    message: e.to_string(),
                })?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RidebookError::BrowserLaunch {
                message: e.to_string(),
            })?;
        if let Some(ref agent) = config.user_agent {
            page.set_user_agent(agent.as_str())
                .await
                .map_err(|e| RidebookError::driver("set_user_agent", e.to_string()))?;
        }
        info!(headless = config.headless, "chromium launched");
        Ok(Self {
            config,
            browser: Mutex::new(browser),
            page,
            handler,
        })
    }

    /// Launch options in use
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Close the browser
    pub async fn close(self) -> RidebookResult<()> {
        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|e| RidebookError::driver("close", e.to_string()))?;
        self.handler.abort();
        Ok(())
    }

    async fn run(&self, operation: &str, script: String) -> RidebookResult<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| RidebookError::driver(operation, e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn run_on(
        &self,
        operation: &str,
        handle: &ElementHandle,
        body: &str,
    ) -> RidebookResult<Value> {
        self.run(operation, with_element(body, Some(handle))).await
    }

    async fn flag(&self, operation: &str, handle: &ElementHandle, body: &str) -> RidebookResult<bool> {
        Ok(self.run_on(operation, handle, body).await?.as_bool().unwrap_or(false))
    }

    async fn text(
        &self,
        operation: &str,
        handle: &ElementHandle,
        body: &str,
    ) -> RidebookResult<Option<String>> {
        Ok(self
            .run_on(operation, handle, body)
            .await?
            .as_str()
            .map(str::to_string))
    }
}

#[async_trait]
impl AutomationDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> RidebookResult<()> {
        debug!(url, "navigate");
        self.page
            .goto(url)
            .await
            .map_err(|e| RidebookError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> RidebookResult<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| RidebookError::driver("current_url", e.to_string()))?;
        Ok(url.unwrap_or_default())
    }

    async fn query_all(
        &self,
        locator: &Locator,
        scope: Option<&ElementHandle>,
    ) -> RidebookResult<Vec<ElementHandle>> {
        let value = self.run("query_all", query_script(locator, scope)).await?;
        let matches: Vec<QueryMatch> = serde_json::from_value(value)?;
        Ok(matches
            .into_iter()
            .map(|m| ElementHandle::new(m.id, m.tag))
            .collect())
    }

    async fn is_attached(&self, handle: &ElementHandle) -> RidebookResult<bool> {
        self.flag("is_attached", handle, "return el !== null && el.isConnected;")
            .await
    }

    async fn is_visible(&self, handle: &ElementHandle) -> RidebookResult<bool> {
        self.flag(
            "is_visible",
            handle,
            "if (!el) return false; \
             const style = getComputedStyle(el); \
             if (style.display === 'none' || style.visibility === 'hidden') return false; \
             return el.getClientRects().length > 0;",
        )
        .await
    }

    async fn is_enabled(&self, handle: &ElementHandle) -> RidebookResult<bool> {
        self.flag("is_enabled", handle, "return !!el && !el.disabled;")
            .await
    }

    async fn text_content(&self, handle: &ElementHandle) -> RidebookResult<Option<String>> {
        self.text("text_content", handle, "return el ? el.textContent : null;")
            .await
    }

    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> RidebookResult<Option<String>> {
        let body = format!("return el ? el.getAttribute({name:?}) : null;");
        self.text("attribute", handle, &body).await
    }

    async fn input_value(&self, handle: &ElementHandle) -> RidebookResult<Option<String>> {
        self.text(
            "input_value",
            handle,
            "return el && 'value' in el ? String(el.value) : null;",
        )
        .await
    }

    async fn options(&self, handle: &ElementHandle) -> RidebookResult<Vec<SelectOption>> {
        let value = self
            .run_on(
                "options",
                handle,
                "if (!el || !el.options) return []; \
                 return Array.from(el.options).map(o => ({ label: o.text.trim(), value: o.value }));",
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn click(&self, handle: &ElementHandle) -> RidebookResult<()> {
        let element = self
            .page
            .find_element(handle_selector(&handle.id))
            .await
            .map_err(|e| RidebookError::driver("click", e.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| RidebookError::driver("click", e.to_string()))?;
        Ok(())
    }

    async fn fill(&self, handle: &ElementHandle, text: &str) -> RidebookResult<()> {
        self.run_on("fill", handle, "if (el) { el.value = ''; } return true;")
            .await?;
        let element = self
            .page
            .find_element(handle_selector(&handle.id))
            .await
            .map_err(|e| RidebookError::driver("fill", e.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| RidebookError::driver("fill", e.to_string()))?;
        element
            .type_str(text)
            .await
            .map_err(|e| RidebookError::driver("fill", e.to_string()))?;
        Ok(())
    }

    async fn select_option(&self, handle: &ElementHandle, by: &SelectBy) -> RidebookResult<bool> {
        self.flag("select_option", handle, &select_script(by)).await
    }

    async fn evaluate(
        &self,
        script: &str,
        handle: Option<&ElementHandle>,
    ) -> RidebookResult<Value> {
        self.run("evaluate", with_element(script, handle)).await
    }

    async fn wait_for_load_state(
        &self,
        state: LoadState,
        timeout_ms: u64,
    ) -> RidebookResult<bool> {
        let ready = state
            .ready_states()
            .iter()
            .map(|s| format!("{s:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        let script = format!("[{ready}].includes(document.readyState)");
        let options = WaitOptions::new().with_timeout(timeout_ms);
        let script = script.as_str();
        let loaded = poll_until(options, move || async move {
            let value = self.run("wait_for_load_state", script.to_string()).await?;
            Ok::<_, RidebookError>(value.as_bool().unwrap_or(false).then_some(()))
        })
        .await?;
        if loaded.is_none() || state != LoadState::NetworkIdle {
            return Ok(loaded.is_some());
        }
        // idle once the resource count holds for the threshold
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut last = None;
        loop {
            let count = self
                .run(
                    "wait_for_load_state",
                    String::from("performance.getEntriesByType('resource').length"),
                )
                .await?
                .as_u64();
            if last.is_some() && last == count {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            last = count;
            tokio::time::sleep(Duration::from_millis(NETWORK_IDLE_THRESHOLD_MS)).await;
        }
    }

    async fn screenshot(&self, path: &Path) -> RidebookResult<()> {
        let bytes = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| RidebookError::driver("screenshot", e.to_string()))?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}
