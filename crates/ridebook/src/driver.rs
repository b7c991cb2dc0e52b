//! Browser Automation Interface.
//!
//! The core never talks to a browser directly. Everything it needs from the
//! live document goes through [`AutomationDriver`], so the same resolution,
//! classification and extraction code runs against Chromium over CDP
//! (`chromium::ChromiumDriver`) or against an in-memory document
//! (`mock::MockDriver`).
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  AutomationDriver (async trait)                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐      ┌──────────────────────────┐  │
//! │  │  ChromiumDriver      │      │  MockDriver              │  │
//! │  │  chromiumoxide CDP,  │      │  scraper DOM, page       │  │
//! │  │  page-side JS        │      │  sequences, fault inject │  │
//! │  └──────────────────────┘      └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Calls are issued one at a time and awaited; handles are only valid until
//! the next action that can re-render the page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::locator::Locator;
use crate::result::{RidebookError, RidebookResult};
use crate::wait::{poll_until, LoadState, WaitOptions, DEFAULT_POLL_INTERVAL_MS};

/// Opaque reference to a live DOM node, owned by the driver
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-specific identifier
    pub id: String,
    /// Lower-case tag name
    pub tag_name: String,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, tag_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag_name: tag_name.into().to_ascii_lowercase(),
        }
    }

    /// Whether this is a `<select>` choice control
    #[must_use]
    pub fn is_select(&self) -> bool {
        self.tag_name == "select"
    }
}

/// One option of a choice control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Visible label (trimmed)
    pub label: String,
    /// Underlying value (falls back to the label)
    pub value: String,
}

impl SelectOption {
    /// Create a new option
    #[must_use]
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// How to pick an option in a choice control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectBy {
    /// Visible label equality
    Label(String),
    /// Underlying value equality
    Value(String),
    /// Zero-based option index
    Index(usize),
}

/// Browser launch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Executable path override
    pub executable_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: None,
            executable_path: None,
            sandbox: true,
        }
    }
}

impl DriverConfig {
    /// Create new config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headless mode
    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set viewport dimensions
    #[must_use]
    pub const fn viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set user agent
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn executable_path(mut self, path: impl Into<String>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

/// Sets a control's value and fires the notifications a framework listens to.
fn force_value_script(value: &str) -> String {
    format!(
        "el.value = {value:?}; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
         return el.value;"
    )
}

/// Abstract driver trait for browser automation.
///
/// `evaluate` scripts are function bodies: `el` is bound to the handle's
/// element (or `null`) and the script `return`s a JSON-serialisable value.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Navigate to URL
    async fn navigate(&self, url: &str) -> RidebookResult<()>;

    /// Get current URL
    async fn current_url(&self) -> RidebookResult<String>;

    /// All nodes matching `locator` under `scope` (or the document), in
    /// document order
    async fn query_all(
        &self,
        locator: &Locator,
        scope: Option<&ElementHandle>,
    ) -> RidebookResult<Vec<ElementHandle>>;

    /// Whether the handle still refers to a node in the current document
    async fn is_attached(&self, handle: &ElementHandle) -> RidebookResult<bool>;

    /// Whether the node is rendered
    async fn is_visible(&self, handle: &ElementHandle) -> RidebookResult<bool>;

    /// Whether the node accepts input
    async fn is_enabled(&self, handle: &ElementHandle) -> RidebookResult<bool>;

    /// Text content, `None` when detached
    async fn text_content(&self, handle: &ElementHandle) -> RidebookResult<Option<String>>;

    /// Attribute value
    async fn attribute(&self, handle: &ElementHandle, name: &str)
        -> RidebookResult<Option<String>>;

    /// Current value of a form control
    async fn input_value(&self, handle: &ElementHandle) -> RidebookResult<Option<String>>;

    /// Options of a choice control, in order
    async fn options(&self, handle: &ElementHandle) -> RidebookResult<Vec<SelectOption>>;

    /// Click element
    async fn click(&self, handle: &ElementHandle) -> RidebookResult<()>;

    /// Replace a text control's content
    async fn fill(&self, handle: &ElementHandle, text: &str) -> RidebookResult<()>;

    /// Select an option; `false` when no option matched
    async fn select_option(&self, handle: &ElementHandle, by: &SelectBy) -> RidebookResult<bool>;

    /// Execute JavaScript in page context
    async fn evaluate(
        &self,
        script: &str,
        handle: Option<&ElementHandle>,
    ) -> RidebookResult<serde_json::Value>;

    /// Wait until the page reaches `state`; `false` on timeout
    async fn wait_for_load_state(&self, state: LoadState, timeout_ms: u64)
        -> RidebookResult<bool>;

    /// Write a diagnostic screenshot
    async fn screenshot(&self, path: &Path) -> RidebookResult<()>;

    /// Set the value directly and dispatch synthetic `input`/`change` events
    async fn force_value(&self, handle: &ElementHandle, value: &str) -> RidebookResult<()> {
        self.evaluate(&force_value_script(value), Some(handle))
            .await
            .map(|_| ())
    }

    /// Scroll element into view
    async fn scroll_into_view(&self, handle: &ElementHandle) -> RidebookResult<()> {
        self.evaluate(
            "el.scrollIntoView({ block: 'center' }); return true;",
            Some(handle),
        )
        .await
        .map(|_| ())
    }

    /// Scroll the window to the bottom (triggers infinite-scroll lists)
    async fn scroll_to_bottom(&self) -> RidebookResult<()> {
        self.evaluate(
            "window.scrollTo(0, document.body.scrollHeight); return true;",
            None,
        )
        .await
        .map(|_| ())
    }

    /// Wait for the first attached match of `locator`; `None` on timeout
    async fn wait_for(
        &self,
        locator: &Locator,
        timeout_ms: u64,
    ) -> RidebookResult<Option<ElementHandle>> {
        let options = WaitOptions::new()
            .with_timeout(timeout_ms)
            .with_poll_interval(DEFAULT_POLL_INTERVAL_MS);
        poll_until(options, || async move {
            for handle in self.query_all(locator, None).await? {
                if self.is_attached(&handle).await? {
                    return Ok(Some(handle));
                }
            }
            Ok::<_, RidebookError>(None)
        })
        .await
    }
}
