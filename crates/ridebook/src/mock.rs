//! In-memory driver for tests and offline replay.
//!
//! [`MockDriver`] holds a sequence of HTML pages and evaluates locators with
//! `scraper`. The document is re-parsed on every call, which keeps the driver
//! `Send + Sync` and mirrors how the real page is re-rendered underneath us.
//!
//! A handful of `data-mock-*` attributes script page behaviour:
//!
//! | attribute | effect |
//! |---|---|
//! | `data-mock-action="next"` | clicking advances to the next page (no-op on the last) |
//! | `data-mock-ignore="label value index fill"` | listed commit strategies silently do nothing |
//!
//! A `<!--reveal-->` comment marks where scroll-revealed chunks are inserted.
//!
//! Handles are `g{generation}:{path}`; every navigation, page change or
//! reveal bumps the generation so stale handles read as detached.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::driver::{AutomationDriver, ElementHandle, SelectBy, SelectOption};
use crate::locator::{Locator, TextMode};
use crate::result::{RidebookError, RidebookResult};
use crate::wait::LoadState;

/// Marker replaced by revealed chunks
pub const REVEAL_MARKER: &str = "<!--reveal-->";

/// One page of the scripted document sequence
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    html: String,
    reveals: Vec<String>,
}

impl MockPage {
    /// Create a page from HTML
    #[must_use]
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            reveals: Vec::new(),
        }
    }

    /// Add a chunk revealed by the next scroll-to-bottom
    #[must_use]
    pub fn with_reveal(mut self, chunk: impl Into<String>) -> Self {
        self.reveals.push(chunk.into());
        self
    }
}

#[derive(Debug, Default)]
struct MockState {
    pages: Vec<MockPage>,
    page_index: usize,
    revealed: usize,
    generation: u64,
    values: HashMap<String, String>,
    url: String,
    history: Vec<String>,
    failing_operations: HashSet<String>,
    failing_queries: HashSet<String>,
}

impl MockState {
    fn document(&self) -> String {
        let Some(page) = self.pages.get(self.page_index) else {
            return String::from("<html><body></body></html>");
        };
        let chunks = page.reveals[..self.revealed.min(page.reveals.len())].concat();
        if page.html.contains(REVEAL_MARKER) {
            page.html
                .replacen(REVEAL_MARKER, &format!("{chunks}{REVEAL_MARKER}"), 1)
        } else {
            page.html.clone()
        }
    }

    fn parse(&self) -> Html {
        Html::parse_document(&self.document())
    }

    fn check(&mut self, operation: &str) -> RidebookResult<()> {
        self.history.push(operation.to_string());
        if self.failing_operations.contains(operation) {
            return Err(RidebookError::driver(operation, "injected fault"));
        }
        Ok(())
    }

    fn restructure(&mut self) {
        self.generation += 1;
    }

    fn path_of<'a>(&self, handle: &'a ElementHandle) -> Option<&'a str> {
        let (generation, path) = handle.id.split_once(':')?;
        (generation.strip_prefix('g')?.parse::<u64>().ok()? == self.generation).then_some(path)
    }

    fn handle_for(&self, el: ElementRef<'_>) -> ElementHandle {
        ElementHandle::new(
            format!("g{}:{}", self.generation, node_path(el)),
            el.value().name(),
        )
    }
}

/// Path of element-child indices from the document root
fn node_path(el: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    let mut node = *el;
    while let Some(parent) = node.parent() {
        let index = parent
            .children()
            .filter(|c| c.value().is_element())
            .position(|c| c.id() == node.id())
            .unwrap_or(0);
        parts.push(index.to_string());
        node = parent;
    }
    parts.reverse();
    parts.join(".")
}

fn find_path<'a>(doc: &'a Html, path: &str) -> Option<ElementRef<'a>> {
    let mut node = doc.tree.root();
    if !path.is_empty() {
        for part in path.split('.') {
            let index: usize = part.parse().ok()?;
            node = node
                .children()
                .filter(|c| c.value().is_element())
                .nth(index)?;
        }
    }
    ElementRef::wrap(node)
}

fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn hides(el: ElementRef<'_>) -> bool {
    let value = el.value();
    if value.attr("hidden").is_some() {
        return true;
    }
    if value.name() == "input" && value.attr("type") == Some("hidden") {
        return true;
    }
    value.attr("style").is_some_and(|style| {
        let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        style.contains("display:none") || style.contains("visibility:hidden")
    })
}

fn ignores(el: ElementRef<'_>, strategy: &str) -> bool {
    el.value()
        .attr("data-mock-ignore")
        .is_some_and(|list| list.split_whitespace().any(|s| s == strategy))
}

fn options_of(el: ElementRef<'_>) -> Vec<(ElementRef<'_>, SelectOption)> {
    let Ok(selector) = Selector::parse("option") else {
        return Vec::new();
    };
    el.select(&selector)
        .map(|opt| {
            let label = collapsed_text(opt);
            let value = opt
                .value()
                .attr("value")
                .map_or_else(|| label.clone(), str::to_string);
            (opt, SelectOption::new(label, value))
        })
        .collect()
}

/// Scripted in-memory driver
#[derive(Debug, Default)]
pub struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    /// Create a driver showing a single HTML document
    #[must_use]
    pub fn from_html(html: impl Into<String>) -> Self {
        Self::with_pages(vec![MockPage::new(html)])
    }

    /// Create a driver over a page sequence
    #[must_use]
    pub fn with_pages(pages: Vec<MockPage>) -> Self {
        Self {
            state: Mutex::new(MockState {
                pages,
                url: String::from("about:blank"),
                ..MockState::default()
            }),
        }
    }

    /// Make every call of `operation` fail with a driver fault
    #[must_use]
    pub fn fail_on(self, operation: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failing_operations.insert(operation.to_string());
        }
        self
    }

    /// Make `query_all` fail for locators whose base CSS is `css`
    #[must_use]
    pub fn fail_query(self, css: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failing_queries.insert(css.to_string());
        }
        self
    }

    /// Recorded calls, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// Number of recorded calls starting with `prefix`
    #[must_use]
    pub fn call_count(&self, prefix: &str) -> usize {
        self.history()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.call_count(prefix) > 0
    }

    /// Index of the page currently shown
    #[must_use]
    pub fn page_index(&self) -> usize {
        self.state.lock().map(|s| s.page_index).unwrap_or(0)
    }

    fn state(&self) -> RidebookResult<MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| RidebookError::driver("mock", "state lock poisoned"))
    }

    fn with_element<T>(
        &self,
        operation: &str,
        handle: &ElementHandle,
        f: impl FnOnce(&mut MockState, Option<ElementRef<'_>>) -> T,
    ) -> RidebookResult<T> {
        let mut state = self.state()?;
        state.check(operation)?;
        let doc = state.parse();
        let el = state
            .path_of(handle)
            .and_then(|path| find_path(&doc, path))
            .filter(|el| el.value().name() == handle.tag_name);
        Ok(f(&mut *state, el))
    }
}

#[async_trait]
impl AutomationDriver for MockDriver {
    async fn navigate(&self, url: &str) -> RidebookResult<()> {
        let mut state = self.state()?;
        state.check("navigate")?;
        state.url = url.to_string();
        state.page_index = 0;
        state.revealed = 0;
        state.values.clear();
        state.restructure();
        Ok(())
    }

    async fn current_url(&self) -> RidebookResult<String> {
        let mut state = self.state()?;
        state.check("current_url")?;
        Ok(state.url.clone())
    }

    async fn query_all(
        &self,
        locator: &Locator,
        scope: Option<&ElementHandle>,
    ) -> RidebookResult<Vec<ElementHandle>> {
        let mut state = self.state()?;
        state.check("query_all")?;
        let css = locator.base_css();
        if state.failing_queries.contains(&css) {
            return Err(RidebookError::driver("query_all", format!("injected fault on {css}")));
        }
        let selector = Selector::parse(&css)
            .map_err(|e| RidebookError::invalid_locator(css.clone(), e.to_string()))?;
        let doc = state.parse();
        let matches: Vec<ElementRef<'_>> = match scope {
            Some(scope) => match state.path_of(scope).and_then(|p| find_path(&doc, p)) {
                // descendants only, like `querySelectorAll` on an element
                Some(root) => root.select(&selector).filter(|el| el.id() != root.id()).collect(),
                None => Vec::new(),
            },
            None => doc.select(&selector).collect(),
        };
        Ok(matches
            .into_iter()
            .filter(|el| match locator.text_rule() {
                None => true,
                Some((needle, TextMode::Exact)) => collapsed_text(*el) == needle,
                Some((needle, TextMode::Contains)) => collapsed_text(*el).contains(needle),
            })
            .map(|el| state.handle_for(el))
            .collect())
    }

    async fn is_attached(&self, handle: &ElementHandle) -> RidebookResult<bool> {
        self.with_element("is_attached", handle, |_, el| el.is_some())
    }

    async fn is_visible(&self, handle: &ElementHandle) -> RidebookResult<bool> {
        self.with_element("is_visible", handle, |_, el| {
            el.is_some_and(|el| {
                !hides(el) && !el.ancestors().filter_map(ElementRef::wrap).any(hides)
            })
        })
    }

    async fn is_enabled(&self, handle: &ElementHandle) -> RidebookResult<bool> {
        self.with_element("is_enabled", handle, |_, el| {
            el.is_some_and(|el| {
                el.value().attr("disabled").is_none()
                    && el.value().attr("aria-disabled") != Some("true")
            })
        })
    }

    async fn text_content(&self, handle: &ElementHandle) -> RidebookResult<Option<String>> {
        self.with_element("text_content", handle, |_, el| el.map(collapsed_text))
    }

    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> RidebookResult<Option<String>> {
        self.with_element("attribute", handle, |_, el| {
            el.and_then(|el| el.value().attr(name).map(str::to_string))
        })
    }

    async fn input_value(&self, handle: &ElementHandle) -> RidebookResult<Option<String>> {
        self.with_element("input_value", handle, |state, el| {
            let el = el?;
            let path = node_path(el);
            if let Some(value) = state.values.get(&path) {
                return Some(value.clone());
            }
            match el.value().name() {
                "select" => {
                    let options = options_of(el);
                    options
                        .iter()
                        .find(|(opt, _)| opt.value().attr("selected").is_some())
                        .or_else(|| options.first())
                        .map(|(_, opt)| opt.value.clone())
                }
                "input" => Some(el.value().attr("value").unwrap_or_default().to_string()),
                "textarea" => Some(collapsed_text(el)),
                _ => None,
            }
        })
    }

    async fn options(&self, handle: &ElementHandle) -> RidebookResult<Vec<SelectOption>> {
        self.with_element("options", handle, |_, el| {
            el.map(|el| options_of(el).into_iter().map(|(_, o)| o).collect())
                .unwrap_or_default()
        })
    }

    async fn click(&self, handle: &ElementHandle) -> RidebookResult<()> {
        self.with_element("click", handle, |state, el| {
            let Some(el) = el else { return };
            if el.value().attr("disabled").is_some() {
                return;
            }
            if el.value().name() == "option" {
                let select = el
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .find(|a| a.value().name() == "select");
                if let Some(select) = select {
                    let label = collapsed_text(el);
                    let value = el.value().attr("value").map_or(label, str::to_string);
                    state.values.insert(node_path(select), value);
                }
                return;
            }
            let advances = std::iter::once(el)
                .chain(el.ancestors().filter_map(ElementRef::wrap))
                .any(|e| e.value().attr("data-mock-action") == Some("next"));
            if advances && state.page_index + 1 < state.pages.len() {
                state.page_index += 1;
                state.revealed = 0;
                state.values.clear();
                state.restructure();
            }
        })
    }

    async fn fill(&self, handle: &ElementHandle, text: &str) -> RidebookResult<()> {
        self.with_element("fill", handle, |state, el| {
            if let Some(el) = el {
                if !ignores(el, "fill") && el.value().attr("disabled").is_none() {
                    state.values.insert(node_path(el), text.to_string());
                }
            }
        })
    }

    async fn select_option(&self, handle: &ElementHandle, by: &SelectBy) -> RidebookResult<bool> {
        self.with_element("select_option", handle, |state, el| {
            let Some(el) = el.filter(|el| el.value().name() == "select") else {
                return false;
            };
            let options = options_of(el);
            let (strategy, chosen) = match by {
                SelectBy::Label(label) => ("label", options.iter().find(|(_, o)| &o.label == label)),
                SelectBy::Value(value) => ("value", options.iter().find(|(_, o)| &o.value == value)),
                SelectBy::Index(index) => ("index", options.get(*index)),
            };
            let Some((_, option)) = chosen else {
                return false;
            };
            if !ignores(el, strategy) {
                state.values.insert(node_path(el), option.value.clone());
            }
            true
        })
    }

    async fn force_value(&self, handle: &ElementHandle, value: &str) -> RidebookResult<()> {
        self.with_element("force_value", handle, |state, el| {
            if let Some(el) = el {
                if !ignores(el, "force") {
                    state.values.insert(node_path(el), value.to_string());
                }
            }
        })
    }

    async fn scroll_into_view(&self, handle: &ElementHandle) -> RidebookResult<()> {
        self.with_element("scroll_into_view", handle, |_, _| ())
    }

    async fn scroll_to_bottom(&self) -> RidebookResult<()> {
        let mut state = self.state()?;
        state.check("scroll_to_bottom")?;
        let available = state
            .pages
            .get(state.page_index)
            .map_or(0, |p| p.reveals.len());
        if state.revealed < available {
            state.revealed += 1;
            state.restructure();
        }
        Ok(())
    }

    async fn evaluate(
        &self,
        _script: &str,
        _handle: Option<&ElementHandle>,
    ) -> RidebookResult<serde_json::Value> {
        let mut state = self.state()?;
        state.check("evaluate")?;
        Ok(serde_json::Value::Null)
    }

    async fn wait_for_load_state(
        &self,
        state: LoadState,
        _timeout_ms: u64,
    ) -> RidebookResult<bool> {
        let mut guard = self.state()?;
        guard.check(&format!("wait_for_load_state:{state}"))?;
        Ok(true)
    }

    async fn screenshot(&self, path: &Path) -> RidebookResult<()> {
        let document = {
            let mut state = self.state()?;
            state.check("screenshot")?;
            state.document()
        };
        std::fs::write(path, document)?;
        Ok(())
    }
}
