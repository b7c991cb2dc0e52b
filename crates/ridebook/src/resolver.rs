//! SelectorResolver: first-match-wins evaluation of locator chains.
//!
//! A locator succeeds when its *first* match is attached, visible and, when
//! resolving for write, enabled. The chain stops at the first success even if
//! a later locator would have been "more correct". Not finding anything is a
//! normal outcome (`Ok(None)`); only malformed locators and driver faults are
//! errors.

use tracing::debug;

use crate::driver::{AutomationDriver, ElementHandle};
use crate::locator::LocatorChain;
use crate::result::RidebookResult;

/// What the caller intends to do with the resolved element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Read text or attributes
    Read,
    /// Click, fill or select; the element must also be enabled
    Write,
}

/// Resolves locator chains against the live document
#[derive(Debug)]
pub struct SelectorResolver<'d, D: AutomationDriver + ?Sized> {
    driver: &'d D,
}

impl<'d, D: AutomationDriver + ?Sized> SelectorResolver<'d, D> {
    /// Create a resolver over `driver`
    pub const fn new(driver: &'d D) -> Self {
        Self { driver }
    }

    /// The underlying driver
    pub const fn driver(&self) -> &'d D {
        self.driver
    }

    async fn usable(&self, handle: &ElementHandle, intent: Intent) -> RidebookResult<bool> {
        if !self.driver.is_attached(handle).await? || !self.driver.is_visible(handle).await? {
            return Ok(false);
        }
        match intent {
            Intent::Read => Ok(true),
            Intent::Write => self.driver.is_enabled(handle).await,
        }
    }

    /// Resolve `chain` under `scope` (or the document root).
    pub async fn resolve(
        &self,
        chain: &LocatorChain,
        scope: Option<&ElementHandle>,
        intent: Intent,
    ) -> RidebookResult<Option<ElementHandle>> {
        chain.validate()?;
        for locator in chain.locators() {
            let matches = self.driver.query_all(locator, scope).await?;
            let Some(first) = matches.into_iter().next() else {
                debug!(chain = chain.name(), %locator, "no match");
                continue;
            };
            if self.usable(&first, intent).await? {
                debug!(chain = chain.name(), %locator, id = %first.id, "resolved");
                return Ok(Some(first));
            }
            debug!(chain = chain.name(), %locator, "first match not usable");
        }
        Ok(None)
    }

    /// Resolve the first locator whose first usable match has text accepted
    /// by `accept`. Rejected text counts as a non-match and the chain moves on.
    pub async fn resolve_text<F>(
        &self,
        chain: &LocatorChain,
        scope: Option<&ElementHandle>,
        accept: F,
    ) -> RidebookResult<Option<(ElementHandle, String)>>
    where
        F: Fn(&str) -> bool + Send + Sync,
    {
        chain.validate()?;
        for locator in chain.locators() {
            let matches = self.driver.query_all(locator, scope).await?;
            let Some(first) = matches.into_iter().next() else {
                continue;
            };
            if !self.usable(&first, Intent::Read).await? {
                continue;
            }
            let text = self
                .driver
                .text_content(&first)
                .await?
                .map(|t| t.trim().to_string())
                .unwrap_or_default();
            if !text.is_empty() && accept(&text) {
                return Ok(Some((first, text)));
            }
            debug!(chain = chain.name(), %locator, %text, "text rejected");
        }
        Ok(None)
    }

    /// Every attached, visible match of the first locator that yields any,
    /// in document order. Used to enumerate records and candidate controls.
    pub async fn resolve_all(
        &self,
        chain: &LocatorChain,
        scope: Option<&ElementHandle>,
    ) -> RidebookResult<Vec<ElementHandle>> {
        chain.validate()?;
        for locator in chain.locators() {
            let mut usable = Vec::new();
            for handle in self.driver.query_all(locator, scope).await? {
                if self.usable(&handle, Intent::Read).await? {
                    usable.push(handle);
                }
            }
            if !usable.is_empty() {
                debug!(chain = chain.name(), %locator, count = usable.len(), "enumerated");
                return Ok(usable);
            }
        }
        Ok(Vec::new())
    }
}
