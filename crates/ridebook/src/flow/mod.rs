//! The two end-to-end flows and the plumbing they share.
//!
//! Both flows separate two kinds of failure. Markup drift (a button that is
//! not there, a value that will not stick) ends the flow with
//! `success = false`. A driver fault is returned as `Err`.

mod dispatch;
mod reservation;

pub use dispatch::{scrape_dispatched_orders, scrape_loaded_orders, ScrapeOutcome};
pub use reservation::{run_reservation_flow, ReservationOutcome};

use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::committer::{CommitOutcome, SelectionCommitter};
use crate::config::RidebookConfig;
use crate::driver::{AutomationDriver, ElementHandle};
use crate::locator::LocatorChain;
use crate::resolver::{Intent, SelectorResolver};
use crate::result::{RidebookError, RidebookResult};
use crate::wait::{poll_until, settle, LoadState, WaitOptions};

/// Optional elements get a shorter wait than required ones
const OPTIONAL_WAIT_MS: u64 = 2_000;

/// Why a flow stopped short
#[derive(Debug)]
enum FlowError {
    /// The driver faulted; propagated to the caller
    Driver(RidebookError),
    /// Expected markup was missing or a value would not stick
    Step {
        step: &'static str,
        reason: String,
    },
}

impl From<RidebookError> for FlowError {
    fn from(error: RidebookError) -> Self {
        Self::Driver(error)
    }
}

impl FlowError {
    fn step(step: &'static str, reason: impl Into<String>) -> Self {
        Self::Step {
            step,
            reason: reason.into(),
        }
    }
}

type FlowResult<T> = Result<T, FlowError>;

/// Driver, config and per-run diagnostics
struct FlowContext<'d, D: AutomationDriver + ?Sized> {
    driver: &'d D,
    config: &'d RidebookConfig,
    resolver: SelectorResolver<'d, D>,
    committer: SelectionCommitter<'d, D>,
    step: usize,
    screenshots: Vec<PathBuf>,
}

impl<'d, D: AutomationDriver + ?Sized> FlowContext<'d, D> {
    fn new(driver: &'d D, config: &'d RidebookConfig) -> Self {
        Self {
            driver,
            config,
            resolver: SelectorResolver::new(driver),
            committer: SelectionCommitter::new(driver).with_settle_ms(config.timeouts.settle_ms),
            step: 0,
            screenshots: Vec::new(),
        }
    }

    /// Poll for `chain` for up to `timeout_ms`
    async fn find_within(
        &self,
        chain: &LocatorChain,
        intent: Intent,
        timeout_ms: u64,
    ) -> RidebookResult<Option<ElementHandle>> {
        let options = WaitOptions::new().with_timeout(timeout_ms);
        poll_until(options, move || self.resolver.resolve(chain, None, intent)).await
    }

    /// Poll for a required element
    async fn find(&self, chain: &LocatorChain, intent: Intent) -> RidebookResult<Option<ElementHandle>> {
        self.find_within(chain, intent, self.config.timeouts.element_ms)
            .await
    }

    /// Click a required element
    async fn click(&self, step: &'static str, chain: &LocatorChain) -> FlowResult<()> {
        let Some(target) = self.find(chain, Intent::Write).await? else {
            return Err(FlowError::step(step, format!("'{}' not found", chain.name())));
        };
        self.driver.scroll_into_view(&target).await?;
        self.driver.click(&target).await?;
        settle(self.config.timeouts.settle_ms).await;
        Ok(())
    }

    /// Click an element if it shows up; `false` when it did not
    async fn click_optional(&self, chain: &LocatorChain) -> RidebookResult<bool> {
        let timeout = OPTIONAL_WAIT_MS.min(self.config.timeouts.element_ms);
        let Some(target) = self.find_within(chain, Intent::Write, timeout).await? else {
            debug!(chain = chain.name(), "optional element absent");
            return Ok(false);
        };
        self.driver.click(&target).await?;
        settle(self.config.timeouts.settle_ms).await;
        Ok(true)
    }

    /// Type into a required text control
    async fn fill(&self, step: &'static str, chain: &LocatorChain, text: &str) -> FlowResult<()> {
        let Some(target) = self.find(chain, Intent::Write).await? else {
            return Err(FlowError::step(step, format!("'{}' not found", chain.name())));
        };
        match self.committer.commit(&target, text, None).await? {
            CommitOutcome::Committed(_) => Ok(()),
            CommitOutcome::Failed => Err(FlowError::step(
                step,
                format!("'{}' did not accept input", chain.name()),
            )),
        }
    }

    /// Wait for the network to quiet down; a timeout is not an error
    async fn wait_idle(&self) -> RidebookResult<()> {
        if !self
            .driver
            .wait_for_load_state(LoadState::NetworkIdle, self.config.timeouts.navigation_ms)
            .await?
        {
            debug!("network did not go idle before timeout");
        }
        Ok(())
    }

    /// Write a diagnostic screenshot when a directory is configured
    async fn checkpoint(&mut self, name: &str) {
        self.step += 1;
        let config = self.config;
        let Some(dir) = config.diagnostics.screenshot_dir.as_ref() else {
            return;
        };
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{stamp}_{:02}_{name}.png", self.step));
        if let Err(error) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), %error, "cannot create screenshot directory");
            return;
        }
        match self.driver.screenshot(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "screenshot saved");
                self.screenshots.push(path);
            }
            Err(error) => warn!(%error, name, "screenshot failed"),
        }
    }

    /// Open the site, dismiss the notice and log in
    async fn login(&mut self) -> FlowResult<()> {
        let config = self.config;
        let credentials = &config.credentials;
        if !credentials.is_complete() {
            return Err(RidebookError::config("credentials (id and password) are required").into());
        }
        let locators = &config.locators;
        self.driver.navigate(&config.site.base_url).await?;
        self.driver
            .wait_for_load_state(LoadState::Load, config.timeouts.navigation_ms)
            .await?;
        if self.click_optional(&locators.notice_dismiss).await? {
            info!("notice dismissed");
        }
        self.checkpoint("landing").await;

        self.fill("login", &locators.id_input, &credentials.id).await?;
        self.fill("login", &locators.password_input, &credentials.password)
            .await?;
        self.click("login", &locators.login_submit).await?;
        self.wait_idle().await?;
        self.click_optional(&locators.login_confirm).await?;
        info!("logged in");
        self.checkpoint("login").await;
        Ok(())
    }
}
