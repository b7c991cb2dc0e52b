//! Dispatch flow: login, open the order list, harvest dispatched orders.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

use super::{FlowContext, FlowError, FlowResult};
use crate::config::RidebookConfig;
use crate::driver::AutomationDriver;
use crate::extractor::{ExtractedRecord, FieldExtractor};
use crate::pagination::{PaginationDriver, ScrapeReport, StopReason};
use crate::record::RecordStatusClassifier;
use crate::result::RidebookResult;
use crate::wait::LoadState;

/// Result of a dispatch scrape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOutcome {
    /// The order list was reached and paginated
    pub success: bool,
    /// Dispatched orders, deduplicated, in first-seen order
    pub records: Vec<ExtractedRecord>,
    /// Pagination scans performed
    pub iterations: usize,
    /// Why pagination stopped, when it ran
    pub stop_reason: Option<StopReason>,
    /// Step that stopped the flow, with the reason
    pub failed_step: Option<String>,
    /// Diagnostic screenshots written during the run
    pub screenshots: Vec<PathBuf>,
}

impl ScrapeOutcome {
    fn failed(step: String) -> Self {
        Self {
            success: false,
            records: Vec::new(),
            iterations: 0,
            stop_reason: None,
            failed_step: Some(step),
            screenshots: Vec::new(),
        }
    }

    fn from_report(report: ScrapeReport) -> Self {
        let success = report.stop_reason != StopReason::ContainerMissing;
        Self {
            success,
            records: report.records,
            iterations: report.iterations,
            stop_reason: Some(report.stop_reason),
            failed_step: (!success).then(|| String::from("orders: list container not found")),
            screenshots: Vec::new(),
        }
    }
}

impl<D: AutomationDriver + ?Sized> FlowContext<'_, D> {
    /// Paginate whatever order list the page currently shows
    async fn paginate(&self) -> RidebookResult<ScrapeReport> {
        let config = self.config;
        let locators = &config.locators;
        let status = RecordStatusClassifier::new(
            self.driver,
            locators.status_markers.clone(),
            locators.evidence.clone(),
            config.scrape.status_keywords.clone(),
        );
        let extractor = FieldExtractor::new(self.driver, locators.fields.clone());
        PaginationDriver::new(self.driver, locators.pagination.clone(), status, extractor)
            .with_container_timeout(config.timeouts.element_ms)
            .with_settle_ms(config.timeouts.settle_ms)
            .scrape_all(config.scrape.max_iterations)
            .await
    }

    async fn open_orders(&mut self) -> FlowResult<()> {
        let config = self.config;
        self.login().await?;
        match &config.site.orders_url {
            Some(url) => {
                self.driver.navigate(url).await?;
                self.driver
                    .wait_for_load_state(LoadState::Load, config.timeouts.navigation_ms)
                    .await?;
            }
            None => {
                self.click("orders", &config.locators.order_list_entry).await?;
                self.wait_idle().await?;
            }
        }
        self.checkpoint("orders").await;
        Ok(())
    }
}

/// Log in, open the order list and collect dispatched orders.
///
/// Markup drift yields `success = false` with whatever was collected; only
/// driver faults and missing credentials are errors.
#[instrument(skip_all, fields(site = %config.site.base_url))]
pub async fn scrape_dispatched_orders<D: AutomationDriver + ?Sized>(
    driver: &D,
    config: &RidebookConfig,
) -> RidebookResult<ScrapeOutcome> {
    let mut ctx = FlowContext::new(driver, config);
    let mut outcome = match ctx.open_orders().await {
        Ok(()) => ScrapeOutcome::from_report(ctx.paginate().await?),
        Err(FlowError::Step { step, reason }) => {
            warn!(step, %reason, "could not reach the order list");
            ctx.checkpoint("failed").await;
            ScrapeOutcome::failed(format!("{step}: {reason}"))
        }
        Err(FlowError::Driver(error)) => return Err(error),
    };
    info!(
        success = outcome.success,
        records = outcome.records.len(),
        "dispatch scrape finished"
    );
    outcome.screenshots = ctx.screenshots;
    Ok(outcome)
}

/// Collect dispatched orders from the document already loaded in `driver`,
/// skipping login and navigation (offline replay of a saved page).
pub async fn scrape_loaded_orders<D: AutomationDriver + ?Sized>(
    driver: &D,
    config: &RidebookConfig,
) -> RidebookResult<ScrapeOutcome> {
    let ctx = FlowContext::new(driver, config);
    let outcome = ScrapeOutcome::from_report(ctx.paginate().await?);
    info!(records = outcome.records.len(), "loaded page scraped");
    Ok(outcome)
}
