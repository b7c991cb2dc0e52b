//! PaginationDriver: harvesting an asynchronously rendered order list.
//!
//! ```text
//!   Loading ──► Scanning ──► Advancing ──► Loading ...
//!      │                         │
//!      └──────────► Done ◄───────┘
//! ```
//!
//! The list may grow on scroll, page through a "next" control, or both. The
//! loop ends when scrolling reveals nothing and no enabled "next" control
//! exists, or when an advance leaves the visible list unchanged. Whether a
//! page contributed retained records plays no part: a page of finished or
//! cancelled orders still leads on to the next one. The iteration ceiling
//! bounds everything else, so a "next" control that is always enabled
//! cannot keep the loop alive past `max_iterations` scans.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use crate::driver::AutomationDriver;
use crate::extractor::{ExtractedRecord, Extraction, FieldExtractor, RecordKey};
use crate::locator::LocatorChain;
use crate::record::RecordStatusClassifier;
use crate::resolver::{Intent, SelectorResolver};
use crate::result::RidebookResult;
use crate::wait::{poll_until, settle, LoadState, WaitOptions, DEFAULT_ELEMENT_TIMEOUT_MS};

/// Default iteration ceiling
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Why pagination stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Nothing left to reveal and no enabled "next" control
    FixedPoint,
    /// An advance left the record list unchanged (a "next" control that does nothing)
    Stalled,
    /// The record container never appeared
    ContainerMissing,
    /// `max_iterations` scans were performed
    IterationCeiling,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FixedPoint => "fixed_point",
            Self::Stalled => "stalled",
            Self::ContainerMissing => "container_missing",
            Self::IterationCeiling => "iteration_ceiling",
        };
        f.write_str(name)
    }
}

/// Pagination state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Waiting for the record container
    Loading,
    /// Classifying and extracting visible records
    Scanning,
    /// Revealing more records
    Advancing,
    /// Finished
    Done(StopReason),
}

/// Insertion-ordered, deduplicated records
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<ExtractedRecord>,
    keys: HashSet<RecordKey>,
}

impl RecordSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; `false` if its key is already present
    pub fn insert(&mut self, record: ExtractedRecord) -> bool {
        if !self.keys.insert(record.key()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in first-seen order
    #[must_use]
    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    /// Take the records
    #[must_use]
    pub fn into_vec(self) -> Vec<ExtractedRecord> {
        self.records
    }
}

impl Extend<ExtractedRecord> for RecordSet {
    fn extend<I: IntoIterator<Item = ExtractedRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

/// Outcome of a scrape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeReport {
    /// Deduplicated records
    pub records: Vec<ExtractedRecord>,
    /// Scans performed
    pub iterations: usize,
    /// Why the loop stopped
    pub stop_reason: StopReason,
}

/// Locator chains that drive pagination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationLocators {
    /// The list container
    pub container: LocatorChain,
    /// Individual records inside the list
    pub records: LocatorChain,
    /// The "next page" control
    pub next: LocatorChain,
}

/// Count and content fingerprint of the visible records
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    count: usize,
    fingerprint: String,
}

/// Drives the Loading/Scanning/Advancing loop
#[derive(Debug)]
pub struct PaginationDriver<'d, D: AutomationDriver + ?Sized> {
    driver: &'d D,
    resolver: SelectorResolver<'d, D>,
    status: RecordStatusClassifier<'d, D>,
    extractor: FieldExtractor<'d, D>,
    locators: PaginationLocators,
    container_timeout_ms: u64,
    settle_ms: u64,
}

impl<'d, D: AutomationDriver + ?Sized> PaginationDriver<'d, D> {
    /// Create a pagination driver
    pub const fn new(
        driver: &'d D,
        locators: PaginationLocators,
        status: RecordStatusClassifier<'d, D>,
        extractor: FieldExtractor<'d, D>,
    ) -> Self {
        Self {
            driver,
            resolver: SelectorResolver::new(driver),
            status,
            extractor,
            locators,
            container_timeout_ms: DEFAULT_ELEMENT_TIMEOUT_MS,
            settle_ms: 500,
        }
    }

    /// How long Loading waits for the container
    #[must_use]
    pub const fn with_container_timeout(mut self, ms: u64) -> Self {
        self.container_timeout_ms = ms;
        self
    }

    /// Pause after scrolling or clicking "next"
    #[must_use]
    pub const fn with_settle_ms(mut self, ms: u64) -> Self {
        self.settle_ms = ms;
        self
    }

    async fn container_present(&self) -> RidebookResult<bool> {
        let options = WaitOptions::new().with_timeout(self.container_timeout_ms);
        let found = poll_until(options, move || {
            self.resolver
                .resolve(&self.locators.container, None, Intent::Read)
        })
        .await?;
        Ok(found.is_some())
    }

    async fn snapshot(&self) -> RidebookResult<Snapshot> {
        let records = self.resolver.resolve_all(&self.locators.records, None).await?;
        let mut hasher = Sha256::new();
        for record in &records {
            let text = self.driver.text_content(record).await?.unwrap_or_default();
            hasher.update(text.as_bytes());
            hasher.update([0u8]);
        }
        Ok(Snapshot {
            count: records.len(),
            fingerprint: format!("{:x}", hasher.finalize()),
        })
    }

    /// Classify and extract every visible record into `results`
    async fn scan(&self, iteration: usize, results: &mut RecordSet) -> RidebookResult<()> {
        let records = self.resolver.resolve_all(&self.locators.records, None).await?;
        let mut added = 0;
        for record in &records {
            let assessment = self.status.assess(record).await?;
            if !assessment.is_retained() {
                continue;
            }
            match self
                .extractor
                .extract(record, assessment.evidence(), iteration)
                .await?
            {
                Extraction::Extracted(extracted) => {
                    if results.insert(extracted) {
                        added += 1;
                    }
                }
                Extraction::MissingDateTime => {}
            }
        }
        info!(iteration, visible = records.len(), added, total = results.len(), "page scanned");
        Ok(())
    }

    /// Scroll, then click "next" if one is enabled.
    ///
    /// Also returns the list snapshot taken before anything was touched.
    async fn advance(&self) -> RidebookResult<(PageState, Snapshot)> {
        let before = self.snapshot().await?;
        self.driver.scroll_to_bottom().await?;
        settle(self.settle_ms).await;
        let revealed = self.snapshot().await?;
        let grew = revealed.count > before.count;
        debug!(before = before.count, after = revealed.count, "scrolled to bottom");

        let next = self
            .resolver
            .resolve(&self.locators.next, None, Intent::Write)
            .await?;
        let Some(next) = next else {
            let state = if grew {
                PageState::Loading
            } else {
                PageState::Done(StopReason::FixedPoint)
            };
            return Ok((state, before));
        };
        self.driver.click(&next).await?;
        self.driver
            .wait_for_load_state(LoadState::DomContentLoaded, self.container_timeout_ms)
            .await?;
        settle(self.settle_ms).await;
        Ok((PageState::Loading, before))
    }

    /// Run until Done and return the accumulated records
    pub async fn scrape_all(&self, max_iterations: usize) -> RidebookResult<ScrapeReport> {
        let mut results = RecordSet::new();
        let mut iterations = 0;
        let mut previous: Option<Snapshot> = None;
        let mut state = PageState::Loading;
        loop {
            debug!(?state, iterations, "pagination step");
            state = match state {
                PageState::Loading if iterations >= max_iterations => {
                    PageState::Done(StopReason::IterationCeiling)
                }
                PageState::Loading => {
                    if self.container_present().await? {
                        PageState::Scanning
                    } else {
                        PageState::Done(StopReason::ContainerMissing)
                    }
                }
                PageState::Scanning => {
                    self.scan(iterations, &mut results).await?;
                    iterations += 1;
                    let unchanged = match &previous {
                        Some(previous) => self.snapshot().await?.fingerprint == previous.fingerprint,
                        None => false,
                    };
                    if unchanged {
                        warn!("advancing left the list unchanged");
                        PageState::Done(StopReason::Stalled)
                    } else {
                        PageState::Advancing
                    }
                }
                PageState::Advancing => {
                    let (next, before) = self.advance().await?;
                    previous = Some(before);
                    next
                }
                PageState::Done(stop_reason) => {
                    info!(%stop_reason, iterations, records = results.len(), "pagination done");
                    return Ok(ScrapeReport {
                        records: results.into_vec(),
                        iterations,
                        stop_reason,
                    });
                }
            };
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::extractor::FieldChains;
    use crate::mock::{MockDriver, MockPage, REVEAL_MARKER};
    use crate::record::StatusKeywords;

    fn locators() -> PaginationLocators {
        PaginationLocators {
            container: LocatorChain::new("container").css("#orders"),
            records: LocatorChain::new("records").css("#orders .order"),
            next: LocatorChain::new("next").text_eq("button", "下一頁"),
        }
    }

    fn scraper(driver: &MockDriver) -> PaginationDriver<'_, MockDriver> {
        let status = RecordStatusClassifier::new(
            driver,
            LocatorChain::new("status").css(".status"),
            LocatorChain::new("evidence").css(".car-no"),
            StatusKeywords::default(),
        );
        let extractor = FieldExtractor::new(
            driver,
            FieldChains {
                date_time: LocatorChain::new("time").css(".time"),
                vehicle_number: LocatorChain::new("car").css(".car-no"),
                driver_info: LocatorChain::new("driver").css(".driver"),
                fee_text: LocatorChain::new("fee").css(".fee"),
            },
        );
        PaginationDriver::new(driver, locators(), status, extractor)
            .with_container_timeout(0)
            .with_settle_ms(0)
    }

    fn order(time: &str, car: &str) -> String {
        format!(
            r#"<div class="order dispatched"><span class="time">{time}</span><span class="car-no">{car}</span><span class="fee">300元</span></div>"#
        )
    }

    fn finished_order(time: &str, car: &str) -> String {
        format!(
            r#"<div class="order finished"><span class="time">{time}</span><span class="car-no">{car}</span><span class="fee">300元</span></div>"#
        )
    }

    fn page(orders: &[String], next: bool) -> String {
        let next = if next {
            r#"<button data-mock-action="next">下一頁</button>"#
        } else {
            r#"<button disabled>下一頁</button>"#
        };
        format!(
            r#"<html><body><div id="orders">{}{REVEAL_MARKER}</div>{next}</body></html>"#,
            orders.concat()
        )
    }

    mod record_set_tests {
        use super::*;

        #[test]
        fn test_dedup_keeps_first_seen() {
            let record = ExtractedRecord {
                date_time: "2025/06/19 08:00".into(),
                vehicle_number: "A".into(),
                driver_info: "B".into(),
                fee_text: "300元".into(),
                source_iteration: 0,
            };
            let mut set = RecordSet::new();
            assert!(set.insert(record.clone()));
            assert!(!set.insert(ExtractedRecord {
                source_iteration: 3,
                ..record
            }));
            assert_eq!(set.len(), 1);
            assert_eq!(set.records()[0].source_iteration, 0);
        }
    }

    mod scrape_tests {
        use super::*;

        #[tokio::test]
        async fn test_pages_until_next_disabled() {
            let driver = MockDriver::with_pages(vec![
                MockPage::new(page(&[order("06/19 08:00", "A-1"), order("06/19 09:00", "A-2")], true)),
                MockPage::new(page(&[order("06/19 09:00", "A-2"), order("06/20 10:00", "A-3")], false)),
            ]);
            let report = scraper(&driver).scrape_all(DEFAULT_MAX_ITERATIONS).await.unwrap();
            assert_eq!(report.stop_reason, StopReason::FixedPoint);
            assert_eq!(report.iterations, 2);
            let cars: Vec<&str> = report.records.iter().map(|r| r.vehicle_number.as_str()).collect();
            assert_eq!(cars, ["A-1", "A-2", "A-3"]);
            assert_eq!(report.records[2].source_iteration, 1);
        }

        #[tokio::test]
        async fn test_page_without_retained_records_does_not_stop() {
            let driver = MockDriver::with_pages(vec![
                MockPage::new(page(&[order("06/19 08:00", "P1")], true)),
                MockPage::new(page(&[finished_order("06/18 08:00", "P2")], true)),
                MockPage::new(page(&[order("06/21 08:00", "P3")], false)),
            ]);
            let report = scraper(&driver).scrape_all(DEFAULT_MAX_ITERATIONS).await.unwrap();
            let cars: Vec<&str> = report.records.iter().map(|r| r.vehicle_number.as_str()).collect();
            assert_eq!(cars, ["P1", "P3"]);
            assert_eq!(report.records[1].source_iteration, 2);
            assert_eq!(report.iterations, 3);
            assert_eq!(report.stop_reason, StopReason::FixedPoint);
            assert_eq!(driver.page_index(), 2);
        }

        #[tokio::test]
        async fn test_scroll_reveal_triggers_rescan() {
            let driver = MockDriver::with_pages(vec![MockPage::new(page(
                &[order("06/19 08:00", "A-1")],
                false,
            ))
            .with_reveal(order("06/19 09:00", "A-2"))]);
            let report = scraper(&driver).scrape_all(DEFAULT_MAX_ITERATIONS).await.unwrap();
            assert_eq!(report.records.len(), 2);
            assert_eq!(report.iterations, 2);
            assert_eq!(report.stop_reason, StopReason::FixedPoint);
        }

        #[tokio::test]
        async fn test_missing_container() {
            let driver = MockDriver::from_html("<html><body><p>系統維護中</p></body></html>");
            let report = scraper(&driver).scrape_all(DEFAULT_MAX_ITERATIONS).await.unwrap();
            assert_eq!(report.stop_reason, StopReason::ContainerMissing);
            assert_eq!(report.iterations, 0);
            assert!(report.records.is_empty());
        }

        #[tokio::test]
        async fn test_noop_next_is_stalled() {
            // last page keeps an enabled next control that does nothing
            let driver = MockDriver::with_pages(vec![MockPage::new(page(
                &[order("06/19 08:00", "A-1")],
                true,
            ))]);
            let report = scraper(&driver).scrape_all(DEFAULT_MAX_ITERATIONS).await.unwrap();
            assert_eq!(report.stop_reason, StopReason::Stalled);
            assert_eq!(report.iterations, 2);
        }

        #[tokio::test]
        async fn test_iteration_ceiling() {
            let pages = (0..6)
                .map(|i| MockPage::new(page(&[order(&format!("06/{i:02} 08:00"), "A")], true)))
                .collect();
            let driver = MockDriver::with_pages(pages);
            let report = scraper(&driver).scrape_all(3).await.unwrap();
            assert_eq!(report.stop_reason, StopReason::IterationCeiling);
            assert_eq!(report.iterations, 3);
            assert_eq!(report.records.len(), 3);
        }

        #[tokio::test]
        async fn test_driver_fault_propagates() {
            let driver = MockDriver::from_html(page(&[order("06/19 08:00", "A-1")], false))
                .fail_on("scroll_to_bottom");
            assert!(scraper(&driver).scrape_all(DEFAULT_MAX_ITERATIONS).await.is_err());
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_terminates_within_ceiling(pages in 1usize..8, max in 0usize..12) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();
                let report = runtime.block_on(async {
                    let pages = (0..pages)
                        .map(|i| MockPage::new(page(&[order(&format!("06/{i:02} 08:00"), "A")], true)))
                        .collect();
                    let driver = MockDriver::with_pages(pages);
                    scraper(&driver).scrape_all(max).await.unwrap()
                });
                prop_assert!(report.iterations <= max);
                prop_assert!(report.records.len() <= report.iterations);
            }
        }
    }
}
