//! Ridebook: resilient automation of an undocumented booking SPA
//!
//! The booking site publishes no API and changes its markup without notice.
//! Ridebook drives it through a browser and keeps every "what to try"
//! decision in data: ordered locator chains, content predicates and
//! keyword tables. The loops that consume them stay fixed.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     RIDEBOOK Architecture                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌────────────┐   ┌────────────┐  ┌───────────┐  │
//! │  │ Locator   │──►│ Selector   │──►│ Content    │─►│ Selection │  │
//! │  │ chains    │   │ resolver   │   │ classifier │  │ committer │  │
//! │  └───────────┘   └────────────┘   └────────────┘  └───────────┘  │
//! │        │               │                                         │
//! │        ▼               ▼                                         │
//! │  ┌───────────┐   ┌────────────┐   ┌────────────┐                 │
//! │  │ Record    │──►│ Field      │──►│ Pagination │                 │
//! │  │ status    │   │ extractor  │   │ driver     │                 │
//! │  └───────────┘   └────────────┘   └────────────┘                 │
//! │                                                                  │
//! │  AutomationDriver: ChromiumDriver (CDP) │ MockDriver (fixtures)  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod result;

/// Locators, locator chains and their evaluation
pub mod locator;

/// Timeouts, load states and polling
pub mod wait;

/// The automation seam every component talks through
pub mod driver;

/// In-memory driver over HTML fixtures
#[allow(clippy::missing_errors_doc)]
pub mod mock;

/// First-match resolution of locator chains
pub mod resolver;

/// Role assignment for unlabeled choice controls
pub mod classifier;

/// Verified value commits with strategy fallback
pub mod committer;

/// Dispatch status of a listed order
pub mod record;

/// Field extraction from a retained record
pub mod extractor;

/// Pagination to a fixed point
pub mod pagination;

/// Locator tables for the booking site
pub mod site;

/// Configuration
pub mod config;

/// End-to-end reservation and dispatch flows
pub mod flow;

/// Chromium driver over the DevTools protocol
#[cfg(feature = "browser")]
pub mod chromium;

pub use classifier::{
    Candidate, ClaimedRoles, Classification, ClassifierProfile, ContentClassifier, Role,
};
pub use committer::{CommitOutcome, SelectionCommitter, Strategy};
pub use config::{
    Credentials, DiagnosticsConfig, QuestionAnswer, ReservationConfig, RidebookConfig,
    ScrapeConfig, SiteConfig, TimeoutConfig,
};
pub use driver::{AutomationDriver, DriverConfig, ElementHandle, SelectBy, SelectOption};
pub use extractor::{ExtractedRecord, Extraction, FieldChains, FieldExtractor, FIELD_NOT_FOUND};
pub use flow::{
    run_reservation_flow, scrape_dispatched_orders, scrape_loaded_orders, ReservationOutcome,
    ScrapeOutcome,
};
pub use locator::{AttrOp, Locator, LocatorChain};
pub use mock::MockDriver;
pub use pagination::{PageState, PaginationDriver, PaginationLocators, ScrapeReport, StopReason};
pub use record::{Assessment, RecordState, RecordStatusClassifier, Retention, StatusFlags, StatusKeywords};
pub use resolver::{Intent, SelectorResolver};
pub use result::{RidebookError, RidebookResult};
pub use site::SiteLocators;
pub use wait::{LoadState, WaitOptions};

#[cfg(feature = "browser")]
pub use chromium::ChromiumDriver;
