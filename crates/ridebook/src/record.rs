//! RecordStatusClassifier: lifecycle state of an order record.
//!
//! Status comes from structural tokens (class names) on the record and on
//! its status-badge descendants, plus the badge text. The decision table in
//! [`RecordState::from_flags`] is evaluated top to bottom.
//!
//! Only `Dispatched` and corroborated `RecentUnclassified` records are kept.
//! Corroboration fails open: if the subtree query itself faults, the record
//! is retained. Losing a dispatched order is worse than reporting an extra one.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::driver::{AutomationDriver, ElementHandle};
use crate::locator::LocatorChain;
use crate::resolver::SelectorResolver;
use crate::result::RidebookResult;

/// Lifecycle state of an order record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Order cancelled
    Cancelled,
    /// Order accepted by the operator
    Accepted,
    /// Order established, no vehicle yet
    Established,
    /// Vehicle and driver assigned
    Dispatched,
    /// Ride under way
    InProgress,
    /// Ride finished
    Finished,
    /// Marked recent; needs corroboration before it is trusted
    RecentUnclassified,
    /// Nothing recognisable
    Other,
}

impl RecordState {
    /// Decision table, first match wins
    #[must_use]
    pub const fn from_flags(flags: &StatusFlags) -> Self {
        if flags.dispatched {
            Self::Dispatched
        } else if flags.recent && !flags.cancelled {
            Self::RecentUnclassified
        } else if flags.cancelled {
            Self::Cancelled
        } else if flags.accepted {
            Self::Accepted
        } else if flags.established {
            Self::Established
        } else if flags.in_progress {
            Self::InProgress
        } else if flags.finished {
            Self::Finished
        } else {
            Self::Other
        }
    }

    /// Whether records in this state can ever be retained
    #[must_use]
    pub const fn is_candidate(&self) -> bool {
        matches!(self, Self::Dispatched | Self::RecentUnclassified)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cancelled => "cancelled",
            Self::Accepted => "accepted",
            Self::Established => "established",
            Self::Dispatched => "dispatched",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
            Self::RecentUnclassified => "recent_unclassified",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Status flags read from a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct StatusFlags {
    /// Cancelled marker present
    pub cancelled: bool,
    /// Accepted marker present
    pub accepted: bool,
    /// Established marker present
    pub established: bool,
    /// Dispatched marker present
    pub dispatched: bool,
    /// In-progress marker present
    pub in_progress: bool,
    /// Finished marker present
    pub finished: bool,
    /// Recent marker present
    pub recent: bool,
}

impl StatusFlags {
    /// Derive flags from structural tokens and badge texts
    #[must_use]
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S], keywords: &StatusKeywords) -> Self {
        let lowered: Vec<String> = tokens.iter().map(|t| t.as_ref().to_lowercase()).collect();
        let any = |words: &[String]| {
            lowered
                .iter()
                .any(|t| words.iter().any(|w| t.contains(&w.to_lowercase())))
        };
        Self {
            cancelled: any(&keywords.cancelled),
            accepted: any(&keywords.accepted),
            established: any(&keywords.established),
            dispatched: any(&keywords.dispatched),
            in_progress: any(&keywords.in_progress),
            finished: any(&keywords.finished),
            recent: any(&keywords.recent),
        }
    }
}

/// Keywords per status flag, matched as case-insensitive substrings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusKeywords {
    /// Cancelled
    pub cancelled: Vec<String>,
    /// Accepted
    pub accepted: Vec<String>,
    /// Established
    pub established: Vec<String>,
    /// Dispatched
    pub dispatched: Vec<String>,
    /// In progress
    pub in_progress: Vec<String>,
    /// Finished
    pub finished: Vec<String>,
    /// Recent
    pub recent: Vec<String>,
}

impl Default for StatusKeywords {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        Self {
            cancelled: strings(&["cancel", "已取消"]),
            accepted: strings(&["accept", "已受理"]),
            established: strings(&["establish", "已成立"]),
            dispatched: strings(&["dispatch", "已派車"]),
            in_progress: strings(&["progress", "執行中", "服務中"]),
            finished: strings(&["finish", "已結束"]),
            recent: strings(&["recent", "latest", "最新"]),
        }
    }
}

/// Whether a record enters the result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retention {
    /// Keep; `evidence` is corroborating text cached for extraction
    Retain {
        /// Vehicle/driver text found during corroboration
        evidence: Option<String>,
    },
    /// Discard
    Drop,
}

/// State plus retention decision for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Classified state
    pub state: RecordState,
    /// Retention decision
    pub retention: Retention,
}

impl Assessment {
    /// Whether the record is kept
    #[must_use]
    pub const fn is_retained(&self) -> bool {
        matches!(self.retention, Retention::Retain { .. })
    }

    /// Cached corroboration text, if any
    #[must_use]
    pub fn evidence(&self) -> Option<&str> {
        match &self.retention {
            Retention::Retain { evidence } => evidence.as_deref(),
            Retention::Drop => None,
        }
    }
}

/// Classifies order records and decides retention
#[derive(Debug)]
pub struct RecordStatusClassifier<'d, D: AutomationDriver + ?Sized> {
    resolver: SelectorResolver<'d, D>,
    status_markers: LocatorChain,
    evidence: LocatorChain,
    keywords: StatusKeywords,
}

impl<'d, D: AutomationDriver + ?Sized> RecordStatusClassifier<'d, D> {
    /// Create a classifier.
    ///
    /// `status_markers` finds badge descendants; `evidence` finds
    /// vehicle/driver/dispatch sub-elements used for corroboration.
    pub const fn new(
        driver: &'d D,
        status_markers: LocatorChain,
        evidence: LocatorChain,
        keywords: StatusKeywords,
    ) -> Self {
        Self {
            resolver: SelectorResolver::new(driver),
            status_markers,
            evidence,
            keywords,
        }
    }

    /// Read the structural tokens and badge texts of `record`
    pub async fn tokens(&self, record: &ElementHandle) -> RidebookResult<Vec<String>> {
        let driver = self.resolver.driver();
        let mut tokens: Vec<String> = Vec::new();
        let mut push_classes = |class: Option<String>| {
            if let Some(class) = class {
                tokens.extend(class.split_whitespace().map(str::to_string));
            }
        };
        push_classes(driver.attribute(record, "class").await?);
        let markers = self.resolver.resolve_all(&self.status_markers, Some(record)).await?;
        let mut texts = Vec::new();
        for marker in &markers {
            push_classes(driver.attribute(marker, "class").await?);
            if let Some(text) = driver.text_content(marker).await? {
                let text = text.trim();
                if !text.is_empty() {
                    texts.push(text.to_string());
                }
            }
        }
        tokens.extend(texts);
        Ok(tokens)
    }

    /// Read the status flags of `record`
    pub async fn flags(&self, record: &ElementHandle) -> RidebookResult<StatusFlags> {
        let tokens = self.tokens(record).await?;
        Ok(StatusFlags::from_tokens(&tokens, &self.keywords))
    }

    /// Classify `record` by the decision table
    pub async fn classify(&self, record: &ElementHandle) -> RidebookResult<RecordState> {
        Ok(RecordState::from_flags(&self.flags(record).await?))
    }

    /// Look for non-empty vehicle/driver text inside `record`.
    ///
    /// A fault while searching retains the record without evidence.
    async fn corroborate(&self, record: &ElementHandle) -> Retention {
        match self.resolver.resolve_text(&self.evidence, Some(record), |_| true).await {
            Ok(Some((_, text))) => Retention::Retain { evidence: Some(text) },
            Ok(None) => Retention::Drop,
            Err(error) => {
                warn!(id = %record.id, %error, "corroboration failed, retaining record");
                Retention::Retain { evidence: None }
            }
        }
    }

    /// Classify and decide retention
    pub async fn assess(&self, record: &ElementHandle) -> RidebookResult<Assessment> {
        let state = self.classify(record).await?;
        let retention = match state {
            RecordState::Dispatched => Retention::Retain { evidence: None },
            RecordState::RecentUnclassified => self.corroborate(record).await,
            _ => Retention::Drop,
        };
        debug!(id = %record.id, %state, retained = matches!(retention, Retention::Retain { .. }), "record assessed");
        Ok(Assessment { state, retention })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::Locator;
    use crate::mock::MockDriver;

    fn markers() -> LocatorChain {
        LocatorChain::new("status").css(".status").css("[class*='badge']")
    }

    fn evidence() -> LocatorChain {
        LocatorChain::new("evidence").css(".car-no").css(".driver")
    }

    mod decision_table_tests {
        use super::*;

        #[test]
        fn test_dispatched_wins() {
            let flags = StatusFlags {
                dispatched: true,
                cancelled: true,
                recent: true,
                ..StatusFlags::default()
            };
            assert_eq!(RecordState::from_flags(&flags), RecordState::Dispatched);
        }

        #[test]
        fn test_recent_cancelled_is_cancelled() {
            let flags = StatusFlags {
                recent: true,
                cancelled: true,
                ..StatusFlags::default()
            };
            assert_eq!(RecordState::from_flags(&flags), RecordState::Cancelled);
        }

        #[test]
        fn test_recent_alone_needs_corroboration() {
            let flags = StatusFlags {
                recent: true,
                accepted: true,
                ..StatusFlags::default()
            };
            assert_eq!(RecordState::from_flags(&flags), RecordState::RecentUnclassified);
        }

        #[test]
        fn test_lower_rows() {
            let mut flags = StatusFlags {
                accepted: true,
                established: true,
                ..StatusFlags::default()
            };
            assert_eq!(RecordState::from_flags(&flags), RecordState::Accepted);
            flags.accepted = false;
            assert_eq!(RecordState::from_flags(&flags), RecordState::Established);
            flags.established = false;
            flags.finished = true;
            assert_eq!(RecordState::from_flags(&flags), RecordState::Finished);
            assert_eq!(
                RecordState::from_flags(&StatusFlags::default()),
                RecordState::Other
            );
        }

        #[test]
        fn test_flags_from_tokens() {
            let keywords = StatusKeywords::default();
            let flags = StatusFlags::from_tokens(&["order-card", "status-Dispatched"], &keywords);
            assert!(flags.dispatched);
            assert!(!flags.cancelled);
            let flags = StatusFlags::from_tokens(&["已取消"], &keywords);
            assert!(flags.cancelled);
        }
    }

    mod assess_tests {
        use super::*;

        const PAGE: &str = r#"<html><body>
          <div class="order dispatched"><span class="time">2025/06/19 08:00</span></div>
          <div class="order"><span class="status">已取消</span></div>
          <div class="order recent"><span class="car-no">ABC-1234</span></div>
          <div class="order recent"><span class="note">待確認</span></div>
          <div class="order recent cancelled"><span class="car-no">XYZ-9</span></div>
        </body></html>"#;

        async fn records(driver: &MockDriver) -> Vec<ElementHandle> {
            driver.query_all(&Locator::css(".order"), None).await.unwrap()
        }

        #[tokio::test]
        async fn test_assess_each_row() {
            let driver = MockDriver::from_html(PAGE);
            let classifier =
                RecordStatusClassifier::new(&driver, markers(), evidence(), StatusKeywords::default());
            let rows = records(&driver).await;

            let a = classifier.assess(&rows[0]).await.unwrap();
            assert_eq!(a.state, RecordState::Dispatched);
            assert!(a.is_retained());

            let b = classifier.assess(&rows[1]).await.unwrap();
            assert_eq!(b.state, RecordState::Cancelled);
            assert!(!b.is_retained());

            let c = classifier.assess(&rows[2]).await.unwrap();
            assert_eq!(c.state, RecordState::RecentUnclassified);
            assert_eq!(c.evidence(), Some("ABC-1234"));

            let d = classifier.assess(&rows[3]).await.unwrap();
            assert_eq!(d.state, RecordState::RecentUnclassified);
            assert_eq!(d.retention, Retention::Drop);

            let e = classifier.assess(&rows[4]).await.unwrap();
            assert_eq!(e.state, RecordState::Cancelled);
            assert!(!e.is_retained());
        }

        #[tokio::test]
        async fn test_corroboration_fault_retains() {
            let driver = MockDriver::from_html(PAGE).fail_query(".car-no");
            let classifier =
                RecordStatusClassifier::new(&driver, markers(), evidence(), StatusKeywords::default());
            let rows = records(&driver).await;
            let d = classifier.assess(&rows[3]).await.unwrap();
            assert_eq!(d.retention, Retention::Retain { evidence: None });
        }

        #[tokio::test]
        async fn test_status_read_fault_propagates() {
            let driver = MockDriver::from_html(PAGE).fail_on("attribute");
            let classifier =
                RecordStatusClassifier::new(&driver, markers(), evidence(), StatusKeywords::default());
            let rows = records(&driver).await;
            assert!(classifier.assess(&rows[0]).await.is_err());
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn flags_strategy() -> impl Strategy<Value = StatusFlags> {
            prop::array::uniform7(any::<bool>()).prop_map(|b| StatusFlags {
                cancelled: b[0],
                accepted: b[1],
                established: b[2],
                dispatched: b[3],
                in_progress: b[4],
                finished: b[5],
                recent: b[6],
            })
        }

        proptest! {
            #[test]
            fn prop_dispatched_dominates(flags in flags_strategy()) {
                let state = RecordState::from_flags(&flags);
                prop_assert_eq!(state == RecordState::Dispatched, flags.dispatched);
            }

            #[test]
            fn prop_cancelled_never_candidate_unless_dispatched(flags in flags_strategy()) {
                let state = RecordState::from_flags(&flags);
                if flags.cancelled && !flags.dispatched {
                    prop_assert_eq!(state, RecordState::Cancelled);
                    prop_assert!(!state.is_candidate());
                }
            }

            #[test]
            fn prop_other_only_without_flags(flags in flags_strategy()) {
                let state = RecordState::from_flags(&flags);
                prop_assert_eq!(state == RecordState::Other, flags == StatusFlags::default());
            }
        }
    }
}
