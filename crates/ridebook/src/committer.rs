//! SelectionCommitter: getting a value to actually stick.
//!
//! The booking SPA wraps its controls in framework bindings that sometimes
//! ignore a perfectly valid selection. Strategies are tried in order and the
//! control is re-read after each one; the first strategy that changes the
//! observed value wins.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::driver::{AutomationDriver, ElementHandle, SelectBy};
use crate::result::RidebookResult;
use crate::wait::settle;

/// Default pause between a strategy and the re-read (ms)
pub const DEFAULT_SETTLE_MS: u64 = 300;

/// How a value was committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The control already showed the desired value
    AlreadySet,
    /// Option chosen by visible label
    ByLabel,
    /// Option chosen by a value containing the desired text
    ByValue,
    /// Option chosen by position
    ByIndex,
    /// Text typed into a non-choice control
    Fill,
    /// Value assigned directly with synthetic change notifications
    ForceValue,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AlreadySet => "already_set",
            Self::ByLabel => "by_label",
            Self::ByValue => "by_value",
            Self::ByIndex => "by_index",
            Self::Fill => "fill",
            Self::ForceValue => "force_value",
        };
        f.write_str(name)
    }
}

/// Result of a commit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A strategy changed the observed value
    Committed(Strategy),
    /// No strategy changed the observed value
    Failed,
}

impl CommitOutcome {
    /// Whether the value was committed
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

/// Commits values to choice and text controls
#[derive(Debug)]
pub struct SelectionCommitter<'d, D: AutomationDriver + ?Sized> {
    driver: &'d D,
    settle_ms: u64,
}

impl<'d, D: AutomationDriver + ?Sized> SelectionCommitter<'d, D> {
    /// Create a committer with the default settle delay
    pub const fn new(driver: &'d D) -> Self {
        Self {
            driver,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }

    /// Override the settle delay
    #[must_use]
    pub const fn with_settle_ms(mut self, settle_ms: u64) -> Self {
        self.settle_ms = settle_ms;
        self
    }

    async fn observed(&self, target: &ElementHandle) -> RidebookResult<Option<String>> {
        self.driver.input_value(target).await
    }

    /// Label of the option currently selected, for choice controls
    async fn observed_label(&self, target: &ElementHandle) -> RidebookResult<Option<String>> {
        let Some(value) = self.observed(target).await? else {
            return Ok(None);
        };
        let options = self.driver.options(target).await?;
        Ok(options.into_iter().find(|o| o.value == value).map(|o| o.label))
    }

    async fn already_set(&self, target: &ElementHandle, desired: &str) -> RidebookResult<bool> {
        if desired.is_empty() {
            return Ok(false);
        }
        if self.observed(target).await?.as_deref() == Some(desired) {
            return Ok(true);
        }
        if target.is_select() {
            return Ok(self.observed_label(target).await?.as_deref() == Some(desired));
        }
        Ok(false)
    }

    /// Run one strategy; `Ok(None)` when it was not applicable
    async fn apply(
        &self,
        strategy: Strategy,
        target: &ElementHandle,
        desired: &str,
        option_index: Option<usize>,
    ) -> RidebookResult<Option<()>> {
        match strategy {
            Strategy::ByLabel => {
                let by = SelectBy::Label(desired.to_string());
                Ok(self.driver.select_option(target, &by).await?.then_some(()))
            }
            Strategy::ByValue => {
                let options = self.driver.options(target).await?;
                let Some(option) = options.into_iter().find(|o| o.value.contains(desired)) else {
                    return Ok(None);
                };
                let by = SelectBy::Value(option.value);
                Ok(self.driver.select_option(target, &by).await?.then_some(()))
            }
            Strategy::ByIndex => {
                let Some(index) = option_index else {
                    return Ok(None);
                };
                let by = SelectBy::Index(index);
                Ok(self.driver.select_option(target, &by).await?.then_some(()))
            }
            Strategy::Fill => self.driver.fill(target, desired).await.map(Some),
            Strategy::ForceValue => {
                // a choice control must receive one of its own option values
                let value = if target.is_select() {
                    let options = self.driver.options(target).await?;
                    options
                        .iter()
                        .find(|o| o.label == desired)
                        .or_else(|| option_index.and_then(|i| options.get(i)))
                        .map_or_else(|| desired.to_string(), |o| o.value.clone())
                } else {
                    desired.to_string()
                };
                if value.is_empty() {
                    return Ok(None);
                }
                self.driver.force_value(target, &value).await.map(Some)
            }
            Strategy::AlreadySet => Ok(None),
        }
    }

    /// Commit `desired` (or option `option_index`) to `target`.
    ///
    /// Driver faults propagate; a value that never sticks is
    /// [`CommitOutcome::Failed`], and the caller decides whether that is fatal.
    pub async fn commit(
        &self,
        target: &ElementHandle,
        desired: &str,
        option_index: Option<usize>,
    ) -> RidebookResult<CommitOutcome> {
        if self.already_set(target, desired).await? {
            debug!(id = %target.id, desired, "value already set");
            return Ok(CommitOutcome::Committed(Strategy::AlreadySet));
        }
        let strategies: &[Strategy] = if target.is_select() {
            &[
                Strategy::ByLabel,
                Strategy::ByValue,
                Strategy::ByIndex,
                Strategy::ForceValue,
            ]
        } else {
            &[Strategy::Fill, Strategy::ForceValue]
        };
        for &strategy in strategies {
            let before = self.observed(target).await?;
            if self.apply(strategy, target, desired, option_index).await?.is_none() {
                debug!(id = %target.id, %strategy, "strategy not applicable");
                continue;
            }
            settle(self.settle_ms).await;
            let after = self.observed(target).await?;
            if after != before {
                debug!(id = %target.id, %strategy, ?after, "value committed");
                return Ok(CommitOutcome::Committed(strategy));
            }
            debug!(id = %target.id, %strategy, "value unchanged");
        }
        warn!(id = %target.id, desired, ?option_index, "no strategy changed the value");
        Ok(CommitOutcome::Failed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locator::Locator;
    use crate::mock::MockDriver;

    fn page(ignore: &str) -> String {
        format!(
            r#"<html><body>
            <select id="hour" data-mock-ignore="{ignore}">
              <option value="">請選擇</option>
              <option value="h08">8</option>
              <option value="h13">13</option>
              <option value="h16">16</option>
            </select>
            <input id="search" data-mock-ignore="{ignore}" value="">
            <select id="stuck" data-mock-ignore="label value index force">
              <option value="a">A</option><option value="b">B</option>
            </select>
            </body></html>"#
        )
    }

    async fn handle(driver: &MockDriver, css: &str) -> ElementHandle {
        driver
            .query_all(&Locator::css(css), None)
            .await
            .unwrap()
            .into_iter()
            .next()
            .expect("element present")
    }

    mod strategy_tests {
        use super::*;

        #[tokio::test]
        async fn test_by_label_first() {
            let driver = MockDriver::from_html(page(""));
            let target = handle(&driver, "#hour").await;
            let committer = SelectionCommitter::new(&driver).with_settle_ms(0);
            let outcome = committer.commit(&target, "16", None).await.unwrap();
            assert_eq!(outcome, CommitOutcome::Committed(Strategy::ByLabel));
            assert_eq!(driver.input_value(&target).await.unwrap().as_deref(), Some("h16"));
        }

        #[tokio::test]
        async fn test_falls_back_to_value() {
            let driver = MockDriver::from_html(page("label"));
            let target = handle(&driver, "#hour").await;
            let committer = SelectionCommitter::new(&driver).with_settle_ms(0);
            let outcome = committer.commit(&target, "13", None).await.unwrap();
            assert_eq!(outcome, CommitOutcome::Committed(Strategy::ByValue));
            assert_eq!(driver.input_value(&target).await.unwrap().as_deref(), Some("h13"));
        }

        #[tokio::test]
        async fn test_falls_back_to_index() {
            let driver = MockDriver::from_html(page("label value"));
            let target = handle(&driver, "#hour").await;
            let committer = SelectionCommitter::new(&driver).with_settle_ms(0);
            let outcome = committer.commit(&target, "8", Some(1)).await.unwrap();
            assert_eq!(outcome, CommitOutcome::Committed(Strategy::ByIndex));
        }

        #[tokio::test]
        async fn test_force_value_last_resort() {
            let driver = MockDriver::from_html(page("label value index"));
            let target = handle(&driver, "#hour").await;
            let committer = SelectionCommitter::new(&driver).with_settle_ms(0);
            let outcome = committer.commit(&target, "16", Some(3)).await.unwrap();
            assert_eq!(outcome, CommitOutcome::Committed(Strategy::ForceValue));
            assert!(driver.was_called("force_value"));
            assert_eq!(driver.input_value(&target).await.unwrap().as_deref(), Some("h16"));
        }

        #[tokio::test]
        async fn test_text_control_fill_then_force() {
            let driver = MockDriver::from_html(page("fill"));
            let target = handle(&driver, "#search").await;
            let committer = SelectionCommitter::new(&driver).with_settle_ms(0);
            let outcome = committer.commit(&target, "臺大醫院", None).await.unwrap();
            assert_eq!(outcome, CommitOutcome::Committed(Strategy::ForceValue));
            assert_eq!(
                driver.input_value(&target).await.unwrap().as_deref(),
                Some("臺大醫院")
            );
        }
    }

    mod outcome_tests {
        use super::*;

        #[tokio::test]
        async fn test_already_set_by_label() {
            let driver = MockDriver::from_html(page(""));
            let target = handle(&driver, "#stuck").await;
            let committer = SelectionCommitter::new(&driver).with_settle_ms(0);
            let outcome = committer.commit(&target, "A", None).await.unwrap();
            assert_eq!(outcome, CommitOutcome::Committed(Strategy::AlreadySet));
            assert!(!driver.was_called("select_option"));
        }

        #[tokio::test]
        async fn test_every_strategy_ignored_is_failed() {
            let driver = MockDriver::from_html(page(""));
            let target = handle(&driver, "#stuck").await;
            let committer = SelectionCommitter::new(&driver).with_settle_ms(0);
            let outcome = committer.commit(&target, "B", Some(1)).await.unwrap();
            assert_eq!(outcome, CommitOutcome::Failed);
            assert!(!outcome.is_committed());
        }

        #[tokio::test]
        async fn test_driver_fault_propagates() {
            let driver = MockDriver::from_html(page("")).fail_on("select_option");
            let target = handle(&driver, "#hour").await;
            let committer = SelectionCommitter::new(&driver).with_settle_ms(0);
            assert!(committer.commit(&target, "8", None).await.is_err());
        }
    }
}
