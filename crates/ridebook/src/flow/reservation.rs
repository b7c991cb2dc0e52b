//! Booking flow: login, fill the reservation form, submit.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

use super::{FlowContext, FlowError, FlowResult};
use crate::classifier::{ClaimedRoles, ContentClassifier, Role};
use crate::committer::CommitOutcome;
use crate::config::{QuestionAnswer, RidebookConfig};
use crate::driver::{AutomationDriver, ElementHandle};
use crate::resolver::Intent;
use crate::result::RidebookResult;
use crate::site::SiteLocators;

/// Result of a reservation attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationOutcome {
    /// The completion marker was seen
    pub success: bool,
    /// Step that stopped the flow, with the reason
    pub failed_step: Option<String>,
    /// Diagnostic screenshots written during the run
    pub screenshots: Vec<PathBuf>,
}

impl<D: AutomationDriver + ?Sized> FlowContext<'_, D> {
    /// Find the control for `role` among the form's choice controls.
    ///
    /// Controls are re-read every time: a commit can re-render the form.
    /// When content does not identify the role, the control in the same
    /// position among unclaimed controls as the role among unassigned roles
    /// is used instead.
    async fn locate_role(&self, role: Role) -> RidebookResult<Option<ElementHandle>> {
        let controls = self
            .resolver
            .resolve_all(&self.config.locators.form_controls, None)
            .await?;
        let classifier = ContentClassifier::new(self.config.classifier.clone());
        let mut claimed = ClaimedRoles::new();
        let classification = classifier
            .classify_controls(self.driver, controls.clone(), &mut claimed)
            .await?;
        if let Some(handle) = classification.get(role) {
            return Ok(Some(handle.clone()));
        }
        let unclaimed: Vec<&ElementHandle> = controls
            .iter()
            .filter(|c| claimed.role_of(c).is_none())
            .collect();
        let rank = Role::ALL
            .into_iter()
            .filter(|r| !claimed.contains(*r))
            .position(|r| r == role);
        let fallback = rank.and_then(|i| unclaimed.get(i)).map(|h| (*h).clone());
        match &fallback {
            Some(handle) => warn!(%role, id = %handle.id, "role not recognised, using position"),
            None => warn!(%role, "no control for role"),
        }
        Ok(fallback)
    }

    /// Commit `desired` to the control holding `role`
    async fn commit_role(
        &self,
        step: &'static str,
        role: Role,
        desired: &str,
        option_index: Option<usize>,
    ) -> FlowResult<()> {
        let Some(target) = self.locate_role(role).await? else {
            return Err(FlowError::step(step, format!("no control for {role}")));
        };
        match self.committer.commit(&target, desired, option_index).await? {
            CommitOutcome::Committed(strategy) => {
                info!(%role, desired, %strategy, "value committed");
                Ok(())
            }
            CommitOutcome::Failed => Err(FlowError::step(
                step,
                format!("{role} would not take '{desired}'"),
            )),
        }
    }

    /// Pick the last real option of the date control
    async fn commit_last_date(&self) -> FlowResult<()> {
        let Some(target) = self.locate_role(Role::Date).await? else {
            return Err(FlowError::step("date", "no date control"));
        };
        let options = self.driver.options(&target).await?;
        let placeholders = &self.config.classifier.placeholders;
        let last = options.iter().enumerate().rev().find(|(_, o)| {
            let label = o.label.trim();
            !label.is_empty() && !placeholders.iter().any(|p| p.eq_ignore_ascii_case(label))
        });
        let Some((index, option)) = last else {
            return Err(FlowError::step("date", "date control has no options"));
        };
        self.commit_role("date", Role::Date, &option.label, Some(index))
            .await
    }

    /// Type the hospital name and take the first suggestion.
    ///
    /// Some deployments prefill the address; a missing box or suggestion is
    /// logged and the flow continues.
    async fn search_pickup(&self) -> FlowResult<()> {
        let locators = &self.config.locators;
        let query = &self.config.reservation.hospital_query;
        match self.fill("pickup_search", &locators.pickup_search, query).await {
            Ok(()) => {}
            Err(FlowError::Step { reason, .. }) => {
                warn!(query, %reason, "pickup search box unavailable");
                return Ok(());
            }
            Err(error) => return Err(error),
        }
        match self.find(&locators.search_suggestion, Intent::Write).await? {
            Some(suggestion) => {
                self.driver.click(&suggestion).await?;
                info!(query, "pickup suggestion chosen");
            }
            None => warn!(query, "no pickup suggestion appeared"),
        }
        Ok(())
    }

    /// Click the configured answer inside the question's own scope
    async fn answer(&self, qa: &QuestionAnswer) -> FlowResult<()> {
        let Some(scope) = self
            .find(&SiteLocators::question(&qa.prompt), Intent::Read)
            .await?
        else {
            return Err(FlowError::step("questions", format!("question '{}' not found", qa.prompt)));
        };
        let answer = self
            .resolver
            .resolve(&SiteLocators::answer(&qa.answer), Some(&scope), Intent::Write)
            .await?;
        let Some(answer) = answer else {
            return Err(FlowError::step(
                "questions",
                format!("answer '{}' not found for '{}'", qa.answer, qa.prompt),
            ));
        };
        self.driver.click(&answer).await?;
        info!(prompt = %qa.prompt, answer = %qa.answer, "question answered");
        Ok(())
    }

    async fn reserve(&mut self) -> FlowResult<bool> {
        let config = self.config;
        let locators = &config.locators;
        let booking = &config.reservation;

        self.login().await?;
        self.click("booking_entry", &locators.booking_entry).await?;
        self.wait_idle().await?;
        self.checkpoint("booking_form").await;

        self.commit_role("pickup", Role::PickupLocation, &booking.pickup_category, None)
            .await?;
        self.search_pickup().await?;
        self.checkpoint("pickup").await;

        self.commit_role("dropoff", Role::DropoffLocation, &booking.dropoff_category, None)
            .await?;
        self.checkpoint("dropoff").await;

        self.commit_last_date().await?;
        self.commit_role("time", Role::Hour, &booking.hour, None).await?;
        self.commit_role("time", Role::Minute, &booking.minute, None)
            .await?;
        self.checkpoint("datetime").await;

        match self
            .commit_role("companions", Role::CompanionCount, &booking.companions, None)
            .await
        {
            Ok(()) => {}
            Err(FlowError::Step { reason, .. }) => {
                warn!(%reason, "companion count not set, continuing");
            }
            Err(error) => return Err(error),
        }
        for qa in &booking.answers {
            self.answer(qa).await?;
        }
        self.checkpoint("questions").await;

        self.click("confirm", &locators.confirm_step).await?;
        self.wait_idle().await?;
        self.checkpoint("confirm").await;

        self.click("submit", &locators.submit).await?;
        self.wait_idle().await?;
        let done = self.find(&locators.completion, Intent::Read).await?.is_some();
        self.checkpoint(if done { "completed" } else { "unconfirmed" }).await;
        Ok(done)
    }
}

/// Make one reservation.
///
/// Returns `Ok` with `success = false` when the page did not cooperate; only
/// driver faults and missing credentials are errors.
#[instrument(skip_all, fields(site = %config.site.base_url))]
pub async fn run_reservation_flow<D: AutomationDriver + ?Sized>(
    driver: &D,
    config: &RidebookConfig,
) -> RidebookResult<ReservationOutcome> {
    let mut ctx = FlowContext::new(driver, config);
    let result = ctx.reserve().await;
    let mut outcome = ReservationOutcome::default();
    match result {
        Ok(true) => {
            info!("reservation completed");
            outcome.success = true;
        }
        Ok(false) => {
            warn!("completion marker not found");
            outcome.failed_step = Some(String::from("completion: marker not found"));
        }
        Err(FlowError::Step { step, reason }) => {
            warn!(step, %reason, "reservation stopped");
            ctx.checkpoint("failed").await;
            outcome.failed_step = Some(format!("{step}: {reason}"));
        }
        Err(FlowError::Driver(error)) => return Err(error),
    }
    outcome.screenshots = ctx.screenshots;
    Ok(outcome)
}
