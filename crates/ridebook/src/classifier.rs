//! ContentClassifier: naming generic controls by what they contain.
//!
//! The booking form renders several unlabeled `<select>` elements whose
//! attributes change between deployments. Their *options* do not: dates look
//! like dates, hours sit inside operating hours, minutes step by five. This
//! module assigns [`Role`]s from option text alone.
//!
//! Pass order is fixed: location roles, `Date`, `Hour`, `Minute`,
//! `CompanionCount`. Location-looking candidates are excluded from the
//! numeric roles. Ties go to the first candidate in document order and the
//! losers are logged, not retried.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::driver::{AutomationDriver, ElementHandle};
use crate::result::RidebookResult;

/// Semantic target a generic control may fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Pickup location category
    PickupLocation,
    /// Dropoff location category
    DropoffLocation,
    /// Reservation date
    Date,
    /// Reservation hour
    Hour,
    /// Reservation minute
    Minute,
    /// Number of companions
    CompanionCount,
}

impl Role {
    /// Roles in classification pass order
    pub const ALL: [Self; 6] = [
        Self::PickupLocation,
        Self::DropoffLocation,
        Self::Date,
        Self::Hour,
        Self::Minute,
        Self::CompanionCount,
    ];

    /// Whether location-looking candidates are excluded from this role
    #[must_use]
    pub const fn excludes_locations(self) -> bool {
        matches!(self, Self::Date | Self::Hour | Self::Minute)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PickupLocation => "pickup_location",
            Self::DropoffLocation => "dropoff_location",
            Self::Date => "date",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::CompanionCount => "companion_count",
        };
        f.write_str(name)
    }
}

/// Roles claimed during one resolution pass (role → control identity).
///
/// Append-only: a role is claimed once, and a control backs at most one
/// role. Reset when the page changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimedRoles {
    by_role: BTreeMap<Role, String>,
}

impl ClaimedRoles {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `role` for `handle`; `false` if either is already taken
    pub fn claim(&mut self, role: Role, handle: &ElementHandle) -> bool {
        if self.by_role.contains_key(&role) || self.role_of(handle).is_some() {
            return false;
        }
        self.by_role.insert(role, handle.id.clone());
        true
    }

    /// Whether `role` is claimed
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        self.by_role.contains_key(&role)
    }

    /// Role held by `handle`, if any
    #[must_use]
    pub fn role_of(&self, handle: &ElementHandle) -> Option<Role> {
        self.by_role
            .iter()
            .find(|(_, id)| **id == handle.id)
            .map(|(role, _)| *role)
    }

    /// Number of claimed roles
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_role.len()
    }

    /// Whether nothing is claimed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_role.is_empty()
    }

    /// Forget every claim (new page)
    pub fn reset(&mut self) {
        self.by_role.clear();
    }
}

/// A control together with the text used to classify it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The control
    pub handle: ElementHandle,
    /// Option labels for a choice control, otherwise its own text
    pub texts: Vec<String>,
}

impl Candidate {
    /// Create a candidate from known texts
    #[must_use]
    pub fn new(handle: ElementHandle, texts: Vec<String>) -> Self {
        Self { handle, texts }
    }

    /// Read a candidate's texts through the driver
    pub async fn read<D: AutomationDriver + ?Sized>(
        driver: &D,
        handle: ElementHandle,
    ) -> RidebookResult<Self> {
        let texts = if handle.is_select() {
            driver
                .options(&handle)
                .await?
                .into_iter()
                .map(|o| o.label)
                .collect()
        } else {
            driver
                .text_content(&handle)
                .await?
                .map(|t| vec![t.trim().to_string()])
                .unwrap_or_default()
        };
        Ok(Self { handle, texts })
    }
}

/// Keyword and range tables the classifier matches against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierProfile {
    /// Place-category words; a candidate containing one is never a date/time
    pub location_keywords: Vec<String>,
    /// Option texts ignored entirely (prompts such as "請選擇")
    pub placeholders: Vec<String>,
    /// Day/month markers that make an option date-like
    pub date_markers: Vec<String>,
    /// Words following a count in companion options
    pub companion_markers: Vec<String>,
    /// First operating hour (inclusive)
    pub hour_min: u32,
    /// Last operating hour (inclusive)
    pub hour_max: u32,
}

impl Default for ClassifierProfile {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        Self {
            location_keywords: strings(&[
                "醫療院所", "住家", "醫院", "診所", "地址", "車站", "捷運", "機場", "其他地點",
                "hospital", "clinic", "home", "station",
            ]),
            placeholders: strings(&["請選擇", "選擇", "--", "---", "select", "please select"]),
            date_markers: strings(&[
                "年", "月", "日", "星期", "週", "jan", "feb", "mar", "apr", "may", "jun", "jul",
                "aug", "sep", "oct", "nov", "dec", "mon", "tue", "wed", "thu", "fri", "sat",
                "sun",
            ]),
            companion_markers: strings(&["人", "person", "people"]),
            hour_min: 6,
            hour_max: 22,
        }
    }
}

fn year_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\D)(?:19|20)\d{2}(?:\D|$)").unwrap_or_else(|_| unreachable!())
    })
}

fn date_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d\s*[/\-]\s*\d").unwrap_or_else(|_| unreachable!()))
}

fn time_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,2}:\d{2}$").unwrap_or_else(|_| unreachable!()))
}

const fn is_minute_step(value: u32) -> bool {
    value <= 55 && value % 5 == 0
}

/// Result of one classification pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Roles assigned in this pass
    pub roles: BTreeMap<Role, ElementHandle>,
    /// Roles for which more than one candidate qualified
    pub ambiguous: Vec<Role>,
}

impl Classification {
    /// Handle assigned to `role` in this pass
    #[must_use]
    pub fn get(&self, role: Role) -> Option<&ElementHandle> {
        self.roles.get(&role)
    }
}

/// Assigns roles to unlabeled controls from their text content
#[derive(Debug, Clone, Default)]
pub struct ContentClassifier {
    profile: ClassifierProfile,
}

impl ContentClassifier {
    /// Create a classifier with the given tables
    #[must_use]
    pub const fn new(profile: ClassifierProfile) -> Self {
        Self { profile }
    }

    /// The tables in use
    #[must_use]
    pub const fn profile(&self) -> &ClassifierProfile {
        &self.profile
    }

    fn considered<'t>(&self, texts: &'t [String]) -> Vec<&'t str> {
        texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .filter(|t| {
                !self
                    .profile
                    .placeholders
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(t))
            })
            .collect()
    }

    /// Any option contains a location keyword
    #[must_use]
    pub fn is_location(&self, texts: &[String]) -> bool {
        texts.iter().any(|t| {
            let lower = t.to_lowercase();
            self.profile
                .location_keywords
                .iter()
                .any(|k| lower.contains(&k.to_lowercase()))
        })
    }

    /// Any option carries a year, a digit-separator-digit, or a day/month marker
    #[must_use]
    pub fn is_date(&self, texts: &[String]) -> bool {
        self.considered(texts).into_iter().any(|t| {
            if year_token().is_match(t) || date_separator().is_match(t) {
                return true;
            }
            let lower = t.to_lowercase();
            t.chars().any(|c| c.is_ascii_digit())
                && self.profile.date_markers.iter().any(|m| lower.contains(m.as_str()))
        })
    }

    /// Every option is a time token or an in-range hour, and the set is not
    /// made up purely of values a minute dropdown would also offer
    #[must_use]
    pub fn is_hour(&self, texts: &[String]) -> bool {
        let options = self.considered(texts);
        if options.is_empty() {
            return false;
        }
        let range = self.profile.hour_min..=self.profile.hour_max;
        let mut distinguishable = false;
        for option in options {
            if time_token().is_match(option) {
                distinguishable = true;
                continue;
            }
            match option.parse::<u32>() {
                Ok(value) if range.contains(&value) => {
                    distinguishable |= !is_minute_step(value);
                }
                _ => return false,
            }
        }
        distinguishable
    }

    /// Every option is a multiple of five in [0, 59]
    #[must_use]
    pub fn is_minute(&self, texts: &[String]) -> bool {
        let options = self.considered(texts);
        !options.is_empty()
            && options
                .iter()
                .all(|o| o.parse::<u32>().is_ok_and(|v| v < 60 && v % 5 == 0))
    }

    /// Options read like head counts ("1人(免費)")
    #[must_use]
    pub fn is_companion(&self, texts: &[String]) -> bool {
        self.considered(texts).into_iter().any(|t| {
            let lower = t.to_lowercase();
            t.starts_with(|c: char| c.is_ascii_digit())
                && self
                    .profile
                    .companion_markers
                    .iter()
                    .any(|m| lower.contains(m.as_str()))
        })
    }

    fn qualifies(&self, role: Role, texts: &[String]) -> bool {
        if role.excludes_locations() && self.is_location(texts) {
            return false;
        }
        match role {
            Role::PickupLocation | Role::DropoffLocation => self.is_location(texts),
            Role::Date => self.is_date(texts),
            Role::Hour => self.is_hour(texts),
            Role::Minute => self.is_minute(texts),
            Role::CompanionCount => self.is_companion(texts),
        }
    }

    /// Assign a single role. Grows `claimed` by at most one.
    ///
    /// Returns the winner and whether other candidates also qualified.
    pub fn classify_role(
        &self,
        role: Role,
        candidates: &[Candidate],
        claimed: &mut ClaimedRoles,
    ) -> Option<(ElementHandle, bool)> {
        if claimed.contains(role) {
            return None;
        }
        let mut eligible = candidates
            .iter()
            .filter(|c| claimed.role_of(&c.handle).is_none())
            .filter(|c| self.qualifies(role, &c.texts));
        let winner = eligible.next()?;
        let losers: Vec<&str> = eligible.map(|c| c.handle.id.as_str()).collect();
        // a second location candidate is the dropoff, not a tie
        let ambiguous = !losers.is_empty() && role != Role::PickupLocation;
        if ambiguous {
            warn!(%role, winner = %winner.handle.id, ?losers, "ambiguous role, first in document order wins");
        }
        claimed.claim(role, &winner.handle);
        debug!(%role, id = %winner.handle.id, "role claimed");
        Some((winner.handle.clone(), ambiguous))
    }

    /// Run every role pass over `candidates` (in document order)
    pub fn classify(&self, candidates: &[Candidate], claimed: &mut ClaimedRoles) -> Classification {
        let mut result = Classification::default();
        for role in Role::ALL {
            if let Some((handle, ambiguous)) = self.classify_role(role, candidates, claimed) {
                if ambiguous {
                    result.ambiguous.push(role);
                }
                result.roles.insert(role, handle);
            }
        }
        result
    }

    /// Read each control's text through the driver, then classify
    pub async fn classify_controls<D: AutomationDriver + ?Sized>(
        &self,
        driver: &D,
        controls: Vec<ElementHandle>,
        claimed: &mut ClaimedRoles,
    ) -> RidebookResult<Classification> {
        let mut candidates = Vec::with_capacity(controls.len());
        for handle in controls {
            candidates.push(Candidate::read(driver, handle).await?);
        }
        Ok(self.classify(&candidates, claimed))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn candidate(id: &str, items: &[&str]) -> Candidate {
        Candidate::new(ElementHandle::new(id, "select"), texts(items))
    }

    mod predicate_tests {
        use super::*;

        #[test]
        fn test_date_predicates() {
            let c = ContentClassifier::default();
            assert!(c.is_date(&texts(&["2025/06/19"])));
            assert!(c.is_date(&texts(&["06-19"])));
            assert!(c.is_date(&texts(&["6月19日(四)"])));
            assert!(!c.is_date(&texts(&["8", "13"])));
            assert!(!c.is_date(&texts(&["1人(免費)"])));
        }

        #[test]
        fn test_hour_predicates() {
            let c = ContentClassifier::default();
            assert!(c.is_hour(&texts(&["8", "13", "16", "19"])));
            assert!(c.is_hour(&texts(&["請選擇", "08:00", "08:30"])));
            assert!(!c.is_hour(&texts(&["00", "05", "40", "55"])));
            // every value is also a minute step, so the set is not distinguishable
            assert!(!c.is_hour(&texts(&["10", "15", "20"])));
            assert!(!c.is_hour(&texts(&["8", "45"])));
            assert!(!c.is_hour(&texts(&["請選擇"])));
        }

        #[test]
        fn test_minute_predicates() {
            let c = ContentClassifier::default();
            assert!(c.is_minute(&texts(&["00", "05", "40", "55"])));
            assert!(c.is_minute(&texts(&["--", "0", "30"])));
            assert!(!c.is_minute(&texts(&["8", "13"])));
            assert!(!c.is_minute(&texts(&["60"])));
            assert!(!c.is_minute(&texts(&[])));
        }

        #[test]
        fn test_location_and_companion() {
            let c = ContentClassifier::default();
            assert!(c.is_location(&texts(&["醫療院所", "住家"])));
            assert!(c.is_companion(&texts(&["0人", "1人(免費)", "2人"])));
            assert!(!c.is_companion(&texts(&["人數"])));
        }

        #[test]
        fn test_location_excluded_from_numeric_roles() {
            let c = ContentClassifier::default();
            // looks date-like but names a place category
            let mixed = texts(&["2025/06/19", "住家"]);
            assert!(c.is_date(&mixed));
            assert!(!c.qualifies(Role::Date, &mixed));
        }
    }

    mod classify_tests {
        use super::*;

        #[test]
        fn test_date_hour_minute_in_one_pass() {
            let c = ContentClassifier::default();
            let candidates = vec![
                candidate("a", &["2025/06/19", "2025/06/20"]),
                candidate("b", &["8", "13", "16", "19"]),
                candidate("c", &["00", "05", "40", "55"]),
            ];
            let mut claimed = ClaimedRoles::new();
            let result = c.classify(&candidates, &mut claimed);
            assert_eq!(result.get(Role::Date).unwrap().id, "a");
            assert_eq!(result.get(Role::Hour).unwrap().id, "b");
            assert_eq!(result.get(Role::Minute).unwrap().id, "c");
            assert!(result.ambiguous.is_empty());
            assert_eq!(claimed.len(), 3);
        }

        #[test]
        fn test_location_roles_in_document_order() {
            let c = ContentClassifier::default();
            let candidates = vec![
                candidate("pickup", &["請選擇", "醫療院所", "住家"]),
                candidate("dropoff", &["請選擇", "醫療院所", "住家"]),
                candidate("companion", &["0人", "1人(免費)"]),
            ];
            let mut claimed = ClaimedRoles::new();
            let result = c.classify(&candidates, &mut claimed);
            assert_eq!(result.get(Role::PickupLocation).unwrap().id, "pickup");
            assert_eq!(result.get(Role::DropoffLocation).unwrap().id, "dropoff");
            assert_eq!(result.get(Role::CompanionCount).unwrap().id, "companion");
            assert!(result.ambiguous.is_empty());
        }

        #[test]
        fn test_tie_goes_to_document_order() {
            let c = ContentClassifier::default();
            let candidates = vec![
                candidate("first", &["2025/06/19"]),
                candidate("second", &["2025/06/20"]),
            ];
            let mut claimed = ClaimedRoles::new();
            let result = c.classify(&candidates, &mut claimed);
            assert_eq!(result.get(Role::Date).unwrap().id, "first");
            assert_eq!(result.ambiguous, vec![Role::Date]);
            assert!(claimed.role_of(&candidates[1].handle).is_none());
        }

        #[test]
        fn test_claimed_control_not_reconsidered() {
            let c = ContentClassifier::default();
            let candidates = vec![candidate("only", &["00", "30"])];
            let mut claimed = ClaimedRoles::new();
            assert!(claimed.claim(Role::Hour, &candidates[0].handle));
            assert!(c.classify_role(Role::Minute, &candidates, &mut claimed).is_none());
            assert_eq!(claimed.len(), 1);
        }

        #[test]
        fn test_claimed_role_not_reassigned() {
            let c = ContentClassifier::default();
            let candidates = vec![candidate("a", &["2025/06/19"])];
            let mut claimed = ClaimedRoles::new();
            claimed.claim(Role::Date, &ElementHandle::new("elsewhere", "select"));
            assert!(c.classify_role(Role::Date, &candidates, &mut claimed).is_none());
        }

        #[test]
        fn test_reset() {
            let mut claimed = ClaimedRoles::new();
            claimed.claim(Role::Date, &ElementHandle::new("a", "select"));
            claimed.reset();
            assert!(claimed.is_empty());
        }

        #[tokio::test]
        async fn test_classify_controls_reads_options() {
            use crate::locator::Locator;
            use crate::mock::MockDriver;

            let driver = MockDriver::from_html(
                r#"<html><body>
                <select><option>2025/06/19</option><option>2025/06/20</option></select>
                <select><option>8</option><option>13</option><option>16</option><option>19</option></select>
                <select><option>00</option><option>05</option><option>40</option><option>55</option></select>
                </body></html>"#,
            );
            let controls = driver.query_all(&Locator::css("select"), None).await.unwrap();
            let mut claimed = ClaimedRoles::new();
            let result = ContentClassifier::default()
                .classify_controls(&driver, controls.clone(), &mut claimed)
                .await
                .unwrap();
            assert_eq!(result.get(Role::Date), Some(&controls[0]));
            assert_eq!(result.get(Role::Hour), Some(&controls[1]));
            assert_eq!(result.get(Role::Minute), Some(&controls[2]));
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn option_strategy() -> impl Strategy<Value = String> {
            prop_oneof![
                (0u32..60).prop_map(|v| format!("{v:02}")),
                (6u32..23).prop_map(|v| v.to_string()),
                Just("2025/06/19".to_string()),
                Just("住家".to_string()),
                Just("1人(免費)".to_string()),
                Just("請選擇".to_string()),
            ]
        }

        proptest! {
            #[test]
            fn prop_each_role_pass_claims_at_most_one(
                sets in prop::collection::vec(prop::collection::vec(option_strategy(), 0..6), 0..6)
            ) {
                let c = ContentClassifier::default();
                let candidates: Vec<Candidate> = sets
                    .iter()
                    .enumerate()
                    .map(|(i, opts)| Candidate::new(ElementHandle::new(format!("c{i}"), "select"), opts.clone()))
                    .collect();
                let mut claimed = ClaimedRoles::new();
                for role in Role::ALL {
                    let before = claimed.len();
                    let assigned = c.classify_role(role, &candidates, &mut claimed);
                    let after = claimed.len();
                    prop_assert!(after == before || after == before + 1);
                    prop_assert_eq!(assigned.is_some(), after == before + 1);
                }
                // no control backs two roles
                let mut ids: Vec<&String> = claimed.by_role.values().collect();
                let total = ids.len();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), total);
            }
        }
    }
}
