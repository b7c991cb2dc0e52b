//! Runtime configuration.
//!
//! Loaded from YAML; every section has defaults so an empty file is a valid
//! config. Credentials are never written back out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::classifier::ClassifierProfile;
use crate::committer::DEFAULT_SETTLE_MS;
use crate::driver::DriverConfig;
use crate::pagination::DEFAULT_MAX_ITERATIONS;
use crate::record::StatusKeywords;
use crate::result::{RidebookError, RidebookResult};
use crate::site::SiteLocators;
use crate::wait::{DEFAULT_ELEMENT_TIMEOUT_MS, DEFAULT_NAVIGATION_TIMEOUT_MS};

/// Where the booking site lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Landing page with the login form
    pub base_url: String,
    /// Order list page; when unset the list is reached through its link
    pub orders_url: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://www.ntpc.ltc-car.org/"),
            orders_url: None,
        }
    }
}

/// Login credentials
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// National ID
    pub id: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    #[must_use]
    pub fn new(id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            password: password.into(),
        }
    }

    /// Whether both parts are present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("id", &self.id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Timeouts and delays in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Waiting for an element to appear
    pub element_ms: u64,
    /// Waiting for a page load state
    pub navigation_ms: u64,
    /// Pause after a commit, click or scroll
    pub settle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            element_ms: DEFAULT_ELEMENT_TIMEOUT_MS,
            navigation_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

/// A yes/no question on the booking form and the answer to give
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    /// Text identifying the question
    pub prompt: String,
    /// Answer label to click
    pub answer: String,
}

impl QuestionAnswer {
    /// Create a question/answer pair
    #[must_use]
    pub fn new(prompt: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            answer: answer.into(),
        }
    }
}

/// What to book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    /// Pickup location category
    pub pickup_category: String,
    /// Text typed into the pickup search box
    pub hospital_query: String,
    /// Dropoff location category
    pub dropoff_category: String,
    /// Hour option label
    pub hour: String,
    /// Minute option label
    pub minute: String,
    /// Companion option label
    pub companions: String,
    /// Yes/no questions in page order
    pub answers: Vec<QuestionAnswer>,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            pickup_category: String::from("醫療院所"),
            hospital_query: String::from("亞東紀念醫院"),
            dropoff_category: String::from("住家"),
            hour: String::from("16"),
            minute: String::from("40"),
            companions: String::from("1人(免費)"),
            answers: vec![
                QuestionAnswer::new("前後30分鐘", "不同意"),
                QuestionAnswer::new("共乘", "否"),
                QuestionAnswer::new("搭乘輪椅", "是"),
                QuestionAnswer::new("大型輪椅", "否"),
            ],
        }
    }
}

/// Order list harvesting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Pagination iteration ceiling
    pub max_iterations: usize,
    /// Status keywords per record state
    pub status_keywords: StatusKeywords,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            status_keywords: StatusKeywords::default(),
        }
    }
}

/// Diagnostic output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Directory for per-step screenshots; disabled when unset
    pub screenshot_dir: Option<PathBuf>,
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidebookConfig {
    /// Site location
    pub site: SiteConfig,
    /// Login credentials (never serialized)
    #[serde(skip_serializing)]
    pub credentials: Credentials,
    /// Timeouts
    pub timeouts: TimeoutConfig,
    /// Booking parameters
    pub reservation: ReservationConfig,
    /// Order list parameters
    pub scrape: ScrapeConfig,
    /// Control classification tables
    pub classifier: ClassifierProfile,
    /// Locator tables
    pub locators: SiteLocators,
    /// Diagnostic output
    pub diagnostics: DiagnosticsConfig,
    /// Browser launch options
    pub browser: DriverConfig,
}

impl RidebookConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate YAML
    pub fn from_yaml_str(yaml: &str) -> RidebookResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load(path: &Path) -> RidebookResult<Self> {
        let yaml = fs::read_to_string(path).map_err(|e| {
            RidebookError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML (credentials omitted)
    pub fn to_yaml(&self) -> RidebookResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> RidebookResult<()> {
        if !(self.site.base_url.starts_with("http://")
            || self.site.base_url.starts_with("https://")
            || self.site.base_url.starts_with("file://"))
        {
            return Err(RidebookError::config(format!(
                "site.base_url must be an http(s) or file URL, got '{}'",
                self.site.base_url
            )));
        }
        if self.classifier.hour_min > self.classifier.hour_max || self.classifier.hour_max > 23 {
            return Err(RidebookError::config(format!(
                "classifier hour range {}..={} is not within 0..=23",
                self.classifier.hour_min, self.classifier.hour_max
            )));
        }
        if self.timeouts.element_ms == 0 {
            return Err(RidebookError::config("timeouts.element_ms must be positive"));
        }
        for chain in self.locators.chains() {
            chain.validate()?;
        }
        Ok(())
    }

    /// Set credentials
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the landing page
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.site.base_url = url.into();
        self
    }

    /// Set the pagination ceiling
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.scrape.max_iterations = max_iterations;
        self
    }

    /// Set timeouts
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Enable per-step screenshots
    #[must_use]
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics.screenshot_dir = Some(dir.into());
        self
    }

    /// Set browser options
    #[must_use]
    pub fn with_browser(mut self, browser: DriverConfig) -> Self {
        self.browser = browser;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_empty_yaml_is_default() {
            let config = RidebookConfig::from_yaml_str("{}").unwrap();
            assert_eq!(config, RidebookConfig::default());
            assert_eq!(config.scrape.max_iterations, 10);
            assert_eq!(config.reservation.hour, "16");
        }

        #[test]
        fn test_partial_sections() {
            let yaml = r#"
site:
  base_url: "https://example.test/"
scrape:
  max_iterations: 3
reservation:
  hour: "9"
  answers:
    - prompt: "共乘"
      answer: "是"
credentials:
  id: "A123456789"
  password: "secret"
"#;
            let config = RidebookConfig::from_yaml_str(yaml).unwrap();
            assert_eq!(config.site.base_url, "https://example.test/");
            assert_eq!(config.scrape.max_iterations, 3);
            assert_eq!(config.reservation.hour, "9");
            assert_eq!(config.reservation.minute, "40");
            assert_eq!(config.reservation.answers.len(), 1);
            assert!(config.credentials.is_complete());
        }

        #[test]
        fn test_credentials_not_serialized_or_printed() {
            let config = RidebookConfig::new().with_credentials(Credentials::new("A1", "hunter2"));
            let yaml = config.to_yaml().unwrap();
            assert!(!yaml.contains("hunter2"));
            assert!(!format!("{config:?}").contains("hunter2"));
        }

        #[test]
        fn test_malformed_yaml() {
            let err = RidebookConfig::from_yaml_str("scrape: [1, 2").unwrap_err();
            assert!(matches!(err, RidebookError::Yaml(_)));
        }
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn test_rejects_bad_url() {
            let err = RidebookConfig::new().with_base_url("ftp://x").validate().unwrap_err();
            assert!(matches!(err, RidebookError::Config { .. }));
        }

        #[test]
        fn test_rejects_bad_hour_range() {
            let mut config = RidebookConfig::new();
            config.classifier.hour_min = 20;
            config.classifier.hour_max = 8;
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_rejects_malformed_locator_override() {
            let mut config = RidebookConfig::new();
            config.locators.submit = crate::locator::LocatorChain::new("submit").text_eq("button", "");
            assert!(matches!(
                config.validate().unwrap_err(),
                RidebookError::InvalidLocator { .. }
            ));
        }
    }

    mod file_tests {
        use super::*;

        #[test]
        fn test_load_from_file() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "scrape:\n  max_iterations: 4").unwrap();
            let config = RidebookConfig::load(file.path()).unwrap();
            assert_eq!(config.scrape.max_iterations, 4);
        }

        #[test]
        fn test_load_missing_file() {
            let err = RidebookConfig::load(Path::new("/nonexistent/ridebook.yaml")).unwrap_err();
            assert!(matches!(err, RidebookError::Config { .. }));
        }

        #[test]
        fn test_builders() {
            let dir = tempfile::tempdir().unwrap();
            let config = RidebookConfig::new()
                .with_max_iterations(2)
                .with_screenshot_dir(dir.path())
                .with_timeouts(TimeoutConfig {
                    element_ms: 50,
                    navigation_ms: 50,
                    settle_ms: 0,
                });
            assert_eq!(config.scrape.max_iterations, 2);
            assert_eq!(config.diagnostics.screenshot_dir.as_deref(), Some(dir.path()));
            assert_eq!(config.timeouts.settle_ms, 0);
            config.validate().unwrap();
        }
    }
}
