//! Result output and progress reporting
//!
//! JSON results go to stdout (or a file); everything meant for a human goes
//! to stderr so the two can be piped separately.

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use ridebook::{ReservationOutcome, ScrapeOutcome};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::error::CliResult;

/// Progress and summary reporter
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl Reporter {
    /// Create a new reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            use_color,
            quiet,
        }
    }

    /// Spinner shown while a live flow runs; hidden in quiet mode
    #[must_use]
    pub fn spinner(&self, message: &str) -> ProgressBar {
        if self.quiet || !self.term.is_term() {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }

    fn line(&self, ok: bool, text: &str) {
        if self.quiet {
            return;
        }
        let mark = match (ok, self.use_color) {
            (true, true) => style("✓").green().to_string(),
            (false, true) => style("✗").red().to_string(),
            (true, false) => String::from("OK"),
            (false, false) => String::from("FAILED"),
        };
        // stderr closed is not worth failing the run over
        let _ = self.term.write_line(&format!("{mark} {text}"));
    }

    /// One-line summary of a reservation attempt
    pub fn reservation_summary(&self, outcome: &ReservationOutcome) {
        if outcome.success {
            self.line(true, "reservation completed");
        } else {
            let step = outcome.failed_step.as_deref().unwrap_or("unknown step");
            self.line(false, &format!("reservation stopped at {step}"));
        }
        self.screenshot_note(outcome.screenshots.len());
    }

    /// One-line summary of a dispatch scrape
    pub fn scrape_summary(&self, outcome: &ScrapeOutcome) {
        let stop = outcome
            .stop_reason
            .map_or_else(|| String::from("not started"), |r| r.to_string());
        let text = format!(
            "{} dispatched order(s) in {} page scan(s), stopped: {stop}",
            outcome.records.len(),
            outcome.iterations,
        );
        self.line(outcome.success, &text);
        self.screenshot_note(outcome.screenshots.len());
    }

    fn screenshot_note(&self, count: usize) {
        if count > 0 && !self.quiet {
            let _ = self
                .term
                .write_line(&format!("  {count} screenshot(s) written"));
        }
    }
}

/// Write `value` as pretty JSON to `path`, or to stdout
pub fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => std::fs::write(path, format!("{json}\n"))?,
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_spinner_is_hidden() {
        let reporter = Reporter::new(false, true);
        assert!(reporter.spinner("working").is_hidden());
    }

    #[test]
    fn test_write_json_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let outcome = ReservationOutcome {
            success: true,
            ..ReservationOutcome::default()
        };
        write_json(&outcome, Some(&path)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["success"], serde_json::Value::Bool(true));
        assert!(value.get("failedStep").is_some());
    }

    #[test]
    fn test_summaries_do_not_panic() {
        let reporter = Reporter::new(false, false);
        reporter.reservation_summary(&ReservationOutcome::default());
    }
}
