//! Command execution

use ridebook::mock::{MockDriver, MockPage};
use ridebook::{scrape_loaded_orders, Credentials, RidebookConfig};
use std::path::Path;
use tracing::info;

use crate::commands::{BrowserArgs, Commands, ConfigArgs, CredentialArgs, ReserveArgs, ScrapeArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{write_json, Reporter};

/// Load the YAML file at `path`, or the built-in defaults
pub fn load_config(path: Option<&Path>) -> CliResult<RidebookConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            Ok(RidebookConfig::load(path)?)
        }
        None => Ok(RidebookConfig::default()),
    }
}

/// Merge command-line credentials over the file's
fn apply_credentials(config: &mut RidebookConfig, args: &CredentialArgs) {
    let current = &config.credentials;
    let id = args.id.clone().unwrap_or_else(|| current.id.clone());
    let password = args
        .password
        .clone()
        .unwrap_or_else(|| current.password.clone());
    config.credentials = Credentials::new(id, password);
}

fn require_credentials(config: &RidebookConfig) -> CliResult<()> {
    if config.credentials.is_complete() {
        Ok(())
    } else {
        Err(CliError::config(
            "credentials missing: pass --id/--password or set RIDEBOOK_ID/RIDEBOOK_PASSWORD",
        ))
    }
}

fn apply_browser(config: &mut RidebookConfig, args: &BrowserArgs) {
    let mut browser = config.browser.clone();
    if args.headed {
        browser = browser.headless(false);
    }
    if let Some(ref chrome) = args.chrome {
        browser = browser.executable_path(chrome.display().to_string());
    }
    if args.no_sandbox {
        browser = browser.no_sandbox();
    }
    config.browser = browser;
    if let Some(ref dir) = args.screenshots {
        config.diagnostics.screenshot_dir = Some(dir.clone());
    }
}

fn read_fixtures(paths: &[std::path::PathBuf]) -> CliResult<Vec<MockPage>> {
    paths
        .iter()
        .map(|path| Ok(MockPage::new(std::fs::read_to_string(path)?)))
        .collect()
}

/// Runs one parsed command
#[derive(Debug)]
pub struct Runner {
    reporter: Reporter,
}

impl Runner {
    /// Create a runner for the given CLI settings
    #[must_use]
    pub fn new(cli: &CliConfig) -> Self {
        Self {
            reporter: Reporter::new(cli.color.should_color(), cli.verbosity.is_quiet()),
        }
    }

    /// Execute `command` against `config`
    pub async fn run(&self, command: Commands, config: RidebookConfig) -> CliResult<()> {
        match command {
            Commands::Reserve(args) => self.reserve(args, config).await,
            Commands::Scrape(args) => self.scrape(args, config).await,
            Commands::Config(args) => show_config(&args, &config),
        }
    }

    async fn reserve(&self, args: ReserveArgs, mut config: RidebookConfig) -> CliResult<()> {
        apply_credentials(&mut config, &args.credentials);
        apply_browser(&mut config, &args.browser);
        if let Some(hour) = args.hour {
            config.reservation.hour = hour;
        }
        if let Some(minute) = args.minute {
            config.reservation.minute = minute;
        }
        config.validate()?;
        require_credentials(&config)?;

        let spinner = self.reporter.spinner("booking");
        let outcome = live::reserve(&config).await;
        spinner.finish_and_clear();
        let outcome = outcome?;

        self.reporter.reservation_summary(&outcome);
        write_json(&outcome, None)?;
        if outcome.success {
            Ok(())
        } else {
            Err(CliError::flow_incomplete(
                outcome
                    .failed_step
                    .unwrap_or_else(|| String::from("unknown step")),
            ))
        }
    }

    async fn scrape(&self, args: ScrapeArgs, mut config: RidebookConfig) -> CliResult<()> {
        if let Some(max) = args.max_iterations {
            if max == 0 {
                return Err(CliError::invalid_argument("--max-iterations must be at least 1"));
            }
            config.scrape.max_iterations = max;
        }
        apply_browser(&mut config, &args.browser);

        let outcome = if args.fixture.is_empty() {
            apply_credentials(&mut config, &args.credentials);
            config.validate()?;
            require_credentials(&config)?;
            let spinner = self.reporter.spinner("collecting dispatched orders");
            let outcome = live::scrape(&config).await;
            spinner.finish_and_clear();
            outcome?
        } else {
            config.validate()?;
            info!(pages = args.fixture.len(), "replaying saved pages");
            let driver = MockDriver::with_pages(read_fixtures(&args.fixture)?);
            scrape_loaded_orders(&driver, &config).await?
        };

        self.reporter.scrape_summary(&outcome);
        write_json(&outcome, args.output.as_deref())?;
        if outcome.success {
            Ok(())
        } else {
            Err(CliError::flow_incomplete(
                outcome
                    .failed_step
                    .unwrap_or_else(|| String::from("order list not reached")),
            ))
        }
    }
}

fn show_config(args: &ConfigArgs, config: &RidebookConfig) -> CliResult<()> {
    config.validate()?;
    if args.check {
        println!("configuration OK");
    } else {
        print!("{}", config.to_yaml()?);
    }
    Ok(())
}

#[cfg(feature = "browser")]
mod live {
    use ridebook::{
        run_reservation_flow, scrape_dispatched_orders, ChromiumDriver, ReservationOutcome,
        RidebookConfig, ScrapeOutcome,
    };
    use tracing::warn;

    use crate::error::CliResult;

    async fn close(driver: ChromiumDriver) {
        if let Err(error) = driver.close().await {
            warn!(%error, "browser did not close cleanly");
        }
    }

    pub async fn reserve(config: &RidebookConfig) -> CliResult<ReservationOutcome> {
        let driver = ChromiumDriver::launch(config.browser.clone()).await?;
        let outcome = run_reservation_flow(&driver, config).await;
        close(driver).await;
        Ok(outcome?)
    }

    pub async fn scrape(config: &RidebookConfig) -> CliResult<ScrapeOutcome> {
        let driver = ChromiumDriver::launch(config.browser.clone()).await?;
        let outcome = scrape_dispatched_orders(&driver, config).await;
        close(driver).await;
        Ok(outcome?)
    }
}

#[cfg(not(feature = "browser"))]
mod live {
    use ridebook::{ReservationOutcome, RidebookConfig, ScrapeOutcome};

    use crate::error::{CliError, CliResult};

    pub async fn reserve(_config: &RidebookConfig) -> CliResult<ReservationOutcome> {
        Err(CliError::BrowserUnavailable)
    }

    pub async fn scrape(_config: &RidebookConfig) -> CliResult<ScrapeOutcome> {
        Err(CliError::BrowserUnavailable)
    }
}
