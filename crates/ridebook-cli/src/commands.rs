//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{ColorChoice, LogFormat};

/// Ridebook: book rides and collect dispatched orders from the booking site
#[derive(Parser, Debug)]
#[command(name = "ridebook")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// YAML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true, env = "RIDEBOOK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and make one reservation
    Reserve(ReserveArgs),

    /// Collect dispatched orders from the order list
    Scrape(ScrapeArgs),

    /// Show or check configuration
    Config(ConfigArgs),
}

/// Login credentials; read from the environment when not given
#[derive(Args, Debug, Default)]
pub struct CredentialArgs {
    /// National ID used to log in
    #[arg(long, env = "RIDEBOOK_ID", hide_env_values = true)]
    pub id: Option<String>,

    /// Password used to log in
    #[arg(long, env = "RIDEBOOK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Browser launch overrides
#[derive(Args, Debug, Default)]
pub struct BrowserArgs {
    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Chromium executable
    #[arg(long)]
    pub chrome: Option<PathBuf>,

    /// Disable the Chromium sandbox (containers)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Directory for per-step screenshots
    #[arg(long)]
    pub screenshots: Option<PathBuf>,
}

/// Arguments for the reserve command
#[derive(Args, Debug)]
pub struct ReserveArgs {
    /// Login credentials
    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Browser options
    #[command(flatten)]
    pub browser: BrowserArgs,

    /// Hour option to pick (overrides config)
    #[arg(long)]
    pub hour: Option<String>,

    /// Minute option to pick (overrides config)
    #[arg(long)]
    pub minute: Option<String>,
}

/// Arguments for the scrape command
#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// Login credentials
    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// Browser options
    #[command(flatten)]
    pub browser: BrowserArgs,

    /// Replay saved order-list pages instead of a live browser.
    /// Repeat for multi-page lists; pages follow "next" in the given order.
    #[arg(long, value_name = "HTML")]
    pub fixture: Vec<PathBuf>,

    /// Pagination iteration ceiling (overrides config)
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Write the JSON result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Only validate, print nothing but the verdict
    #[arg(long)]
    pub check: bool,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Auto-detect
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// JSON lines
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}
