//! Ridebook CLI Library
//!
//! Command-line shell around the `ridebook` flows: argument parsing,
//! logging setup, configuration loading and JSON output.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{
    BrowserArgs, Cli, ColorArg, Commands, ConfigArgs, CredentialArgs, LogFormatArg, ReserveArgs,
    ScrapeArgs,
};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{write_json, Reporter};
pub use runner::{load_config, Runner};
