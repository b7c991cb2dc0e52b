//! Ridebook CLI: book rides and collect dispatched orders
//!
//! ## Usage
//!
//! ```bash
//! ridebook reserve --id A123456789             # password from RIDEBOOK_PASSWORD
//! ridebook scrape --config site.yaml           # live order list
//! ridebook scrape --fixture orders.html        # replay a saved page
//! ridebook config                              # print effective configuration
//! ```

use clap::Parser;
use ridebook_cli::{load_config, Cli, CliConfig, CliError, CliResult, Runner, Verbosity};
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    config.init_tracing();

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
        .with_log_format(cli.log_format.into())
}

fn run(cli: Cli, config: &CliConfig) -> CliResult<()> {
    let settings = load_config(cli.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Io)?;
    runtime.block_on(Runner::new(config).run(cli.command, settings))
}
