//! `carina` application entry point.
//!
//! The binary uses `eyre` for opaque error handling at the application
//! boundary, converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/carina/config.toml` or path from `CARINA_CONFIG_PATH`)
//! 3. Environment variables (`CARINA_*`)
//! 4. Command-line arguments

use std::io::{self, Write};

use carina::commands::{self, Context};
use carina::config::{AppConfig, Cli, load_config};
use carina::error::Result as CarinaResult;
use clap::Parser;
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
const LOG_ENV_VAR: &str = "CARINA_LOG";

/// Application entry point.
///
/// Everything runs on a single-threaded runtime; commands never execute
/// concurrently.
fn main() -> EyreResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = load_config(&cli).map_err(Report::from)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(&cli, config)).map_err(Report::from)
}

/// Install the stderr log subscriber.
///
/// `--debug` enables debug output for this crate; otherwise `CARINA_LOG`
/// applies, defaulting to warnings only.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("carina=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
///
/// The token cache is flushed explicitly on success; on error the context's
/// cache is flushed when it is dropped.
async fn run(cli: &Cli, config: AppConfig) -> CarinaResult<()> {
    let mut ctx = Context::new(config, &cli.account.to_inputs(), DefaultEnv::new())?;

    if let Some(notice) = ctx.check_for_update().await {
        writeln!(io::stderr(), "{notice}")?;
    }

    let mut stdout = io::stdout().lock();
    commands::run(&mut ctx, &cli.command, &mut stdout).await?;
    stdout.flush()?;
    ctx.finish()
}
