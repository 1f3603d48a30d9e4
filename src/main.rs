//! Fabrikate CLI entry point: argument parsing, logging setup, and
//! error display.

use clap::Parser;
use fabrikate::cli::Cli;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt().with_target(false).with_env_filter(filter).init();

    if let Err(err) = cli.execute().await {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}
