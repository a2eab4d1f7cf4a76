//! Guardian CLI Binary
//!
//! Command-line interface for the guardian agent registry and its durable state.

use anyhow::Context;
use clap::Parser;
use guardian_core::logging::init_logging;
use guardian_core::tooling::cli::{Cli, CliContext};
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let config = cli.resolve_config().context("loading configuration")?;
    init_logging(Some(&config.logging)).context("initializing logging")?;

    let context = CliContext::new(config, cli.memory)
        .await
        .context("initializing guardian state")?;

    Ok(context.execute(&cli.command).await?)
}
