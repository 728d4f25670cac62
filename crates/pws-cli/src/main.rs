mod cli;
mod commands;
mod observability;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use pws_webhooks::config::loader::load_config;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            print_error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

/// Returns `false` when the command ran but its check failed.
async fn run() -> Result<bool> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Sign(args) => commands::sign::sign(args)?,
        Commands::Verify(args) => return commands::sign::verify(args),
        Commands::Send(args) => {
            let cfg = load(&cli)?;
            observability::init_tracing_with_level(&cfg.logging.level);
            commands::send::send(&cfg, args).await?;
        }
        Commands::CheckConfig => {
            let cfg = load(&cli)?;
            commands::check::check_config(&cfg)?;
        }
    }
    Ok(true)
}

fn load(cli: &Cli) -> Result<pws_webhooks::WebhooksConfig> {
    let path = cli.config.as_ref().map(|p| p.to_string_lossy().to_string());
    load_config(path.as_deref()).context("Failed to load config")
}
