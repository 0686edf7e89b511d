//! piggy CLI - personal finance analytics
//!
//! Usage:
//!   piggy init                       Initialize database
//!   piggy seed                       Insert demo purchase history
//!   piggy serve --port 3000          Start web server
//!   piggy weekly-suggestions         Run the weekly batch job

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Seed { user } => commands::cmd_seed(&cli.db, &user),
        Commands::Serve { port, host } => commands::cmd_serve(&cli.db, &host, port).await,
        Commands::WeeklySuggestions {
            week,
            user,
            dry_run,
            concurrency,
        } => {
            let code = commands::cmd_weekly_suggestions(
                &cli.db,
                week.as_deref(),
                user.as_deref(),
                dry_run,
                concurrency,
            )
            .await;
            std::process::exit(code);
        }
    }
}
