//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// piggy - personal finance analytics service
#[derive(Parser)]
#[command(name = "piggy")]
#[command(about = "Purchase analytics: predictions, tips, deals, and weekly suggestions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "piggy.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Insert a deterministic demo purchase history
    Seed {
        /// User to seed (defaults to demo_user)
        #[arg(long, default_value = "demo_user")]
        user: String,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Run the weekly alternative-suggestions job
    ///
    /// Exit codes: 0 all users succeeded (or no users), 1 at least one
    /// user failed, 2 configuration error.
    WeeklySuggestions {
        /// Week to process (YYYY-MM-DD, an ISO-week Monday).
        /// Default: the most recent completed week
        #[arg(long)]
        week: Option<String>,

        /// Process only this user. Default: all users active in the week
        #[arg(long)]
        user: Option<String>,

        /// Run without writing reports
        #[arg(long)]
        dry_run: bool,

        /// Parallel users
        #[arg(long)]
        concurrency: Option<usize>,
    },
}
