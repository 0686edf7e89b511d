//! CLI parsing tests

use clap::Parser;

use crate::cli::{Cli, Commands};

#[test]
fn test_parse_weekly_suggestions_flags() {
    let cli = Cli::parse_from([
        "piggy",
        "weekly-suggestions",
        "--week",
        "2025-11-10",
        "--user",
        "u1",
        "--dry-run",
        "--concurrency",
        "4",
    ]);

    match cli.command {
        Commands::WeeklySuggestions {
            week,
            user,
            dry_run,
            concurrency,
        } => {
            assert_eq!(week.as_deref(), Some("2025-11-10"));
            assert_eq!(user.as_deref(), Some("u1"));
            assert!(dry_run);
            assert_eq!(concurrency, Some(4));
        }
        _ => panic!("expected weekly-suggestions command"),
    }
}

#[test]
fn test_parse_defaults() {
    let cli = Cli::parse_from(["piggy", "weekly-suggestions"]);
    assert_eq!(cli.db.to_string_lossy(), "piggy.db");
    assert!(!cli.verbose);

    match cli.command {
        Commands::WeeklySuggestions {
            week,
            user,
            dry_run,
            concurrency,
        } => {
            assert!(week.is_none());
            assert!(user.is_none());
            assert!(!dry_run);
            assert!(concurrency.is_none());
        }
        _ => panic!("expected weekly-suggestions command"),
    }
}

#[test]
fn test_parse_serve() {
    let cli = Cli::parse_from(["piggy", "--db", "/tmp/x.db", "serve", "--port", "8080"]);
    assert_eq!(cli.db.to_string_lossy(), "/tmp/x.db");
    match cli.command {
        Commands::Serve { port, host } => {
            assert_eq!(port, 8080);
            assert_eq!(host, "127.0.0.1");
        }
        _ => panic!("expected serve command"),
    }
}
