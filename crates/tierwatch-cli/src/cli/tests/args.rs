//! Tests for argument parsing of every subcommand.

use std::path::Path;

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_run_once_with_fixtures() {
    let cli = parse(&["tierwatch", "run", "--once", "--fixtures", "/tmp/fx"]);
    match cli.command {
        CliCommand::Run { once, fixtures } => {
            assert!(once);
            assert_eq!(fixtures, Path::new("/tmp/fx"));
        }
        _ => panic!("expected Run"),
    }
}

#[test]
fn cli_parse_run_requires_fixtures() {
    assert!(Cli::try_parse_from(["tierwatch", "run"]).is_err());
}

#[test]
fn cli_parse_global_paths() {
    let cli = parse(&[
        "tierwatch",
        "status",
        "--config",
        "/etc/tierwatch.toml",
        "--state-db",
        "/var/lib/tierwatch/state.db",
    ]);
    assert!(matches!(cli.command, CliCommand::Status));
    assert_eq!(cli.config.as_deref(), Some(Path::new("/etc/tierwatch.toml")));
    assert_eq!(
        cli.state_db.as_deref(),
        Some(Path::new("/var/lib/tierwatch/state.db"))
    );
}

#[test]
fn cli_parse_interventions() {
    match parse(&["tierwatch", "interventions"]).command {
        CliCommand::Interventions { all } => assert!(!all),
        _ => panic!("expected Interventions"),
    }
    match parse(&["tierwatch", "interventions", "--all"]).command {
        CliCommand::Interventions { all } => assert!(all),
        _ => panic!("expected Interventions --all"),
    }
}

#[test]
fn cli_parse_decide() {
    match parse(&["tierwatch", "decide", "urgent:tv:episode:42", "reset"]).command {
        CliCommand::Decide { id, decision } => {
            assert_eq!(id, "urgent:tv:episode:42");
            assert_eq!(decision, "reset");
        }
        _ => panic!("expected Decide"),
    }
}

#[test]
fn cli_parse_search_and_resolve() {
    match parse(&["tierwatch", "search", "tv:episode:7", "--fixtures", "fx"]).command {
        CliCommand::Search { key, fixtures } => {
            assert_eq!(key, "tv:episode:7");
            assert_eq!(fixtures, Path::new("fx"));
        }
        _ => panic!("expected Search"),
    }
    match parse(&["tierwatch", "resolve", "tv:dl-1", "--fixtures", "fx"]).command {
        CliCommand::Resolve { key, .. } => assert_eq!(key, "tv:dl-1"),
        _ => panic!("expected Resolve"),
    }
}

#[test]
fn cli_parse_history() {
    match parse(&["tierwatch", "history"]).command {
        CliCommand::History { limit, finds } => {
            assert_eq!(limit, 20);
            assert!(!finds);
        }
        _ => panic!("expected History"),
    }
    match parse(&["tierwatch", "history", "--limit", "5", "--finds"]).command {
        CliCommand::History { limit, finds } => {
            assert_eq!(limit, 5);
            assert!(finds);
        }
        _ => panic!("expected History --finds"),
    }
}

#[test]
fn cli_parse_issues_and_check_config() {
    assert!(matches!(
        parse(&["tierwatch", "issues"]).command,
        CliCommand::Issues
    ));
    assert!(matches!(
        parse(&["tierwatch", "check-config"]).command,
        CliCommand::CheckConfig
    ));
}

#[test]
fn cli_parse_completions() {
    match parse(&["tierwatch", "completions", "bash"]).command {
        CliCommand::Completions { shell } => assert_eq!(shell, clap_complete::Shell::Bash),
        _ => panic!("expected Completions"),
    }
    assert!(Cli::try_parse_from(["tierwatch", "completions", "cmd.exe"]).is_err());
}

#[test]
fn cli_definition_is_consistent() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
