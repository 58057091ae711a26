//! CLI for the tierwatch search scheduler.

mod commands;
mod control_socket;
mod fixtures;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use tierwatch_core::config::{self, Settings};
use tierwatch_core::control::{control_socket_path_for, default_control_socket_path};
use tierwatch_core::engine::Engine;
use tierwatch_core::store::StateStore;
use tierwatch_core::upstream::Upstream;

use commands::{
    control_request, run_check_config, run_completions, run_forwarded, run_history,
    run_interventions, run_issues, run_local, run_man, run_scheduler, run_status,
};

/// Top-level CLI for tierwatch.
#[derive(Debug, Parser)]
#[command(name = "tierwatch")]
#[command(about = "tierwatch: tiered, budgeted search scheduling for wanted media", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/tierwatch/config.toml, created if missing).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// State database (default: ~/.local/state/tierwatch/state.db).
    #[arg(long, global = true, value_name = "PATH")]
    pub state_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the search and queue cycles until interrupted.
    Run {
        /// Run one search cycle and one queue cycle, then exit.
        #[arg(long)]
        once: bool,
        /// Fixture directory standing in for the upstream instances.
        #[arg(long, value_name = "DIR")]
        fixtures: PathBuf,
    },

    /// Show tier counts, budget and open work.
    Status,

    /// List interventions (pending ones unless --all).
    Interventions {
        #[arg(long)]
        all: bool,
    },

    /// Decide an intervention: dismiss, reset or acknowledge.
    Decide {
        /// Intervention id, e.g. urgent:tv:episode:42.
        id: String,
        decision: String,
    },

    /// Search one item now, ignoring its cooldown.
    Search {
        /// Item key, e.g. tv:episode:42.
        key: String,
        /// Fixture directory, used only when no scheduler is running.
        #[arg(long, value_name = "DIR")]
        fixtures: PathBuf,
    },

    /// List current queue issues.
    Issues,

    /// Remove and blocklist a queue issue's download now.
    Resolve {
        /// Issue key, e.g. tv:dl-123.
        key: String,
        /// Fixture directory, used only when no scheduler is running.
        #[arg(long, value_name = "DIR")]
        fixtures: PathBuf,
    },

    /// Show recent searches (or finds with --finds).
    History {
        #[arg(long, default_value = "20", value_name = "N")]
        limit: usize,
        #[arg(long)]
        finds: bool,
    },

    /// Validate the config and print the derived pacing.
    CheckConfig,

    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the man page (roff).
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        match cli.command {
            CliCommand::Completions { shell } => return run_completions(shell),
            CliCommand::Man => return run_man(),
            _ => {}
        }

        let cfg = match &cli.config {
            Some(path) => config::load_from_path(path)?,
            None => config::load_or_init()?,
        };
        let settings = Settings::from_config(&cfg).context("invalid config")?;
        tracing::debug!("loaded config: {:?}", cfg);

        if let CliCommand::CheckConfig = cli.command {
            return run_check_config(&settings);
        }

        // A running scheduler owns the state; write commands go to it.
        let socket_path = match &cli.state_db {
            Some(path) => control_socket_path_for(path),
            None => default_control_socket_path().context("control socket path")?,
        };
        let request = control_request(&cli.command)?;
        if let Some(request) = &request {
            if run_forwarded(&socket_path, request).await? {
                return Ok(());
            }
        }
        if let CliCommand::Run { .. } = cli.command {
            control_socket::ensure_not_running(&socket_path).await?;
        }

        let store = match &cli.state_db {
            Some(path) => StateStore::open_at(path).await?,
            None => StateStore::open_default().await?,
        };

        let upstreams: Vec<Arc<dyn Upstream>> = match &cli.command {
            CliCommand::Run { fixtures, .. }
            | CliCommand::Search { fixtures, .. }
            | CliCommand::Resolve { fixtures, .. } => {
                fixtures::load_upstreams(fixtures, &settings).await?
            }
            _ => Vec::new(),
        };
        let engine = Engine::load(settings, store, upstreams, Utc::now()).await?;

        if let Some(request) = &request {
            return run_local(&engine, request).await;
        }
        match cli.command {
            CliCommand::Run { once, .. } => run_scheduler(engine, once, &socket_path).await?,
            CliCommand::Status => run_status(&engine).await?,
            CliCommand::Interventions { all } => run_interventions(&engine, all).await?,
            CliCommand::Issues => run_issues(&engine).await?,
            CliCommand::History { limit, finds } => run_history(&engine, limit, finds).await?,
            CliCommand::Decide { .. }
            | CliCommand::Search { .. }
            | CliCommand::Resolve { .. }
            | CliCommand::CheckConfig
            | CliCommand::Completions { .. }
            | CliCommand::Man => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
