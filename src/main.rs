//! # opsb - operations console boards
//!
//! Kanban boards for an operations console whose records live in a hosted table
//! service. Three boards share one engine:
//!
//! - **Tasks**: `To Do → In Progress → Blocked → Ready for Review → Done`, with an
//!   approval sub-workflow that gates `Done` for tasks that need sign-off
//! - **Assignments**: client engagements grouping the tasks
//! - **Pipeline**: prospects from `New` to the closed `Won` / `Lost` stages
//!
//! Moves apply to the board at once and are saved in the background. A save the
//! store refuses is rolled back and reported, and can be retried.
//!
//! ## Quick Start
//!
//! ```bash
//! # Interactive board against a local tables file
//! opsb --local tables.json board tasks
//!
//! # One-shot commands against the hosted store
//! export OPS_BOARD_TOKEN=...
//! opsb columns pipeline
//! opsb move tasks 12 "In Progress"
//! opsb submit 12
//! opsb decide 12 approved --notes "figures agree"
//! opsb convert 7
//! opsb tree
//! ```
//!
//! Configuration is read from `~/.ops-board/config.toml` unless `--config` is given.
//! Logs go to stderr (`RUST_LOG` controls the filter), or to `ops-board.log` next to
//! the config file while the interactive board owns the terminal.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod approval;
pub mod board;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod fields;
pub mod guard;
pub mod join;
pub mod pipeline;
pub mod project;
pub mod rows;
pub mod store;
pub mod task;
pub mod webhook;
pub mod tui {
    pub mod colors;
    pub mod workflow;
    pub mod workflow_run;
}

use cli::Cli;
use cmd::*;
use config::Config;
use console::Console;
use db::LocalRecordStore;
use store::{HttpRecordStore, RecordStore};

fn main() {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        cmd_completions(shell);
        return;
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn default_config_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".ops-board")
}

/// Log to stderr, or to a file in `dir` while the board owns the terminal.
fn init_logging(to_file_in: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "ops_board=info".into());
    match to_file_in {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            let path = dir.join("ops-board.log");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(|| default_config_dir().join("config.toml"));
    let interactive = matches!(cli.command, Commands::Board { .. });
    let log_dir = config_path.parent().map(Path::to_path_buf).unwrap_or_else(default_config_dir);
    init_logging(interactive.then_some(log_dir.as_path()))?;

    let mut config = Config::load(&config_path)?;
    if let Some(actor) = cli.actor {
        config.board.actor = actor;
    }
    if cli.token.is_some() {
        config.store.token = cli.token;
    }

    let store: Arc<dyn RecordStore> = match &cli.local {
        Some(path) => {
            tracing::info!(path = %path.display(), "using local tables file");
            Arc::new(LocalRecordStore::open(path)?)
        }
        None => {
            tracing::info!(base_url = %config.store.base_url, "using hosted record store");
            Arc::new(HttpRecordStore::new(config.store.http())?)
        }
    };

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    let mut console: Console = runtime
        .block_on(Console::load(store, &config))
        .context("loading boards")?;

    match cli.command {
        Commands::Board { kind } => {
            let mut console = {
                let _guard = runtime.enter();
                cmd_board(console, kind)?
            };
            if console.pending() > 0 {
                println!("Waiting for {} save(s)...", console.pending());
            }
            runtime.block_on(settle_and_print(&mut console))
        }
        command => runtime.block_on(dispatch(&mut console, command)),
    }
}
