use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Kanban boards and approvals for the operations console.
/// Reads the hosted record store by default, or a local JSON file via --local.
#[derive(Parser)]
#[command(name = "opsb", version, about = "Operations console board engine")]
pub struct Cli {
    /// Path to the TOML config file (default: ~/.ops-board/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Work against a local JSON tables file instead of the hosted store.
    #[arg(long, global = true, value_name = "FILE")]
    pub local: Option<PathBuf>,

    /// Acting identity for approvals and WIP limits.
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// API token for the hosted store.
    #[arg(long, global = true, env = "OPS_BOARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}
