//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "blocksync")]
#[command(
    author,
    version,
    about = "Reconcile the host firewall block-list against a remote blacklist/whitelist feed"
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Quiet mode (for cron/systemd timer)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the feed and bring the firewall in line with it
    Sync {
        /// Compute and log the changes without applying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show addresses currently blocked by the managed rules
    List,

    /// Show which firewall backend would be used on this host
    Detect,

    /// Show version
    Version,
}
