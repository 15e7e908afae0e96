//! blocksync - firewall block-list reconciler
//!
//! Keeps the host firewall in line with a remote blacklist/whitelist feed.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use blocksync::cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // stdout carries the activity log mirror
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Execute command
    match cli.command {
        Commands::Sync { dry_run } => {
            blocksync::commands::sync::run(dry_run, &cli.config, cli.quiet).await
        }
        Commands::List => blocksync::commands::list::run(&cli.config).await,
        Commands::Detect => blocksync::commands::detect::run(&cli.config).await,
        Commands::Version => {
            println!("blocksync {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
