//! # blocksync - firewall block-list reconciler
//!
//! Periodically fetches an authoritative blacklist/whitelist feed, compares
//! it with what the host firewall currently blocks, and issues the minimal
//! set of add/remove operations to bring the two in agreement.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        blocksync                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: sync, list, detect, version                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Feed (reqwest + rustls)                                    │
//! │    └── ipv4 / ipv6 blacklists, white4 / white6 whitelists   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reconciler                                                 │
//! │    └── remove whitelisted, add missing, persist once        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (FirewallBackend trait, selected by probe)        │
//! │    ├── FirewalldBackend (rich rules)                        │
//! │    ├── IptablesBackend (iptables / ip6tables)               │
//! │    └── NetshBackend (Windows advfirewall)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Activity log (timestamped, file + stdout)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use blocksync::activity::ActivityLog;
//! use blocksync::cmd_abstraction::RealCommandExecutor;
//! use blocksync::config::Config;
//! use blocksync::enforcer::create_backend;
//! use blocksync::feed::Fetcher;
//! use blocksync::probe::RealHostProbe;
//! use blocksync::reconciler::Reconciler;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/blocksync/config.yaml")?;
//!
//!     let executor = Arc::new(RealCommandExecutor::new(config.command_timeout()));
//!     let backend = create_backend(config.backend, executor, config.dual_stack, &RealHostProbe)?;
//!
//!     let fetcher = Fetcher::new(config.feed.timeout())?;
//!     let feed = fetcher.fetch_snapshot(&config.feed, config.dual_stack).await?;
//!
//!     let mut log = ActivityLog::open(&config.log_file, true)?;
//!     let report = Reconciler::new(backend.as_ref(), config.dual_stack)
//!         .run(&feed, &mut log)
//!         .await;
//!     println!("{}", report.summary());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`activity`] - Timestamped activity log
//! - [`address`] - Address families, addresses and rule sets
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - Command execution with timeouts (mockable)
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`enforcer`] - Firewall backend abstraction and selection
//! - [`error`] - Domain error types
//! - [`feed`] - HTTP client and parser for the remote feed
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`probe`] - Host probing for backend usability
//! - [`reconciler`] - Set-difference reconciliation

pub mod activity;
pub mod address;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod feed;
pub mod lock;
pub mod probe;
pub mod reconciler;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::SyncError;
