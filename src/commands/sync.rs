//! Sync command implementation.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::{error, info, warn};

use crate::activity::ActivityLog;
use crate::config::Config;
use crate::enforcer::{check_root, create_backend, FirewallBackend};
use crate::error::SyncError;
use crate::feed::{FeedSnapshot, Fetcher};
use crate::lock::LockGuard;
use crate::probe::RealHostProbe;
use crate::reconciler::{families, Reconciler, SyncReport};

/// Run the sync command
pub async fn run(dry_run: bool, config_path: &Path, quiet: bool) -> Result<()> {
    check_root()?;

    let config = super::load_config(config_path)?;
    let _lock = LockGuard::acquire(&config.lock_file)?;
    let mut log = ActivityLog::open(&config.log_file, !quiet)?;

    let backend = match create_backend(
        config.backend,
        super::executor(&config),
        config.dual_stack,
        &RealHostProbe,
    ) {
        Ok(backend) => backend,
        Err(e) => return Err(fatal(&mut log, e)),
    };
    info!("Using {} backend", backend.kind());

    let fetcher = Fetcher::new(config.feed.timeout())?;
    let snapshot = match fetcher.fetch_snapshot(&config.feed, config.dual_stack).await {
        Ok(snapshot) => snapshot,
        Err(e) => return Err(fatal(&mut log, e)),
    };
    log.record(describe_feed(&snapshot, config.dual_stack));

    let report = apply(&config, backend.as_ref(), &snapshot, &mut log, dry_run).await;
    log.flush().context("Failed to flush activity log")?;
    finish(&config, &report)
}

/// Reconcile one snapshot and log the run summary.
pub async fn apply<W: Write>(
    config: &Config,
    backend: &dyn FirewallBackend,
    snapshot: &FeedSnapshot,
    log: &mut ActivityLog<W>,
    dry_run: bool,
) -> SyncReport {
    let report = Reconciler::new(backend, config.dual_stack)
        .dry_run(dry_run)
        .run(snapshot, log)
        .await;

    if report.has_failures() {
        warn!("Sync finished with failures: {}", report.summary());
    } else {
        info!("Sync finished: {}", report.summary());
    }
    report
}

/// Map the run report to the process outcome.
pub fn finish(config: &Config, report: &SyncReport) -> Result<()> {
    if config.strict_exit && report.has_failures() {
        return Err(SyncError::OperationFailed(report.summary()).into());
    }
    Ok(())
}

/// Log a fatal error to both channels and hand it back for the exit path.
fn fatal<W: Write>(log: &mut ActivityLog<W>, err: SyncError) -> anyhow::Error {
    error!("{}", err);
    log.record(err.to_string());
    if let Err(e) = log.flush() {
        warn!("Failed to flush activity log: {}", e);
    }
    err.into()
}

fn describe_feed(snapshot: &FeedSnapshot, dual_stack: bool) -> String {
    let counts: Vec<String> = families(dual_stack)
        .iter()
        .map(|&family| {
            format!(
                "{} {} blacklisted, {} whitelisted",
                family,
                snapshot.blacklist(family).len(),
                snapshot.whitelist(family).len()
            )
        })
        .collect();
    format!("Fetched feed: {}", counts.join("; "))
}
