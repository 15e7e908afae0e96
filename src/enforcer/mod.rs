//! Firewall enforcement backends (firewalld rich rules, iptables, netsh).
//!
//! Exactly one backend is active per run. [`select_backend`] scans the
//! candidates in priority order and keeps the first one whose usability
//! probe passes.

mod firewalld;
mod iptables;
mod netsh;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub use firewalld::FirewalldBackend;
pub use iptables::IptablesBackend;
pub use netsh::NetshBackend;

use crate::address::{Address, Family, RuleSet};
use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::config::BackendChoice;
use crate::error::SyncError;
use crate::probe::HostProbe;

/// Concrete firewall technology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// firewalld rich rules (`firewall-cmd`)
    Firewalld,
    /// Legacy packet filter tables (`iptables`/`ip6tables`)
    Iptables,
    /// Windows Defender Firewall (`netsh advfirewall`)
    Netsh,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Firewalld => "firewalld",
            BackendKind::Iptables => "iptables",
            BackendKind::Netsh => "netsh",
        };
        f.write_str(name)
    }
}

/// Result of a single mutating firewall command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub success: bool,
    /// Raw tool output (or the spawn error), kept for the activity log
    pub detail: String,
}

impl RuleOutcome {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// Addresses currently blocked by the managed rules
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Parsed entries of both families
    pub entries: Vec<Address>,
    /// Output lines not recognized as managed block rules
    pub skipped: Vec<String>,
    /// Families whose listing command failed, with the error.
    /// Their entries are unknown and must not be reconciled.
    pub failed: Vec<(Family, String)>,
}

impl Listing {
    /// Entries of one family as a set
    pub fn rule_set(&self, family: Family) -> RuleSet {
        RuleSet::from_addresses(family, &self.entries)
    }

    pub fn family_failed(&self, family: Family) -> bool {
        self.failed.iter().any(|(f, _)| *f == family)
    }

    /// Record a candidate address found in tool output.
    pub(crate) fn push_raw(&mut self, raw: &str, family: Option<Family>) {
        let parsed = match family {
            Some(family) => Address::parse(raw, family),
            None => Address::detect(raw),
        };
        match parsed {
            Ok(address) => self.entries.push(address),
            Err(e) => {
                debug!("Skipping listing entry {:?}: {}", raw, e);
                self.skipped.push(raw.trim().to_string());
            }
        }
    }
}

/// Trait for firewall backends
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    /// Which technology this backend drives
    fn kind(&self) -> BackendKind;

    /// Whether this backend can run on the host. Never mutates anything.
    fn is_usable(&self, probe: &dyn HostProbe) -> bool;

    /// List every address currently blocked by the managed rules.
    ///
    /// Fails only when the listing command itself cannot be run or reports
    /// failure. Unrecognized lines end up in [`Listing::skipped`].
    async fn list_blocked(&self) -> Result<Listing>;

    /// Add a block rule for one address of its own family.
    async fn add_rule(&self, address: &Address) -> RuleOutcome;

    /// Remove the block rule for one address of its own family.
    async fn remove_rule(&self, address: &Address) -> RuleOutcome;

    /// Make accumulated changes durable and active.
    ///
    /// Returns `None` when the backend has no such step.
    async fn persist(&self) -> Option<RuleOutcome>;
}

/// All backends in selection priority order: rich rules, then legacy
/// tables, then the platform firewall.
pub fn candidates(
    executor: Arc<dyn CommandExecutor>,
    dual_stack: bool,
    probe: &dyn HostProbe,
) -> Vec<Box<dyn FirewallBackend>> {
    vec![
        Box::new(FirewalldBackend::new(executor.clone())),
        Box::new(IptablesBackend::new(executor.clone(), dual_stack)),
        Box::new(NetshBackend::new(executor, &probe.system_dir())),
    ]
}

/// Pick the first usable backend.
pub fn select_backend(
    candidates: Vec<Box<dyn FirewallBackend>>,
    probe: &dyn HostProbe,
) -> Result<Box<dyn FirewallBackend>, SyncError> {
    let tried: Vec<String> = candidates.iter().map(|c| c.kind().to_string()).collect();

    for candidate in candidates {
        if candidate.is_usable(probe) {
            debug!("Selected {} backend", candidate.kind());
            return Ok(candidate);
        }
        debug!("{} backend is not usable on this host", candidate.kind());
    }

    Err(SyncError::UnsupportedPlatform(format!(
        "no usable firewall backend (tried: {})",
        tried.join(", ")
    )))
}

/// Create the backend for a configured choice.
///
/// A forced choice must still pass its own usability probe.
pub fn create_backend(
    choice: BackendChoice,
    executor: Arc<dyn CommandExecutor>,
    dual_stack: bool,
    probe: &dyn HostProbe,
) -> Result<Box<dyn FirewallBackend>, SyncError> {
    let all = candidates(executor, dual_stack, probe);
    let pool = match choice.kind() {
        None => all,
        Some(kind) => all.into_iter().filter(|c| c.kind() == kind).collect(),
    };
    select_backend(pool, probe)
}

/// Run a mutating command and fold the result into a [`RuleOutcome`].
pub(crate) async fn run_rule_command(
    executor: &dyn CommandExecutor,
    program: &str,
    args: &[&str],
) -> RuleOutcome {
    match executor.execute(program, &args_to_strings(args)).await {
        Ok(output) => RuleOutcome {
            success: output.success,
            detail: output.summary(),
        },
        Err(e) => RuleOutcome::failed(format!("{:#}", e)),
    }
}

/// Run a listing command and return its stdout.
pub(crate) async fn exec_listing(
    executor: &dyn CommandExecutor,
    program: &str,
    args: &[&str],
) -> Result<String> {
    let output = executor.execute(program, &args_to_strings(args)).await?;
    if output.success {
        Ok(output.stdout)
    } else {
        anyhow::bail!("{} failed: {}", program, output.summary())
    }
}

/// Check if running as root (effective UID == 0)
#[cfg(unix)]
pub fn check_root() -> Result<()> {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!(
            "This operation requires root privileges. Please run with sudo.\n\
             Alternatively, ensure the process has CAP_NET_ADMIN."
        )
    }
    Ok(())
}

/// Elevation on Windows is reported by netsh itself.
#[cfg(not(unix))]
pub fn check_root() -> Result<()> {
    Ok(())
}
