//! Windows Defender Firewall backend (`netsh advfirewall`).

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{run_rule_command, BackendKind, FirewallBackend, Listing, RuleOutcome};
use crate::address::{Address, Family};
use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::probe::{HostProbe, OsFamily};

const NETSH_EXE: &str = "netsh.exe";
const RULE_NAME: &str = "BLOCKED IP";

/// Printed (with a failing exit code) when the rule group is empty
const NO_RULES_MARKER: &str = "No rules match";

/// netsh backend. Every blocked address is its own inbound rule under a
/// shared name; changes apply immediately.
pub struct NetshBackend {
    executor: Arc<dyn CommandExecutor>,
    /// Full path to `netsh.exe`, checked for usability and run for every command
    program: String,
}

impl NetshBackend {
    pub fn new(executor: Arc<dyn CommandExecutor>, system_dir: &Path) -> Self {
        Self {
            executor,
            program: system_dir.join(NETSH_EXE).to_string_lossy().into_owned(),
        }
    }
}

#[async_trait]
impl FirewallBackend for NetshBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Netsh
    }

    fn is_usable(&self, probe: &dyn HostProbe) -> bool {
        probe.os_family() == OsFamily::Windows
            && probe.executable_exists(Path::new(&self.program))
    }

    async fn list_blocked(&self) -> Result<Listing> {
        let name = format!("name={}", RULE_NAME);
        let args = args_to_strings(&["advfirewall", "firewall", "show", "rule", &name]);
        let output = self.executor.execute(&self.program, &args).await?;

        if !output.success {
            if output.stdout.contains(NO_RULES_MARKER) {
                return Ok(Listing::default());
            }
            anyhow::bail!("{} failed: {}", self.program, output.summary());
        }

        let listing = parse_rule_listing(&output.stdout);
        debug!(
            "netsh lists {} blocked entries ({} unparsable)",
            listing.entries.len(),
            listing.skipped.len()
        );
        Ok(listing)
    }

    async fn add_rule(&self, address: &Address) -> RuleOutcome {
        let name = format!("name={}", RULE_NAME);
        let remote = format!("remoteip={}", address);
        run_rule_command(
            self.executor.as_ref(),
            &self.program,
            &[
                "advfirewall",
                "firewall",
                "add",
                "rule",
                &name,
                "interface=any",
                "dir=in",
                "action=block",
                &remote,
            ],
        )
        .await
    }

    async fn remove_rule(&self, address: &Address) -> RuleOutcome {
        let name = format!("name={}", RULE_NAME);
        let remote = format!("remoteip={}", address);
        run_rule_command(
            self.executor.as_ref(),
            &self.program,
            &["advfirewall", "firewall", "delete", "rule", &name, &remote],
        )
        .await
    }

    async fn persist(&self) -> Option<RuleOutcome> {
        None
    }
}

/// Parse `netsh advfirewall firewall show rule` output.
fn parse_rule_listing(output: &str) -> Listing {
    let mut listing = Listing::default();
    for line in output.lines() {
        let Some(value) = line.trim().strip_prefix("RemoteIP:") else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("any") {
            continue;
        }
        match normalize_remote_ip(value) {
            Some(text) => listing.push_raw(&text, None),
            None => listing.skipped.push(value.to_string()),
        }
    }
    listing
}

/// Turn a netsh `RemoteIP` value back into the form the rule was created with.
///
/// netsh prints `1.2.3.4/32`, `10.0.0.0/255.0.0.0` or ranges like
/// `1.2.3.4-1.2.3.9`. The prefix is kept only when it is numeric and not
/// the single-host length of the address family.
fn normalize_remote_ip(value: &str) -> Option<String> {
    let (ip, mask) = match value.find(['/', '-']) {
        Some(pos) => (&value[..pos], Some(&value[pos + 1..])),
        None => (value, None),
    };

    let family = Address::detect(ip).ok()?.family();
    match mask {
        Some(mask) if is_network_prefix(mask, family) => Some(format!("{}/{}", ip, mask)),
        _ => Some(ip.to_string()),
    }
}

fn is_network_prefix(mask: &str, family: Family) -> bool {
    match mask.parse::<u8>() {
        Ok(prefix) => prefix != family.host_prefix(),
        Err(_) => false,
    }
}
