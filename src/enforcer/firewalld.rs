//! firewalld backend implementation (rich rules).

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{exec_listing, run_rule_command, BackendKind, FirewallBackend, Listing, RuleOutcome};
use crate::address::{Address, Family};
use crate::cmd_abstraction::CommandExecutor;
use crate::probe::{HostProbe, OsFamily};

const FIREWALL_CMD: &str = "/usr/bin/firewall-cmd";

/// firewalld backend. Rules go to permanent storage and take effect on reload.
pub struct FirewalldBackend {
    executor: Arc<dyn CommandExecutor>,
}

impl FirewalldBackend {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    async fn change_rule(&self, action: &str, address: &Address) -> RuleOutcome {
        let arg = format!("--{}-rich-rule={}", action, rich_rule(address));
        run_rule_command(self.executor.as_ref(), FIREWALL_CMD, &["--permanent", &arg]).await
    }
}

#[async_trait]
impl FirewallBackend for FirewalldBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Firewalld
    }

    fn is_usable(&self, probe: &dyn HostProbe) -> bool {
        probe.os_family() == OsFamily::Linux && probe.executable_exists(Path::new(FIREWALL_CMD))
    }

    async fn list_blocked(&self) -> Result<Listing> {
        let output = exec_listing(
            self.executor.as_ref(),
            FIREWALL_CMD,
            &["--permanent", "--list-rich-rules"],
        )
        .await?;
        let listing = parse_rich_rules(&output);
        debug!(
            "firewalld lists {} blocked entries ({} other rules)",
            listing.entries.len(),
            listing.skipped.len()
        );
        Ok(listing)
    }

    async fn add_rule(&self, address: &Address) -> RuleOutcome {
        self.change_rule("add", address).await
    }

    async fn remove_rule(&self, address: &Address) -> RuleOutcome {
        self.change_rule("remove", address).await
    }

    async fn persist(&self) -> Option<RuleOutcome> {
        Some(run_rule_command(self.executor.as_ref(), FIREWALL_CMD, &["--reload"]).await)
    }
}

/// Rich rule rejecting all traffic from one source address.
///
/// Written in the exact form `firewall-cmd --list-rich-rules` prints back.
fn rich_rule(address: &Address) -> String {
    format!(
        "rule family=\"{}\" source address=\"{}\" reject",
        address.family().label(),
        address
    )
}

/// Parse `firewall-cmd --list-rich-rules` output.
fn parse_rich_rules(output: &str) -> Listing {
    let mut listing = Listing::default();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_rich_rule(line) {
            Some((family, address)) => listing.push_raw(address, Some(family)),
            None => listing.skipped.push(line.to_string()),
        }
    }
    listing
}

/// Extract family and source from a managed reject rule.
fn parse_rich_rule(line: &str) -> Option<(Family, &str)> {
    let rest = line.strip_prefix("rule family=\"")?;
    let (family, rest) = if let Some(rest) = rest.strip_prefix("ipv4\"") {
        (Family::V4, rest)
    } else if let Some(rest) = rest.strip_prefix("ipv6\"") {
        (Family::V6, rest)
    } else {
        return None;
    };
    let address = rest
        .strip_prefix(" source address=\"")?
        .strip_suffix("\" reject")?;
    Some((family, address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{args_eq, CommandOutput, MockCommandExecutor};
    use crate::probe::MockHostProbe;

    fn output(stdout: &str, success: bool) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success,
            code: Some(if success { 0 } else { 1 }),
        }
    }

    fn v4(s: &str) -> Address {
        Address::parse(s, Family::V4).unwrap()
    }

    #[test]
    fn test_rich_rule_format() {
        assert_eq!(
            rich_rule(&v4("1.2.3.4")),
            r#"rule family="ipv4" source address="1.2.3.4" reject"#
        );
        let v6 = Address::parse("2001:db8::/32", Family::V6).unwrap();
        assert_eq!(
            rich_rule(&v6),
            r#"rule family="ipv6" source address="2001:db8::/32" reject"#
        );
    }

    #[test]
    fn test_parse_rich_rules_fixture() {
        let fixture = r#"rule family="ipv4" source address="1.2.3.4" reject
rule family="ipv4" source address="10.0.0.0/8" reject
rule family="ipv6" source address="2001:db8::1" reject
rule family="ipv4" source address="192.168.1.10" port port="22" protocol="tcp" accept
rule service name="ssh" accept

"#;
        let listing = parse_rich_rules(fixture);
        let texts: Vec<&str> = listing.entries.iter().map(|a| a.as_str()).collect();
        assert_eq!(texts, vec!["1.2.3.4", "10.0.0.0/8", "2001:db8::1"]);
        assert_eq!(listing.entries[2].family(), Family::V6);
        assert_eq!(listing.skipped.len(), 2);
    }

    #[test]
    fn test_parse_rich_rule_family_mismatch_is_skipped() {
        let listing = parse_rich_rules(r#"rule family="ipv4" source address="::1" reject"#);
        assert!(listing.entries.is_empty());
        assert_eq!(listing.skipped, vec!["::1"]);
    }

    #[test]
    fn test_parse_rich_rules_round_trips_own_format() {
        let address = v4("5.6.7.8");
        let listing = parse_rich_rules(&rich_rule(&address));
        assert_eq!(listing.entries, vec![address]);
    }

    #[test]
    fn test_usable_only_on_linux_with_tool() {
        let backend = FirewalldBackend::new(Arc::new(MockCommandExecutor::new()));

        let mut linux = MockHostProbe::new();
        linux.expect_os_family().return_const(OsFamily::Linux);
        linux
            .expect_executable_exists()
            .returning(|p| p == Path::new(FIREWALL_CMD));
        assert!(backend.is_usable(&linux));

        let mut bare = MockHostProbe::new();
        bare.expect_os_family().return_const(OsFamily::Linux);
        bare.expect_executable_exists().return_const(false);
        assert!(!backend.is_usable(&bare));

        let mut windows = MockHostProbe::new();
        windows.expect_os_family().return_const(OsFamily::Windows);
        windows.expect_executable_exists().return_const(true);
        assert!(!backend.is_usable(&windows));
    }

    #[tokio::test]
    async fn test_list_blocked_runs_permanent_listing() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| {
                cmd == FIREWALL_CMD && args_eq(args, &["--permanent", "--list-rich-rules"])
            })
            .times(1)
            .returning(|_, _| {
                Ok(output(
                    "rule family=\"ipv4\" source address=\"9.9.9.9\" reject\n",
                    true,
                ))
            });

        let backend = FirewalldBackend::new(Arc::new(mock));
        let listing = backend.list_blocked().await.unwrap();
        assert_eq!(listing.entries, vec![v4("9.9.9.9")]);
    }

    #[tokio::test]
    async fn test_list_blocked_failure() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Ok(output("", false)));
        let backend = FirewalldBackend::new(Arc::new(mock));
        assert!(backend.list_blocked().await.is_err());
    }

    #[tokio::test]
    async fn test_add_rule_command() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| {
                cmd == FIREWALL_CMD
                    && args_eq(
                        args,
                        &[
                            "--permanent",
                            r#"--add-rich-rule=rule family="ipv4" source address="1.2.3.4" reject"#,
                        ],
                    )
            })
            .times(1)
            .returning(|_, _| Ok(output("success\n", true)));

        let backend = FirewalldBackend::new(Arc::new(mock));
        let outcome = backend.add_rule(&v4("1.2.3.4")).await;
        assert_eq!(outcome, RuleOutcome::ok("success"));
    }

    #[tokio::test]
    async fn test_remove_rule_ipv6_command() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|_, args| {
                args.len() == 2
                    && args[1]
                        == r#"--remove-rich-rule=rule family="ipv6" source address="2001:db8::1" reject"#
            })
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    stderr: "Warning: NOT_ENABLED".to_string(),
                    success: true,
                    code: Some(0),
                    ..Default::default()
                })
            });

        let backend = FirewalldBackend::new(Arc::new(mock));
        let address = Address::parse(" 2001:db8::1 ", Family::V6).unwrap();
        let outcome = backend.remove_rule(&address).await;
        assert!(outcome.success);
        assert_eq!(outcome.detail, "Warning: NOT_ENABLED");
    }

    #[tokio::test]
    async fn test_persist_reloads() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == FIREWALL_CMD && args_eq(args, &["--reload"]))
            .times(1)
            .returning(|_, _| Ok(output("success", true)));

        let backend = FirewalldBackend::new(Arc::new(mock));
        let outcome = backend.persist().await.unwrap();
        assert!(outcome.success);
    }
}
