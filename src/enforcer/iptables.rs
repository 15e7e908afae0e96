//! iptables backend implementation.
//!
//! One `DROP` rule per blocked source on the `INPUT` chain of the filter
//! table, through `iptables` for IPv4 and `ip6tables` for IPv6.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{exec_listing, run_rule_command, BackendKind, FirewallBackend, Listing, RuleOutcome};
use crate::address::{Address, Family};
use crate::cmd_abstraction::CommandExecutor;
use crate::probe::{HostProbe, OsFamily};
use crate::reconciler::families;

const IPTABLES: &str = "/sbin/iptables";
const IP6TABLES: &str = "/sbin/ip6tables";
const SERVICE: &str = "/sbin/service";
const FIREWALL_CMD: &str = "/usr/bin/firewall-cmd";
const CHAIN: &str = "INPUT";

/// Source/destination values meaning "any address"
const ANY_SENTINELS: &[&str] = &["0.0.0.0/0", "::/0", "--"];

/// iptables backend (filter table, INPUT chain)
pub struct IptablesBackend {
    executor: Arc<dyn CommandExecutor>,
    dual_stack: bool,
}

impl IptablesBackend {
    pub fn new(executor: Arc<dyn CommandExecutor>, dual_stack: bool) -> Self {
        Self {
            executor,
            dual_stack,
        }
    }

    fn tool(family: Family) -> &'static str {
        match family {
            Family::V4 => IPTABLES,
            Family::V6 => IP6TABLES,
        }
    }

    async fn change_rule(&self, op: &str, address: &Address) -> RuleOutcome {
        run_rule_command(
            self.executor.as_ref(),
            Self::tool(address.family()),
            &[op, CHAIN, "-s", address.as_str(), "-j", "DROP"],
        )
        .await
    }

    async fn list_family(&self, family: Family, listing: &mut Listing) -> Result<()> {
        let output = exec_listing(self.executor.as_ref(), Self::tool(family), &["-L", CHAIN, "-n"])
            .await?;
        parse_chain_listing(&output, family, listing);
        Ok(())
    }
}

#[async_trait]
impl FirewallBackend for IptablesBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Iptables
    }

    fn is_usable(&self, probe: &dyn HostProbe) -> bool {
        // firewalld owns the tables when it is installed
        probe.os_family() == OsFamily::Linux
            && !probe.executable_exists(Path::new(FIREWALL_CMD))
            && probe.executable_exists(Path::new(IPTABLES))
    }

    async fn list_blocked(&self) -> Result<Listing> {
        let mut listing = Listing::default();
        let mut last_error = None;
        for &family in families(self.dual_stack) {
            // Each table is listed on its own; one failing leaves the other usable
            if let Err(e) = self.list_family(family, &mut listing).await {
                listing.failed.push((family, format!("{:#}", e)));
                last_error = Some(e);
            }
        }
        if listing.failed.len() == families(self.dual_stack).len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        debug!(
            "iptables lists {} blocked entries ({} unparsable)",
            listing.entries.len(),
            listing.skipped.len()
        );
        Ok(listing)
    }

    async fn add_rule(&self, address: &Address) -> RuleOutcome {
        self.change_rule("-I", address).await
    }

    async fn remove_rule(&self, address: &Address) -> RuleOutcome {
        self.change_rule("-D", address).await
    }

    async fn persist(&self) -> Option<RuleOutcome> {
        let mut services = vec!["iptables"];
        if self.dual_stack {
            services.push("ip6tables");
        }

        let mut success = true;
        let mut details = Vec::new();
        for service in services {
            let outcome = run_rule_command(self.executor.as_ref(), SERVICE, &[service, "save"]).await;
            success &= outcome.success;
            details.push(format!("{}: {}", service, outcome.detail));
        }

        Some(RuleOutcome {
            success,
            detail: details.join("; "),
        })
    }
}

/// Parse `iptables -L INPUT -n` output into `listing`.
///
/// Only plain `DROP` rules for all protocols with a specific source and
/// an "any" destination are ours. iptables prints the protocol as `all`
/// (or `0` since 1.8.8); ip6tables may leave the `opt` column blank.
fn parse_chain_listing(output: &str, family: Family, listing: &mut Listing) {
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] != "DROP" || !matches!(fields[1], "all" | "0") {
            continue;
        }

        let mut rest = &fields[2..];
        if rest.len() == 3 && is_opt_field(rest[0]) {
            rest = &rest[1..];
        }
        if rest.len() != 2 || !ANY_SENTINELS.contains(&rest[1]) {
            continue;
        }

        let source = rest[0];
        if ANY_SENTINELS.contains(&source) {
            continue;
        }
        listing.push_raw(source, Some(family));
    }
}

fn is_opt_field(field: &str) -> bool {
    field == "--" || field.starts_with('-') || field.starts_with('!')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{args_eq, CommandOutput, MockCommandExecutor};
    use crate::probe::MockHostProbe;
    use mockall::Sequence;

    const V4_FIXTURE: &str = "\
Chain INPUT (policy ACCEPT)
target     prot opt source               destination
DROP       all  --  1.2.3.4              0.0.0.0/0
DROP       all  --  10.0.0.0/8           0.0.0.0/0
DROP       tcp  --  0.0.0.0/0            0.0.0.0/0            tcp dpt:23
DROP       all  --  0.0.0.0/0            0.0.0.0/0
ACCEPT     all  --  192.168.1.0/24       0.0.0.0/0
DROP       all  --  5.6.7.8              192.168.1.1
DROP       0    --  9.9.9.9              0.0.0.0/0
DROP       all  --  999.1.1.1            0.0.0.0/0
";

    const V6_FIXTURE: &str = "\
Chain INPUT (policy ACCEPT)
target     prot opt source               destination
DROP       all      2001:db8::1          ::/0
DROP       all  --  2001:db8:1::/48      ::/0
DROP       all      ::/0                 ::/0
";

    fn output(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    #[test]
    fn test_parse_v4_fixture() {
        let mut listing = Listing::default();
        parse_chain_listing(V4_FIXTURE, Family::V4, &mut listing);
        let texts: Vec<&str> = listing.entries.iter().map(|a| a.as_str()).collect();
        assert_eq!(texts, vec!["1.2.3.4", "10.0.0.0/8", "9.9.9.9"]);
        assert_eq!(listing.skipped, vec!["999.1.1.1"]);
    }

    #[test]
    fn test_parse_v6_fixture() {
        let mut listing = Listing::default();
        parse_chain_listing(V6_FIXTURE, Family::V6, &mut listing);
        let texts: Vec<&str> = listing.entries.iter().map(|a| a.as_str()).collect();
        assert_eq!(texts, vec!["2001:db8::1", "2001:db8:1::/48"]);
        assert!(listing.entries.iter().all(|a| a.family() == Family::V6));
        assert!(listing.skipped.is_empty());
    }

    #[test]
    fn test_parse_empty_chain() {
        let mut listing = Listing::default();
        parse_chain_listing(
            "Chain INPUT (policy ACCEPT)\ntarget     prot opt source               destination\n",
            Family::V4,
            &mut listing,
        );
        assert!(listing.entries.is_empty());
        assert!(listing.skipped.is_empty());
    }

    #[test]
    fn test_usable_requires_firewalld_absent() {
        let backend = IptablesBackend::new(Arc::new(MockCommandExecutor::new()), true);

        let mut legacy = MockHostProbe::new();
        legacy.expect_os_family().return_const(OsFamily::Linux);
        legacy
            .expect_executable_exists()
            .returning(|p| p == Path::new(IPTABLES));
        assert!(backend.is_usable(&legacy));

        let mut both = MockHostProbe::new();
        both.expect_os_family().return_const(OsFamily::Linux);
        both.expect_executable_exists().return_const(true);
        assert!(!backend.is_usable(&both));

        let mut other = MockHostProbe::new();
        other.expect_os_family().return_const(OsFamily::Other);
        other.expect_executable_exists().return_const(true);
        assert!(!backend.is_usable(&other));
    }

    #[tokio::test]
    async fn test_list_blocked_dual_stack() {
        let mut mock = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == IPTABLES && args_eq(args, &["-L", "INPUT", "-n"]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(output(V4_FIXTURE)));
        mock.expect_execute()
            .withf(|cmd, args| cmd == IP6TABLES && args_eq(args, &["-L", "INPUT", "-n"]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(output(V6_FIXTURE)));

        let backend = IptablesBackend::new(Arc::new(mock), true);
        let listing = backend.list_blocked().await.unwrap();
        assert_eq!(listing.rule_set(Family::V4).len(), 3);
        assert_eq!(listing.rule_set(Family::V6).len(), 2);
    }

    #[tokio::test]
    async fn test_list_blocked_without_dual_stack_skips_ip6tables() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, _| cmd == IPTABLES)
            .times(1)
            .returning(|_, _| Ok(output(V4_FIXTURE)));
        mock.expect_execute()
            .withf(|cmd, _| cmd == IP6TABLES)
            .times(0);

        let backend = IptablesBackend::new(Arc::new(mock), false);
        let listing = backend.list_blocked().await.unwrap();
        assert!(listing.rule_set(Family::V6).is_empty());
    }

    #[tokio::test]
    async fn test_list_blocked_ip6tables_failure_keeps_ipv4() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, _| cmd == IPTABLES)
            .returning(|_, _| Ok(output(V4_FIXTURE)));
        mock.expect_execute()
            .withf(|cmd, _| cmd == IP6TABLES)
            .returning(|_, _| Err(anyhow::anyhow!("Failed to execute /sbin/ip6tables")));

        let backend = IptablesBackend::new(Arc::new(mock), true);
        let listing = backend.list_blocked().await.unwrap();
        assert_eq!(listing.rule_set(Family::V4).len(), 3);
        assert!(!listing.family_failed(Family::V4));
        assert!(listing.family_failed(Family::V6));
        assert!(listing.failed[0].1.contains("/sbin/ip6tables"));
    }

    #[tokio::test]
    async fn test_list_blocked_all_families_failing_is_error() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|cmd, _| Err(anyhow::anyhow!("Failed to execute {}", cmd)));

        let backend = IptablesBackend::new(Arc::new(mock), true);
        assert!(backend.list_blocked().await.is_err());
    }

    #[test]
    fn test_duplicate_rules_planned_for_each_removal() {
        let mut listing = Listing::default();
        parse_chain_listing(
            "DROP       all  --  5.6.7.8              0.0.0.0/0\n\
             DROP       all  --  5.6.7.8              0.0.0.0/0\n",
            Family::V4,
            &mut listing,
        );
        assert_eq!(listing.entries.len(), 2);

        let snapshot = crate::feed::parse_feed(r#"{"white4": "5.6.7.8"}"#, true).unwrap();
        let plan = crate::reconciler::plan(&snapshot, &listing, true);
        let removes: Vec<&str> = plan.remove.iter().map(|a| a.as_str()).collect();
        assert_eq!(removes, vec!["5.6.7.8", "5.6.7.8"]);
        assert!(plan.add.is_empty());
    }

    #[tokio::test]
    async fn test_add_rule_uses_family_tool() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| {
                cmd == IP6TABLES && args_eq(args, &["-I", "INPUT", "-s", "2001:db8::1", "-j", "DROP"])
            })
            .times(1)
            .returning(|_, _| Ok(output("")));

        let backend = IptablesBackend::new(Arc::new(mock), true);
        let address = Address::parse("2001:db8::1", Family::V6).unwrap();
        assert!(backend.add_rule(&address).await.success);
    }

    #[tokio::test]
    async fn test_remove_rule_failure_reports_stderr() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| {
                cmd == IPTABLES && args_eq(args, &["-D", "INPUT", "-s", "1.2.3.4", "-j", "DROP"])
            })
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    stderr: "iptables: Bad rule (does a matching rule exist in that chain?).\n"
                        .to_string(),
                    success: false,
                    code: Some(1),
                    ..Default::default()
                })
            });

        let backend = IptablesBackend::new(Arc::new(mock), true);
        let address = Address::parse("1.2.3.4", Family::V4).unwrap();
        let outcome = backend.remove_rule(&address).await;
        assert!(!outcome.success);
        assert!(outcome.detail.contains("Bad rule"));
    }

    #[tokio::test]
    async fn test_persist_saves_both_families() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == SERVICE && args_eq(args, &["iptables", "save"]))
            .times(1)
            .returning(|_, _| Ok(output("iptables: Saving firewall rules: [  OK  ]")));
        mock.expect_execute()
            .withf(|cmd, args| cmd == SERVICE && args_eq(args, &["ip6tables", "save"]))
            .times(1)
            .returning(|_, _| Ok(output("ip6tables: Saving firewall rules: [  OK  ]")));

        let backend = IptablesBackend::new(Arc::new(mock), true);
        let outcome = backend.persist().await.unwrap();
        assert!(outcome.success);
        assert!(outcome.detail.starts_with("iptables: "));
    }

    #[tokio::test]
    async fn test_persist_single_stack_failure() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == SERVICE && args_eq(args, &["iptables", "save"]))
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("Failed to execute /sbin/service")));

        let backend = IptablesBackend::new(Arc::new(mock), false);
        let outcome = backend.persist().await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.detail.contains("/sbin/service"));
    }
}
