//! Blacklist/whitelist reconciliation.
//!
//! For each enabled family:
//!
//! 1. `exists` = what the backend currently blocks
//! 2. remove `exists ∩ whitelist`, once per listed rule
//! 3. add `blacklist − whitelist − exists`
//!
//! A family whose listing failed is left alone; the other one is still
//! reconciled. All removals run before any addition. If anything was
//! attempted the backend is persisted exactly once at the end. Failed
//! operations are logged and counted; they never stop the run.

use std::io::Write;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::address::{Address, Family};
use crate::enforcer::{BackendKind, FirewallBackend, Listing, RuleOutcome};
use crate::feed::FeedSnapshot;

/// Families processed for a given dual-stack setting
pub fn families(dual_stack: bool) -> &'static [Family] {
    if dual_stack {
        &Family::ALL
    } else {
        &[Family::V4]
    }
}

/// Edit set for one run, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub remove: Vec<Address>,
    pub add: Vec<Address>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

/// Compute the minimal edit set bringing `listing` in line with `feed`.
pub fn plan(feed: &FeedSnapshot, listing: &Listing, dual_stack: bool) -> Plan {
    let mut plan = Plan::default();

    for &family in families(dual_stack) {
        if listing.family_failed(family) {
            continue;
        }
        let exists = listing.rule_set(family);
        let whitelist = feed.whitelist(family);

        // Duplicate rules each need their own delete
        plan.remove.extend(
            listing
                .entries
                .iter()
                .filter(|a| a.family() == family && whitelist.contains(a))
                .cloned(),
        );
        plan.add.extend(
            feed.blacklist(family)
                .iter()
                .filter(|a| !whitelist.contains(a) && !exists.contains(a))
                .cloned(),
        );
    }

    plan
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub backend: BackendKind,
    pub dry_run: bool,
    /// Operations planned (removals, additions)
    pub planned: (usize, usize),
    pub removed: usize,
    pub added: usize,
    /// Add/remove operations the backend reported as failed
    pub failed: usize,
    /// `None` when nothing changed or the backend has no persist step
    pub persist: Option<RuleOutcome>,
    pub listing_error: Option<String>,
    /// Listing lines that were not recognized as managed rules
    pub skipped_listing: usize,
    /// Feed entries rejected as malformed
    pub rejected_feed: usize,
}

impl SyncReport {
    fn new(backend: BackendKind, dry_run: bool) -> Self {
        Self {
            backend,
            dry_run,
            planned: (0, 0),
            removed: 0,
            added: 0,
            failed: 0,
            persist: None,
            listing_error: None,
            skipped_listing: 0,
            rejected_feed: 0,
        }
    }

    /// Whether any operation (listing, rule, persist) failed
    pub fn has_failures(&self) -> bool {
        self.failed > 0
            || self.listing_error.is_some()
            || self.persist.as_ref().is_some_and(|p| !p.success)
    }

    pub fn summary(&self) -> String {
        let mut text = if self.dry_run {
            format!(
                "{} (dry run): {} to remove, {} to add",
                self.backend, self.planned.0, self.planned.1
            )
        } else {
            format!(
                "{}: {} removed, {} added, {} failed",
                self.backend, self.removed, self.added, self.failed
            )
        };
        if self.skipped_listing > 0 {
            text.push_str(&format!(", {} unrecognized listing lines", self.skipped_listing));
        }
        if self.rejected_feed > 0 {
            text.push_str(&format!(", {} rejected feed entries", self.rejected_feed));
        }
        text
    }
}

/// Applies a feed snapshot through one backend
pub struct Reconciler<'a> {
    backend: &'a dyn FirewallBackend,
    dual_stack: bool,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(backend: &'a dyn FirewallBackend, dual_stack: bool) -> Self {
        Self {
            backend,
            dual_stack,
            dry_run: false,
        }
    }

    /// Compute and log the plan without touching the firewall.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run<W: Write>(
        &self,
        feed: &FeedSnapshot,
        log: &mut ActivityLog<W>,
    ) -> SyncReport {
        let mut report = SyncReport::new(self.backend.kind(), self.dry_run);
        report.rejected_feed = feed.rejected.len();

        let listing = match self.backend.list_blocked().await {
            Ok(listing) => listing,
            Err(e) => {
                // Without the current state any edit could be wrong.
                let message = format!("{:#}", e);
                warn!("Listing blocked addresses failed: {}", message);
                log.record(format!("List {}: {}", self.backend.kind(), message));
                report.listing_error = Some(message);
                return report;
            }
        };

        let mut failures = Vec::new();
        for (family, message) in &listing.failed {
            if !families(self.dual_stack).contains(family) {
                continue;
            }
            warn!("Listing {} rules failed, leaving them untouched: {}", family, message);
            log.record(format!("List {} {}: {}", self.backend.kind(), family, message));
            failures.push(format!("{}: {}", family, message));
        }
        if !failures.is_empty() {
            report.listing_error = Some(failures.join("; "));
        }

        for line in &listing.skipped {
            debug!("Unrecognized listing line: {}", line);
        }
        report.skipped_listing = listing.skipped.len();

        let plan = plan(feed, &listing, self.dual_stack);
        report.planned = (plan.remove.len(), plan.add.len());
        info!(
            "Plan: {} to remove, {} to add ({} currently blocked)",
            plan.remove.len(),
            plan.add.len(),
            listing.entries.len()
        );

        if self.dry_run {
            for address in &plan.remove {
                log.record(format!("Would remove {}", address));
            }
            for address in &plan.add {
                log.record(format!("Would add {}", address));
            }
            return report;
        }

        for address in &plan.remove {
            let outcome = self.backend.remove_rule(address).await;
            log.record(format!("Remove {}: {}", address, outcome.detail));
            if outcome.success {
                report.removed += 1;
            } else {
                report.failed += 1;
            }
        }

        for address in &plan.add {
            let outcome = self.backend.add_rule(address).await;
            log.record(format!("Add {}: {}", address, outcome.detail));
            if outcome.success {
                report.added += 1;
            } else {
                report.failed += 1;
            }
        }

        // Failed attempts still count as changes.
        if !plan.is_empty() {
            if let Some(outcome) = self.backend.persist().await {
                log.record(format!("Persist {}: {}", self.backend.kind(), outcome.detail));
                if !outcome.success {
                    warn!("Persisting firewall changes failed: {}", outcome.detail);
                }
                report.persist = Some(outcome);
            }
        }

        report
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::address::RuleSet;
    use proptest::prelude::*;

    fn v4() -> impl Strategy<Value = Address> {
        (0u8..4, 0u8..4).prop_map(|(a, b)| Address::detect(&format!("10.0.{}.{}", a, b)).unwrap())
    }

    fn v6() -> impl Strategy<Value = Address> {
        (0u16..16).prop_map(|n| Address::detect(&format!("2001:db8::{:x}", n)).unwrap())
    }

    fn set(family: Family, items: Vec<Address>) -> RuleSet {
        RuleSet::from_addresses(family, &items)
    }

    prop_compose! {
        fn scenario()(
            black4 in prop::collection::vec(v4(), 0..10),
            white4 in prop::collection::vec(v4(), 0..6),
            black6 in prop::collection::vec(v6(), 0..10),
            white6 in prop::collection::vec(v6(), 0..6),
            blocked in prop::collection::vec(prop_oneof![v4(), v6()], 0..12),
        ) -> (FeedSnapshot, Listing) {
            let mut feed = FeedSnapshot::empty();
            feed.blacklist_v4 = set(Family::V4, black4);
            feed.whitelist_v4 = set(Family::V4, white4);
            feed.blacklist_v6 = set(Family::V6, black6);
            feed.whitelist_v6 = set(Family::V6, white6);
            (feed, Listing { entries: blocked, ..Listing::default() })
        }
    }

    /// Blocked set after applying `plan` to `listing`
    fn apply(listing: &Listing, plan: &Plan, family: Family) -> RuleSet {
        let mut after = RuleSet::new(family);
        for address in &listing.entries {
            if address.family() == family && !plan.remove.contains(address) {
                after.insert(address.clone());
            }
        }
        for address in &plan.add {
            after.insert(address.clone());
        }
        after
    }

    proptest! {
        #[test]
        fn prop_whitelist_never_blocked_after_plan((feed, listing) in scenario()) {
            let plan = plan(&feed, &listing, true);
            for family in Family::ALL {
                let after = apply(&listing, &plan, family);
                for address in feed.whitelist(family).iter() {
                    prop_assert!(!after.contains(address));
                }
            }
        }

        #[test]
        fn prop_plan_is_minimal((feed, listing) in scenario()) {
            let plan = plan(&feed, &listing, true);
            for address in &plan.remove {
                prop_assert!(listing.entries.contains(address));
                prop_assert!(feed.whitelist(address.family()).contains(address));
            }
            for address in &plan.add {
                prop_assert!(!listing.entries.contains(address));
                prop_assert!(feed.blacklist(address.family()).contains(address));
                prop_assert!(!feed.whitelist(address.family()).contains(address));
            }
        }

        #[test]
        fn prop_replanning_is_empty((feed, listing) in scenario()) {
            let first = plan(&feed, &listing, true);
            let mut entries: Vec<Address> = Vec::new();
            for family in Family::ALL {
                entries.extend(apply(&listing, &first, family).iter().cloned());
            }
            let after = Listing { entries, ..Listing::default() };
            prop_assert!(plan(&feed, &after, true).is_empty());
        }

        #[test]
        fn prop_every_listed_whitelisted_rule_removed((feed, listing) in scenario()) {
            let plan = plan(&feed, &listing, true);
            for address in &listing.entries {
                if feed.whitelist(address.family()).contains(address) {
                    let listed = listing.entries.iter().filter(|a| *a == address).count();
                    let removed = plan.remove.iter().filter(|a| *a == address).count();
                    prop_assert_eq!(listed, removed);
                }
            }
        }

        #[test]
        fn prop_single_stack_plans_only_ipv4((feed, listing) in scenario()) {
            let plan = plan(&feed, &listing, false);
            prop_assert!(plan.remove.iter().chain(&plan.add).all(|a| a.is_ipv4()));
        }
    }
}
