//! Reconciliation driver for one zone.
//!
//! A pass moves through
//! `Idle -> Fetching -> Classifying -> Diffing -> (NoChangeFound | Applying)
//! -> (Applied | ApplyFailed)`. The write is a single atomic replace; nothing
//! is retried here (transport retries belong to the gateway). After a
//! successful write the ruleset is fetched again, since the locally
//! assembled list is never trusted as the new remote state.

use anyhow::{Context, Result};
use std::fmt;
use tracing::{debug, error, info, warn};

use super::classify::classify;
use super::diff::{desired_map, SyncMode};
use super::plan::{plan_classified, ReconciliationPlan};
use super::{managed_label, RulesetSnapshot};
use crate::gateway::{RulesetGateway, Zone};

/// State of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Classifying,
    Diffing,
    NoChangeFound,
    Applying,
    Applied,
    ApplyFailed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Fetching => "fetching",
            Phase::Classifying => "classifying",
            Phase::Diffing => "diffing",
            Phase::NoChangeFound => "no change found",
            Phase::Applying => "applying",
            Phase::Applied => "applied",
            Phase::ApplyFailed => "apply failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub mode: SyncMode,
    /// Maximum number of rules the ruleset may hold
    pub max_entries: usize,
    /// Plan only, never write
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Full,
            max_entries: 5,
            dry_run: false,
        }
    }
}

/// Result of a successful pass
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Remote state already matches; nothing was written
    NoChange { current: Option<RulesetSnapshot> },
    /// Changes were written
    Applied {
        plan: ReconciliationPlan,
        /// The zone had no ruleset and one was created
        created_ruleset: bool,
        /// Refetched state, `None` if the confirmation fetch failed
        current: Option<RulesetSnapshot>,
    },
    /// No ruleset exists and update-only mode does not create one
    Missing,
    /// Dry run: the plan that would have been applied
    Planned { plan: ReconciliationPlan },
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, ReconcileOutcome::Applied { .. })
    }

    /// Creations skipped because of the rule ceiling
    pub fn skipped(&self) -> &[u32] {
        match self {
            ReconcileOutcome::Applied { plan, .. } | ReconcileOutcome::Planned { plan } => {
                &plan.payload.skipped
            }
            _ => &[],
        }
    }

    /// Best known remote state after the pass
    pub fn current(&self) -> Option<&RulesetSnapshot> {
        match self {
            ReconcileOutcome::NoChange { current } | ReconcileOutcome::Applied { current, .. } => {
                current.as_ref()
            }
            _ => None,
        }
    }
}

/// Drives reconciliation passes through a [`RulesetGateway`]
pub struct Reconciler<'a, G: RulesetGateway + ?Sized> {
    gateway: &'a G,
    options: ReconcileOptions,
}

impl<'a, G: RulesetGateway + ?Sized> Reconciler<'a, G> {
    pub fn new(gateway: &'a G, options: ReconcileOptions) -> Self {
        Self { gateway, options }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    fn enter(zone: &Zone, phase: &mut Phase, next: Phase) {
        debug!("Zone '{}': {} -> {}", zone.name, phase, next);
        *phase = next;
    }

    /// Run one pass for `zone` towards the desired expressions.
    ///
    /// Fails when the ruleset cannot be fetched or the write is rejected; in
    /// both cases the remote state is unchanged.
    pub async fn reconcile(&self, zone: &Zone, desired: &[String]) -> Result<ReconcileOutcome> {
        let mode = self.options.mode;
        let mut phase = Phase::Idle;
        info!("Synchronizing zone '{}' ({})", zone.name, mode);

        Self::enter(zone, &mut phase, Phase::Fetching);
        let snapshot = self
            .gateway
            .fetch(&zone.id)
            .await
            .with_context(|| format!("Could not fetch firewall ruleset for zone '{}'", zone.name))?;

        if snapshot.is_none() {
            if !mode.allows_structural_changes() {
                info!(
                    "No ruleset found for zone '{}', skipping in {} mode",
                    zone.name, mode
                );
                return Ok(ReconcileOutcome::Missing);
            }
            info!("No custom firewall ruleset found for zone '{}'", zone.name);
        }

        let current = snapshot.as_ref().map_or(&[][..], |s| s.rules.as_slice());

        Self::enter(zone, &mut phase, Phase::Classifying);
        let classification = classify(current);
        if !classification.duplicates.is_empty() {
            warn!(
                "Zone '{}' has duplicate managed rules for parts {:?}",
                zone.name, classification.duplicates
            );
        }

        Self::enter(zone, &mut phase, Phase::Diffing);
        let desired = desired_map(desired);
        let plan = plan_classified(
            current,
            classification,
            &desired,
            mode,
            self.options.max_entries,
        );
        log_plan(&plan);

        if plan.is_noop() {
            Self::enter(zone, &mut phase, Phase::NoChangeFound);
            if plan.payload.skipped.is_empty() {
                info!("All managed rules in zone '{}' are up-to-date", zone.name);
            } else {
                warn!(
                    "Zone '{}' is full: {} rule(s) could not be created, nothing else to change",
                    zone.name,
                    plan.payload.skipped.len()
                );
            }
            return Ok(ReconcileOutcome::NoChange { current: snapshot });
        }

        if self.options.dry_run {
            info!(
                "[dry-run] Would apply {} update(s), {} creation(s), {} deletion(s) to zone '{}'",
                plan.updated_count(),
                plan.created_count(),
                plan.deleted_count(),
                zone.name
            );
            return Ok(ReconcileOutcome::Planned { plan });
        }

        Self::enter(zone, &mut phase, Phase::Applying);
        info!(
            "Applying {} rule(s) to zone '{}' in a single batch",
            plan.payload.rules.len(),
            zone.name
        );
        let write = match &snapshot {
            Some(s) => {
                self.gateway
                    .replace(&zone.id, &s.ruleset_id, &plan.payload.rules)
                    .await
            }
            None => self.gateway.create(&zone.id, &plan.payload.rules).await,
        };

        if let Err(e) = write {
            Self::enter(zone, &mut phase, Phase::ApplyFailed);
            error!("Failed to update ruleset for zone '{}': {:#}", zone.name, e);
            return Err(e.context(format!("Ruleset update rejected for zone '{}'", zone.name)));
        }

        Self::enter(zone, &mut phase, Phase::Applied);
        info!("Ruleset synchronized for zone '{}'", zone.name);

        debug!("Refetching zone '{}' to confirm the new state", zone.name);
        let refreshed = match self.gateway.fetch(&zone.id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    "Could not refetch ruleset for zone '{}' after update: {:#}",
                    zone.name, e
                );
                None
            }
        };

        Ok(ReconcileOutcome::Applied {
            plan,
            created_ruleset: snapshot.is_none(),
            current: refreshed,
        })
    }
}

fn log_plan(plan: &ReconciliationPlan) {
    for seq in plan.diff.to_update.keys() {
        info!("  * Update: '{}'", managed_label(*seq));
    }
    for seq in &plan.diff.to_create {
        if !plan.payload.skipped.contains(seq) {
            info!("  + Create: '{}'", managed_label(*seq));
        }
    }
    for seq in &plan.diff.to_delete {
        info!("  - Delete: '{}'", managed_label(*seq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::FakeGateway;
    use crate::gateway::MockRulesetGateway;
    use crate::ruleset::testutil::{anchor, desired, foreign, managed};
    use crate::ruleset::RuleEntry;

    fn zone() -> Zone {
        Zone {
            id: "z1".to_string(),
            name: "example.com".to_string(),
        }
    }

    fn options(mode: SyncMode, max_entries: usize) -> ReconcileOptions {
        ReconcileOptions {
            mode,
            max_entries,
            dry_run: false,
        }
    }

    fn labels(rules: &[RuleEntry]) -> Vec<String> {
        rules.iter().map(|r| r.description.clone()).collect()
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let gateway = FakeGateway::with_rules("z1", vec![foreign("a"), managed(1, "old")]);
        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 10));
        let wanted = desired(&["c1", "c2"]);

        let first = reconciler.reconcile(&zone(), &wanted).await.unwrap();
        assert!(first.changed());
        assert_eq!(gateway.write_count(), 1);

        let second = reconciler.reconcile(&zone(), &wanted).await.unwrap();
        assert!(matches!(second, ReconcileOutcome::NoChange { .. }));
        assert!(!second.changed());
        assert_eq!(gateway.write_count(), 1);
    }

    #[tokio::test]
    async fn test_applied_refetches_state() {
        let gateway = FakeGateway::with_rules("z1", vec![foreign("a")]);
        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 10));

        let outcome = reconciler
            .reconcile(&zone(), &desired(&["c1"]))
            .await
            .unwrap();

        // Initial fetch plus the confirmation fetch
        assert_eq!(gateway.fetch_count(), 2);
        let current = outcome.current().unwrap();
        assert_eq!(current.rules.len(), 2);
        // The refetched rule carries the id assigned remotely
        assert!(current.rules[0].id.as_deref().unwrap().starts_with("generated-"));
    }

    #[tokio::test]
    async fn test_anchor_precedence_end_to_end() {
        let gateway = FakeGateway::with_rules(
            "z1",
            vec![anchor("skip-monitoring"), managed(1, "c1"), foreign("tail")],
        );
        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 10));
        reconciler
            .reconcile(&zone(), &desired(&["c1", "c2"]))
            .await
            .unwrap();

        assert_eq!(
            labels(&gateway.rules("z1")),
            vec![
                "skip-monitoring",
                "Block-Bad-ASNs-Part-1",
                "Block-Bad-ASNs-Part-2",
                "tail"
            ]
        );
    }

    #[tokio::test]
    async fn test_update_only_suppresses_create_and_delete() {
        let gateway = FakeGateway::with_rules(
            "z1",
            vec![managed(1, "c1"), managed(2, "stale"), managed(3, "c3")],
        );
        let reconciler = Reconciler::new(&gateway, options(SyncMode::UpdateOnly, 10));
        // Part 3 is no longer desired
        let wanted = desired(&["c1", "fresh"]);

        let outcome = reconciler.reconcile(&zone(), &wanted).await.unwrap();
        assert!(outcome.changed());

        let rules = gateway.rules("z1");
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[1].expression, "fresh");
        assert_eq!(rules[2].description, "Block-Bad-ASNs-Part-3");
        assert_eq!(rules[2].expression, "c3");
    }

    #[tokio::test]
    async fn test_update_only_does_not_create_new_parts() {
        let gateway = FakeGateway::with_rules("z1", vec![managed(1, "c1"), managed(2, "stale")]);
        let reconciler = Reconciler::new(&gateway, options(SyncMode::UpdateOnly, 10));

        reconciler
            .reconcile(&zone(), &desired(&["c1", "fresh", "c3"]))
            .await
            .unwrap();

        let rules = gateway.rules("z1");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].expression, "fresh");
    }

    #[tokio::test]
    async fn test_capacity_ceiling() {
        let gateway = FakeGateway::with_rules(
            "z1",
            vec![foreign("a"), foreign("b"), foreign("c"), foreign("d")],
        );
        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 5));

        let outcome = reconciler
            .reconcile(&zone(), &desired(&["c1", "c2", "c3"]))
            .await
            .unwrap();

        assert_eq!(outcome.skipped(), &[2, 3]);
        assert_eq!(gateway.rules("z1").len(), 5);
    }

    #[tokio::test]
    async fn test_full_ruleset_is_not_rewritten() {
        let gateway = FakeGateway::with_rules("z1", vec![foreign("a"), foreign("b")]);
        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 2));

        for _ in 0..2 {
            let outcome = reconciler
                .reconcile(&zone(), &desired(&["c1"]))
                .await
                .unwrap();
            assert!(matches!(outcome, ReconcileOutcome::NoChange { .. }));
            assert!(!outcome.changed());
        }

        assert_eq!(gateway.write_count(), 0);
        assert_eq!(labels(&gateway.rules("z1")), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_ruleset_is_created_in_full_mode() {
        let gateway = FakeGateway::new();
        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 10));

        let outcome = reconciler
            .reconcile(&zone(), &desired(&["c1", "c2"]))
            .await
            .unwrap();

        match &outcome {
            ReconcileOutcome::Applied {
                created_ruleset, ..
            } => assert!(*created_ruleset),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            labels(&gateway.rules("z1")),
            vec!["Block-Bad-ASNs-Part-1", "Block-Bad-ASNs-Part-2"]
        );
    }

    #[tokio::test]
    async fn test_missing_ruleset_skipped_in_update_only_mode() {
        let gateway = FakeGateway::new();
        let reconciler = Reconciler::new(&gateway, options(SyncMode::UpdateOnly, 10));

        let outcome = reconciler
            .reconcile(&zone(), &desired(&["c1"]))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Missing);
        assert_eq!(gateway.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_ruleset_with_nothing_desired() {
        let gateway = FakeGateway::new();
        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 10));
        let outcome = reconciler.reconcile(&zone(), &[]).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::NoChange { current: None });
        assert_eq!(gateway.write_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let gateway = FakeGateway::with_rules("z1", vec![managed(1, "old")]);
        let reconciler = Reconciler::new(
            &gateway,
            ReconcileOptions {
                mode: SyncMode::Full,
                max_entries: 10,
                dry_run: true,
            },
        );

        let outcome = reconciler
            .reconcile(&zone(), &desired(&["new"]))
            .await
            .unwrap();
        match outcome {
            ReconcileOutcome::Planned { plan } => assert_eq!(plan.updated_count(), 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(gateway.write_count(), 0);
        assert_eq!(gateway.rules("z1")[0].expression, "old");
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_without_write() {
        let mut gateway = MockRulesetGateway::new();
        gateway
            .expect_fetch()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        gateway.expect_replace().never();
        gateway.expect_create().never();

        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 10));
        let err = reconciler
            .reconcile(&zone(), &desired(&["c1"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("example.com"));
    }

    #[tokio::test]
    async fn test_noop_issues_no_write() {
        let mut gateway = MockRulesetGateway::new();
        gateway.expect_fetch().times(1).returning(|_| {
            Ok(Some(RulesetSnapshot {
                ruleset_id: "rs".to_string(),
                rules: vec![foreign("a"), managed(1, "c1")],
            }))
        });
        gateway.expect_replace().never();
        gateway.expect_create().never();

        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 10));
        let outcome = reconciler
            .reconcile(&zone(), &desired(&["c1"]))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::NoChange { .. }));
    }

    #[tokio::test]
    async fn test_write_called_once_with_full_list() {
        let mut gateway = MockRulesetGateway::new();
        gateway.expect_fetch().times(2).returning(|_| {
            Ok(Some(RulesetSnapshot {
                ruleset_id: "rs-7".to_string(),
                rules: vec![foreign("a"), managed(1, "old")],
            }))
        });
        gateway
            .expect_replace()
            .times(1)
            .withf(|zone_id, ruleset_id, rules| {
                zone_id == "z1"
                    && ruleset_id == "rs-7"
                    && rules.len() == 2
                    && rules[0].description == "a"
                    && rules[1].expression == "new"
            })
            .returning(|_, _, _| Ok(()));

        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 10));
        let outcome = reconciler
            .reconcile(&zone(), &desired(&["new"]))
            .await
            .unwrap();
        assert!(outcome.changed());
    }

    #[tokio::test]
    async fn test_apply_failure_reported() {
        let mut gateway = FakeGateway::with_rules("z1", vec![managed(1, "old")]);
        gateway.fail_writes = true;
        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 10));

        let err = reconciler
            .reconcile(&zone(), &desired(&["new"]))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("simulated API failure"));
        assert_eq!(gateway.rules("z1")[0].expression, "old");
        // No confirmation fetch after a failed write
        assert_eq!(gateway.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_refetch_failure_still_reports_applied() {
        let mut gateway = MockRulesetGateway::new();
        let mut calls = 0;
        gateway.expect_fetch().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(Some(RulesetSnapshot {
                    ruleset_id: "rs".to_string(),
                    rules: vec![],
                }))
            } else {
                Err(anyhow::anyhow!("timeout"))
            }
        });
        gateway.expect_replace().times(1).returning(|_, _, _| Ok(()));

        let reconciler = Reconciler::new(&gateway, options(SyncMode::Full, 10));
        let outcome = reconciler
            .reconcile(&zone(), &desired(&["c1"]))
            .await
            .unwrap();
        assert!(outcome.changed());
        assert!(outcome.current().is_none());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::NoChangeFound.to_string(), "no change found");
        assert_eq!(Phase::ApplyFailed.to_string(), "apply failed");
    }
}
