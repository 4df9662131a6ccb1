//! Planning: diff and assemble the payload from a classification.

use std::collections::BTreeMap;

use super::classify::{classify, Classification};
use super::diff::{desired_map, diff, RuleDiff, SyncMode};
use super::payload::{build_payload, Payload};
use super::RuleEntry;

/// Everything the driver needs to decide whether and what to write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPlan {
    pub diff: RuleDiff,
    pub payload: Payload,
    pub duplicates: Vec<u32>,
}

impl ReconciliationPlan {
    /// True when applying the plan would change nothing.
    ///
    /// Creations that were all skipped at capacity leave the list as it is,
    /// so they do not count as a change.
    pub fn is_noop(&self) -> bool {
        self.diff.to_update.is_empty()
            && self.diff.to_delete.is_empty()
            && self
                .diff
                .to_create
                .iter()
                .all(|seq| self.payload.skipped.contains(seq))
    }

    pub fn updated_count(&self) -> usize {
        self.diff.to_update.len()
    }

    pub fn created_count(&self) -> usize {
        self.diff
            .to_create
            .len()
            .saturating_sub(self.payload.skipped.len())
    }

    pub fn deleted_count(&self) -> usize {
        self.diff.to_delete.len()
    }
}

/// Plan the reconciliation of `current` towards `desired`.
pub fn plan(
    current: &[RuleEntry],
    desired: &[String],
    mode: SyncMode,
    max_entries: usize,
) -> ReconciliationPlan {
    plan_classified(
        current,
        classify(current),
        &desired_map(desired),
        mode,
        max_entries,
    )
}

/// Plan from an existing classification of `current`.
///
/// The payload is only rebuilt when the diff is non-empty; otherwise it is
/// the current list unchanged.
pub fn plan_classified(
    current: &[RuleEntry],
    classification: Classification,
    desired: &BTreeMap<u32, String>,
    mode: SyncMode,
    max_entries: usize,
) -> ReconciliationPlan {
    let diff = diff(&classification.managed, desired, mode);

    let payload = if diff.is_empty() {
        Payload {
            rules: current.to_vec(),
            skipped: Vec::new(),
        }
    } else {
        build_payload(current, &diff, desired, max_entries)
    };

    ReconciliationPlan {
        diff,
        payload,
        duplicates: classification.duplicates,
    }
}
