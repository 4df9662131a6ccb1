//! Compare managed rules against the desired expressions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::RuleEntry;

/// Reconciliation mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Create, update and delete managed rules
    #[default]
    Full,
    /// Only rewrite expressions of managed rules that already exist
    UpdateOnly,
}

impl SyncMode {
    pub fn allows_structural_changes(self) -> bool {
        self == SyncMode::Full
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Full => f.write_str("full sync"),
            SyncMode::UpdateOnly => f.write_str("update-only"),
        }
    }
}

/// Sequence numbers to update, create and delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDiff {
    /// Sequence number -> new expression
    pub to_update: BTreeMap<u32, String>,
    pub to_create: BTreeSet<u32>,
    pub to_delete: BTreeSet<u32>,
}

impl RuleDiff {
    pub fn is_empty(&self) -> bool {
        self.to_update.is_empty() && self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Key desired expressions by their 1-based sequence number
pub fn desired_map(desired: &[String]) -> BTreeMap<u32, String> {
    (1u32..).zip(desired.iter().cloned()).collect()
}

/// Compute the diff between managed rules and desired expressions.
///
/// Only the expression is compared, byte for byte. A managed rule whose
/// expression matches is left alone even if it was disabled or its
/// parameters changed. In [`SyncMode::UpdateOnly`] creations and deletions
/// are dropped.
pub fn diff(
    managed: &BTreeMap<u32, RuleEntry>,
    desired: &BTreeMap<u32, String>,
    mode: SyncMode,
) -> RuleDiff {
    let to_update: BTreeMap<u32, String> = managed
        .iter()
        .filter_map(|(seq, rule)| {
            desired
                .get(seq)
                .filter(|expression| **expression != rule.expression)
                .map(|expression| (*seq, expression.clone()))
        })
        .collect();

    if !mode.allows_structural_changes() {
        return RuleDiff {
            to_update,
            ..Default::default()
        };
    }

    let to_create = desired
        .keys()
        .filter(|seq| !managed.contains_key(seq))
        .copied()
        .collect();
    let to_delete = managed
        .keys()
        .filter(|seq| !desired.contains_key(seq))
        .copied()
        .collect();

    RuleDiff {
        to_update,
        to_create,
        to_delete,
    }
}
