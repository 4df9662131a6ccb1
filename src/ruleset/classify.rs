//! Split a remote rule list into managed and foreign rules.

use std::collections::BTreeMap;
use tracing::warn;

use super::RuleEntry;

/// Managed rules of a ruleset, keyed by sequence number.
///
/// Foreign rules are not collected here: they keep their place in the
/// original list, which the payload builder walks again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub managed: BTreeMap<u32, RuleEntry>,
    /// Sequence numbers claimed by more than one rule
    pub duplicates: Vec<u32>,
}

impl Classification {
    pub fn managed_count(&self) -> usize {
        self.managed.len()
    }
}

/// Classify rules in their original order.
///
/// When two rules claim the same sequence number, the later one wins and
/// the number is recorded in [`Classification::duplicates`].
pub fn classify(rules: &[RuleEntry]) -> Classification {
    let mut result = Classification::default();

    for rule in rules {
        let Some(sequence) = rule.sequence() else {
            continue;
        };
        if result.managed.insert(sequence, rule.clone()).is_some() {
            warn!(
                "Duplicate managed rule '{}' in ruleset, keeping the last one",
                rule.description
            );
            if !result.duplicates.contains(&sequence) {
                result.duplicates.push(sequence);
            }
        }
    }

    result
}
