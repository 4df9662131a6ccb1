//! Rebuild the full rule list to submit.
//!
//! The Cloudflare API replaces a ruleset as a whole, so the payload is
//! always the complete ordered list. Foreign rules keep their relative
//! order; managed rules are rewritten or dropped in place. New managed rules
//! are spliced as one block right after the last anchor or the last managed
//! rule, whichever comes later.

use std::collections::BTreeMap;
use tracing::warn;

use super::{diff::RuleDiff, RuleEntry};

/// Assembled rule list plus the creations that did not fit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    pub rules: Vec<RuleEntry>,
    /// Sequence numbers skipped because the ruleset was full
    pub skipped: Vec<u32>,
}

impl Payload {
    /// Index of the first rule with the given sequence number
    pub fn position_of(&self, sequence: u32) -> Option<usize> {
        self.rules.iter().position(|r| r.sequence() == Some(sequence))
    }
}

/// Build the replacement rule list.
///
/// `max_entries` bounds the total number of rules when creating; rules
/// that are already present are never dropped to make room. Creations
/// beyond the ceiling are skipped with a warning.
pub fn build_payload(
    original: &[RuleEntry],
    diff: &RuleDiff,
    desired: &BTreeMap<u32, String>,
    max_entries: usize,
) -> Payload {
    let mut rules: Vec<RuleEntry> = Vec::with_capacity(original.len() + diff.to_create.len());
    let mut last_anchor: Option<usize> = None;
    let mut last_managed: Option<usize> = None;

    for rule in original {
        let entry = match rule.sequence() {
            Some(seq) if diff.to_delete.contains(&seq) => continue,
            Some(seq) => {
                let entry = match diff.to_update.get(&seq) {
                    Some(expression) => rule.with_expression(expression.as_str()),
                    None => rule.clone(),
                };
                last_managed = Some(rules.len());
                entry
            }
            None => rule.clone(),
        };

        if entry.action.is_anchor() {
            last_anchor = Some(rules.len());
        }
        rules.push(entry);
    }

    // Front of the list when neither an anchor nor a managed rule was seen
    let insert_at = last_anchor.max(last_managed).map_or(0, |idx| idx + 1);

    let mut created: Vec<RuleEntry> = Vec::new();
    let mut skipped: Vec<u32> = Vec::new();

    for seq in &diff.to_create {
        if rules.len() + created.len() >= max_entries {
            skipped.push(*seq);
            continue;
        }
        match desired.get(seq) {
            Some(expression) => created.push(RuleEntry::managed(*seq, expression.as_str())),
            None => warn!("No desired expression for part {}, not creating it", seq),
        }
    }

    if !skipped.is_empty() {
        warn!(
            "Ruleset limit of {} rules reached: skipped creating {} rule(s) (parts {})",
            max_entries,
            skipped.len(),
            skipped
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    rules.splice(insert_at..insert_at, created);

    Payload { rules, skipped }
}
