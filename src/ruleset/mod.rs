//! Ruleset reconciliation engine.
//!
//! Projects an ordered list of desired rule expressions onto a remote,
//! ordered Cloudflare ruleset that may also contain rules this tool does
//! not own. The pipeline is:
//!
//! ```text
//! remote rules ──► classify ──► diff ──► build_payload ──► gateway.replace
//!                     ▲           ▲
//!     tag::parse ─────┘  desired ─┘
//! ```
//!
//! Everything except [`reconcile::Reconciler`] is pure computation.

pub mod classify;
pub mod diff;
pub mod payload;
pub mod plan;
pub mod reconcile;
pub mod tag;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use classify::{classify, Classification};
pub use diff::{diff, RuleDiff, SyncMode};
pub use payload::{build_payload, Payload};
pub use plan::{plan, ReconciliationPlan};
pub use reconcile::{Phase, ReconcileOptions, ReconcileOutcome, Reconciler};
pub use tag::{managed_label, parse_sequence, MANAGED_PREFIX};

/// Action that marks an evaluation-order boundary for new managed rules
pub const ANCHOR_ACTION: RuleAction = RuleAction::Skip;

/// Rule action as reported by Cloudflare.
///
/// Unknown actions are carried verbatim in [`RuleAction::Other`] so that
/// foreign rules survive a read/write cycle unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleAction {
    Block,
    Skip,
    Challenge,
    ManagedChallenge,
    JsChallenge,
    Log,
    Other(String),
}

impl RuleAction {
    pub fn as_str(&self) -> &str {
        match self {
            RuleAction::Block => "block",
            RuleAction::Skip => "skip",
            RuleAction::Challenge => "challenge",
            RuleAction::ManagedChallenge => "managed_challenge",
            RuleAction::JsChallenge => "js_challenge",
            RuleAction::Log => "log",
            RuleAction::Other(s) => s,
        }
    }

    /// Whether new managed rules must be placed after this rule
    pub fn is_anchor(&self) -> bool {
        *self == ANCHOR_ACTION
    }
}

impl From<String> for RuleAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "block" => RuleAction::Block,
            "skip" => RuleAction::Skip,
            "challenge" => RuleAction::Challenge,
            "managed_challenge" => RuleAction::ManagedChallenge,
            "js_challenge" => RuleAction::JsChallenge,
            "log" => RuleAction::Log,
            _ => RuleAction::Other(s),
        }
    }
}

impl From<RuleAction> for String {
    fn from(action: RuleAction) -> Self {
        match action {
            RuleAction::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_enabled() -> bool {
    true
}

/// One rule of a remote ruleset.
///
/// Only the fields this tool round-trips are kept; anything else the API
/// returns is dropped when the response is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Assigned by Cloudflare, absent until the rule is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Free-text label, used to detect managed rules
    #[serde(default)]
    pub description: String,

    /// Filter expression
    pub expression: String,

    pub action: RuleAction,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Opaque pass-through parameters (e.g. the rulesets a `skip` bypasses)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_parameters: Option<serde_json::Map<String, serde_json::Value>>,
}

impl RuleEntry {
    /// New managed rule for a sequence number, blocking by default
    pub fn managed(sequence: u32, expression: impl Into<String>) -> Self {
        Self {
            id: None,
            description: managed_label(sequence),
            expression: expression.into(),
            action: RuleAction::Block,
            enabled: true,
            action_parameters: None,
        }
    }

    /// Sequence number if this rule is managed by asnwall
    pub fn sequence(&self) -> Option<u32> {
        parse_sequence(&self.description)
    }

    pub fn is_managed(&self) -> bool {
        self.sequence().is_some()
    }

    /// Copy of this rule with a replaced expression; `self` is left untouched.
    pub fn with_expression(&self, expression: impl Into<String>) -> Self {
        let mut updated = self.clone();
        updated.expression = expression.into();
        updated
    }
}

/// The full ordered rule list of one zone plus the handle used to write it back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesetSnapshot {
    pub ruleset_id: String,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}
