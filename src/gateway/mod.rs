//! Access to remote rulesets (Cloudflare).

mod cloudflare;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cloudflare::{CloudflareClient, DEFAULT_API_BASE, FIREWALL_PHASE};

use crate::ruleset::{RuleEntry, RulesetSnapshot};

#[cfg(test)]
use mockall::automock;

/// Cloudflare account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
}

/// Cloudflare zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

/// Reader/writer for the custom firewall ruleset of a zone.
///
/// Implementations validate remote data at the boundary: everything handed
/// to the engine is a typed [`RuleEntry`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RulesetGateway: Send + Sync {
    /// Fetch the current ruleset. `Ok(None)` means the zone has no custom
    /// firewall ruleset yet, which is not an error.
    async fn fetch(&self, zone_id: &str) -> Result<Option<RulesetSnapshot>>;

    /// Atomically replace all rules of an existing ruleset
    async fn replace(&self, zone_id: &str, ruleset_id: &str, rules: &[RuleEntry]) -> Result<()>;

    /// Create the zone's ruleset with the given rules
    async fn create(&self, zone_id: &str, rules: &[RuleEntry]) -> Result<()>;
}

/// Listing of accounts and zones visible to the API token
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ZoneDirectory: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    async fn list_zones(&self, account_id: &str) -> Result<Vec<Zone>>;
}
