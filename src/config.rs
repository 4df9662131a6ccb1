//! Configuration management for asnwall.
//!
//! The config file doubles as a snapshot of the Cloudflare accounts, zones
//! and rules seen during the last run; sync and setup rewrite it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::gateway::DEFAULT_API_BASE;
use crate::ruleset::RuleEntry;
use crate::rules::EXPRESSION_OVERHEAD;

/// Token value written by `setup` before the user fills in a real one
pub const PLACEHOLDER_TOKEN: &str = "YOUR_CLOUDFLARE_API_TOKEN_HERE";

/// Environment variable checked for the API token
pub const DEFAULT_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";

/// Secure string type that zeroizes memory on drop
/// Used for the API token
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cloudflare API token (needs Zone WAF edit and Zone read)
    pub api_token: SecureString,

    /// Environment variable name to read the token from (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token_env: Option<String>,

    /// Cloudflare API base URL
    pub api_base_url: String,

    /// HTTP timeout per request, in seconds
    pub timeout_secs: u64,

    /// Maximum number of rules a zone's custom ruleset may hold
    pub max_rules: usize,

    /// Maximum length of one rule expression
    pub max_expression_length: usize,

    /// CSV list of bad ASNs (first column)
    pub asn_file: PathBuf,

    /// Generated rule expressions, one per line
    pub rules_file: PathBuf,

    /// Summary of the last sync run
    pub state_file: PathBuf,

    /// Zones whose rulesets are synchronized
    pub managed_zones: Vec<ManagedZone>,

    /// Snapshot of accounts, zones and rules from the last run
    pub accounts: Vec<AccountEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_token: SecureString::default(),
            api_token_env: None,
            api_base_url: DEFAULT_API_BASE.to_string(),
            timeout_secs: 30,
            max_rules: 5,
            max_expression_length: 4096,
            asn_file: PathBuf::from("data/bad-asn-list.csv"),
            rules_file: PathBuf::from("data/cloudflare_rules.txt"),
            state_file: PathBuf::from("data/asnwall-state.json"),
            managed_zones: Vec::new(),
            accounts: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            info!("{:?} not found, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.max_rules == 0 {
            anyhow::bail!("max_rules must be at least 1");
        }

        if self.max_expression_length <= EXPRESSION_OVERHEAD {
            anyhow::bail!(
                "max_expression_length must be greater than {}",
                EXPRESSION_OVERHEAD
            );
        }

        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be at least 1");
        }

        if !self.api_base_url.starts_with("https://") {
            anyhow::bail!("api_base_url must use HTTPS: {}", self.api_base_url);
        }

        if let Some(ref name) = self.api_token_env {
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                anyhow::bail!("Invalid api_token_env '{}'", name);
            }
        }

        for zone in &self.managed_zones {
            if zone.id.trim().is_empty() {
                anyhow::bail!("Managed zone '{}' has an empty id", zone.name);
            }
        }

        Ok(())
    }

    /// Save configuration to YAML file atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        crate::utils::write_atomic(path.as_ref(), content.as_bytes())
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))
    }

    /// Get the effective token, checking env vars first
    /// Returns a SecureString that will be zeroed when dropped
    pub fn token(&self) -> SecureString {
        if let Some(ref env_name) = self.api_token_env {
            if let Ok(val) = env::var(env_name) {
                return SecureString::new(val);
            }
        }
        if let Ok(val) = env::var(DEFAULT_TOKEN_ENV) {
            return SecureString::new(val);
        }
        self.api_token.clone()
    }

    /// Whether a usable token is configured
    pub fn has_token(&self) -> bool {
        let token = self.token();
        !token.is_empty() && token.as_str() != PLACEHOLDER_TOKEN
    }

    pub fn managed_zone_ids(&self) -> HashSet<&str> {
        self.managed_zones
            .iter()
            .map(|z| z.id.as_str())
            .filter(|id| !id.is_empty())
            .collect()
    }
}

/// Reference to an account from a managed zone entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: String,
    pub name: String,
}

/// Zone to synchronize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedZone {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub account: Vec<AccountRef>,
}

/// Account snapshot with its zones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
}

/// Zone snapshot with its current custom firewall rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}
