//! Setup command: discover accounts and zones and write the config file.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{
    AccountEntry, AccountRef, Config, ManagedZone, SecureString, ZoneEntry, PLACEHOLDER_TOKEN,
};
use crate::gateway::{CloudflareClient, RulesetGateway, ZoneDirectory};

/// Accounts and zones visible to the token
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub accounts: Vec<AccountEntry>,
    pub managed_zones: Vec<ManagedZone>,
}

/// List every account and zone along with the zone's current rules.
///
/// Every discovered zone becomes managed. A zone whose ruleset cannot be
/// read is still listed, with no rules, and an account whose zones cannot
/// be listed is kept without zones.
pub async fn discover<D, G>(directory: &D, gateway: &G) -> Result<Discovery>
where
    D: ZoneDirectory + ?Sized,
    G: RulesetGateway + ?Sized,
{
    let mut discovery = Discovery::default();

    let accounts = directory
        .list_accounts()
        .await
        .context("Failed to list accounts")?;

    for account in accounts {
        info!("Account: {} ({})", account.name, account.id);

        let zones = match directory.list_zones(&account.id).await {
            Ok(zones) => zones,
            Err(e) => {
                warn!("Could not list zones for account {}: {:#}", account.id, e);
                Vec::new()
            }
        };

        let mut entries = Vec::with_capacity(zones.len());
        for zone in zones {
            let rules = match gateway.fetch(&zone.id).await {
                Ok(Some(snapshot)) => snapshot.rules,
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!("Could not read rules for zone '{}': {:#}", zone.name, e);
                    Vec::new()
                }
            };
            info!("  Zone: {} ({} rule(s))", zone.name, rules.len());

            discovery.managed_zones.push(ManagedZone {
                id: zone.id.clone(),
                name: zone.name.clone(),
                account: vec![AccountRef {
                    id: account.id.clone(),
                    name: account.name.clone(),
                }],
            });
            entries.push(ZoneEntry {
                id: zone.id,
                name: zone.name,
                rules,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        discovery.accounts.push(AccountEntry {
            id: account.id,
            name: account.name,
            zones: entries,
        });
    }

    discovery.accounts.sort_by(|a, b| a.name.cmp(&b.name));
    discovery.managed_zones.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(discovery)
}

/// Run the setup command
pub async fn run(config_path: &Path) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;

    if !config.has_token() {
        // Other settings of an existing file are kept
        if config.api_token.as_str() != PLACEHOLDER_TOKEN {
            config.api_token = SecureString::from(PLACEHOLDER_TOKEN);
            config.save(config_path)?;
            println!("Wrote a placeholder token to {:?}.", config_path);
        }
        println!(
            "Set a valid api_token in {:?} (or export CLOUDFLARE_API_TOKEN) and run setup again.",
            config_path
        );
        return Ok(());
    }

    let client = CloudflareClient::new(
        config.token(),
        &config.api_base_url,
        Duration::from_secs(config.timeout_secs),
    )?;

    let discovery = discover(&client, &client).await?;
    let zone_count = discovery.managed_zones.len();

    config.accounts = discovery.accounts;
    config.managed_zones = discovery.managed_zones;
    config.save(config_path)?;

    println!(
        "[OK] Wrote {} account(s) and {} zone(s) to {:?}",
        config.accounts.len(),
        zone_count,
        config_path
    );
    Ok(())
}
