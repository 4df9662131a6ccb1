//! Sync command: reconcile every managed zone with the generated rules.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{AccountEntry, AccountRef, Config, ManagedZone, ZoneEntry};
use crate::error::AsnwallError;
use crate::gateway::{CloudflareClient, RulesetGateway, ZoneDirectory};
use crate::lock::{lock_path_for, LockGuard};
use crate::rules::{build_rules_file, load_rule_expressions};
use crate::ruleset::{ReconcileOptions, ReconcileOutcome, Reconciler, RuleEntry, SyncMode};
use crate::stats::RunSummary;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncArgs {
    pub mode: SyncMode,
    pub dry_run: bool,
    /// Use the existing rules file instead of regenerating it
    pub skip_build: bool,
}

/// Zone snapshot and run summary produced by [`sync_zones`]
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub summary: RunSummary,
    pub accounts: Vec<AccountEntry>,
    pub managed_zones: Vec<ManagedZone>,
}

fn previous_rules(accounts: &[AccountEntry], zone_id: &str) -> Option<Vec<RuleEntry>> {
    accounts
        .iter()
        .flat_map(|a| a.zones.iter())
        .find(|z| z.id == zone_id)
        .map(|z| z.rules.clone())
}

/// Reconcile all managed zones visible to the token, one after another.
///
/// A failing zone is recorded in the summary and does not stop the others.
/// Accounts whose zones cannot be listed keep their previous snapshot, and
/// managed zones that were not seen stay in the managed list.
pub async fn sync_zones<D, G>(
    directory: &D,
    gateway: &G,
    config: &Config,
    expressions: &[String],
    options: ReconcileOptions,
) -> Result<SyncReport>
where
    D: ZoneDirectory + ?Sized,
    G: RulesetGateway + ?Sized,
{
    let managed_ids: HashSet<String> = config
        .managed_zone_ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    let reconciler = Reconciler::new(gateway, options);
    let mut summary = RunSummary::start(options.mode, expressions.len());

    let api_accounts = directory
        .list_accounts()
        .await
        .context("Error communicating with Cloudflare")?;

    let mut accounts: Vec<AccountEntry> = Vec::new();
    let mut managed_zones: Vec<ManagedZone> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for account in api_accounts {
        info!("Processing account '{}' ({})", account.name, account.id);

        let zones = match directory.list_zones(&account.id).await {
            Ok(zones) => zones,
            Err(e) => {
                warn!("Could not fetch zones for account {}: {:#}", account.id, e);
                if let Some(previous) = config.accounts.iter().find(|a| a.id == account.id) {
                    accounts.push(previous.clone());
                }
                continue;
            }
        };

        let mut zone_entries: Vec<ZoneEntry> = Vec::new();
        for zone in zones {
            if !managed_ids.contains(&zone.id) {
                continue;
            }
            seen.insert(zone.id.clone());

            let result = reconciler.reconcile(&zone, expressions).await;
            summary.record(&zone, &result);

            let rules = match &result {
                Ok(ReconcileOutcome::Missing) => Vec::new(),
                Ok(outcome) => match outcome.current() {
                    Some(current) => current.rules.clone(),
                    None => previous_rules(&config.accounts, &zone.id).unwrap_or_default(),
                },
                Err(e) => {
                    error!("Zone '{}' failed: {:#}", zone.name, e);
                    previous_rules(&config.accounts, &zone.id).unwrap_or_default()
                }
            };

            managed_zones.push(ManagedZone {
                id: zone.id.clone(),
                name: zone.name.clone(),
                account: vec![AccountRef {
                    id: account.id.clone(),
                    name: account.name.clone(),
                }],
            });
            zone_entries.push(ZoneEntry {
                id: zone.id,
                name: zone.name,
                rules,
            });
        }

        zone_entries.sort_by(|a, b| a.name.cmp(&b.name));
        accounts.push(AccountEntry {
            id: account.id,
            name: account.name,
            zones: zone_entries,
        });
    }

    for zone in &config.managed_zones {
        if !seen.contains(&zone.id) {
            warn!(
                "Managed zone '{}' ({}) was not synchronized in this run",
                zone.name, zone.id
            );
            managed_zones.push(zone.clone());
        }
    }

    accounts.sort_by(|a, b| a.name.cmp(&b.name));
    managed_zones.sort_by(|a, b| a.name.cmp(&b.name));
    summary.finish();

    Ok(SyncReport {
        summary,
        accounts,
        managed_zones,
    })
}

/// Run the sync command
pub async fn run(args: SyncArgs, config_path: &Path) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;
    info!("Running in apply mode ({})", args.mode);

    if !config.has_token() {
        return Err(AsnwallError::Config(format!(
            "API token not configured in {:?}. Run `asnwall setup` first.",
            config_path
        ))
        .into());
    }

    if args.skip_build {
        info!("Skipping rule build, using {:?}", config.rules_file);
    } else if config.asn_file.exists() {
        build_rules_file(
            &config.asn_file,
            &config.rules_file,
            config.max_expression_length,
        )
        .context("Build of rule expressions failed")?;
    } else {
        warn!(
            "ASN list {:?} not found, using existing {:?}",
            config.asn_file, config.rules_file
        );
    }

    let expressions = load_rule_expressions(&config.rules_file)?;

    if config.managed_zones.is_empty() {
        info!("No managed zones in {:?}. Nothing to apply.", config_path);
        return Ok(());
    }

    info!("Found {} managed zone(s):", config.managed_zones.len());
    for zone in &config.managed_zones {
        info!("  - {}", zone.name);
    }

    let _lock = LockGuard::acquire(&lock_path_for(config_path))?;

    let client = CloudflareClient::new(
        config.token(),
        &config.api_base_url,
        Duration::from_secs(config.timeout_secs),
    )?;
    let options = ReconcileOptions {
        mode: args.mode,
        max_entries: config.max_rules,
        dry_run: args.dry_run,
    };

    let report = sync_zones(&client, &client, &config, &expressions, options).await?;
    let summary = report.summary;
    info!("{}", summary.describe());

    if !args.dry_run {
        if report.accounts != config.accounts || report.managed_zones != config.managed_zones {
            info!("Configuration has changed, updating {:?}", config_path);
            config.accounts = report.accounts;
            config.managed_zones = report.managed_zones;
            config.save(config_path)?;
        } else {
            info!("Local configuration is already up-to-date");
        }

        if let Err(e) = summary.save(&config.state_file) {
            warn!("Failed to save run summary: {:#}", e);
        }
    }

    if summary.failed() > 0 {
        anyhow::bail!("{} zone(s) failed to synchronize", summary.failed());
    }

    println!();
    println!("[OK] {}", summary.describe());

    Ok(())
}
