//! Run summary: per-zone results of a sync, persisted as JSON.
//!
//! The summary is an explicit accumulator passed through the sync loop;
//! nothing here is global.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::gateway::Zone;
use crate::ruleset::{ReconcileOutcome, SyncMode};
use crate::utils::write_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    Unchanged,
    Applied,
    Created,
    Missing,
    Planned,
    Failed,
}

/// Result of one zone's pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneReport {
    pub zone_id: String,
    pub zone_name: String,
    pub status: ZoneStatus,
    #[serde(default)]
    pub updated: usize,
    #[serde(default)]
    pub created: usize,
    #[serde(default)]
    pub deleted: usize,
    /// Parts not created because the ruleset was full
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Accumulated results of a sync run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub mode: SyncMode,
    pub rule_count: usize,
    pub zones: Vec<ZoneReport>,
}

impl RunSummary {
    pub fn start(mode: SyncMode, rule_count: usize) -> Self {
        Self {
            started_at: Some(Utc::now()),
            finished_at: None,
            mode,
            rule_count,
            zones: Vec::new(),
        }
    }

    /// Record the result of one zone's pass
    pub fn record(&mut self, zone: &Zone, result: &Result<ReconcileOutcome>) {
        let mut report = ZoneReport {
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            status: ZoneStatus::Failed,
            updated: 0,
            created: 0,
            deleted: 0,
            skipped: Vec::new(),
            error: None,
        };

        match result {
            Ok(ReconcileOutcome::NoChange { .. }) => report.status = ZoneStatus::Unchanged,
            Ok(ReconcileOutcome::Missing) => report.status = ZoneStatus::Missing,
            Ok(ReconcileOutcome::Planned { plan }) => {
                report.status = ZoneStatus::Planned;
                report.updated = plan.updated_count();
                report.created = plan.created_count();
                report.deleted = plan.deleted_count();
                report.skipped = plan.payload.skipped.clone();
            }
            Ok(ReconcileOutcome::Applied {
                plan,
                created_ruleset,
                ..
            }) => {
                report.status = if *created_ruleset {
                    ZoneStatus::Created
                } else {
                    ZoneStatus::Applied
                };
                report.updated = plan.updated_count();
                report.created = plan.created_count();
                report.deleted = plan.deleted_count();
                report.skipped = plan.payload.skipped.clone();
            }
            Err(e) => report.error = Some(format!("{:#}", e)),
        }

        self.zones.push(report);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn count(&self, status: ZoneStatus) -> usize {
        self.zones.iter().filter(|z| z.status == status).count()
    }

    pub fn failed(&self) -> usize {
        self.count(ZoneStatus::Failed)
    }

    /// Total creations skipped because of the rule ceiling
    pub fn skipped_creations(&self) -> usize {
        self.zones.iter().map(|z| z.skipped.len()).sum()
    }

    /// One-line summary for the end of a run
    pub fn describe(&self) -> String {
        let mut line = format!(
            "{} zone(s): {} applied, {} created, {} unchanged, {} missing, {} failed",
            self.zones.len(),
            self.count(ZoneStatus::Applied),
            self.count(ZoneStatus::Created),
            self.count(ZoneStatus::Unchanged),
            self.count(ZoneStatus::Missing),
            self.failed()
        );
        let planned = self.count(ZoneStatus::Planned);
        if planned > 0 {
            line.push_str(&format!(", {} planned (dry-run)", planned));
        }
        let skipped = self.skipped_creations();
        if skipped > 0 {
            line.push_str(&format!(", {} rule(s) skipped at capacity", skipped));
        }
        line
    }

    /// Load a summary from file; a missing file yields an empty summary
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {:?}", path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, content.as_bytes())
    }
}
