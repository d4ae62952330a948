//! Migration orchestrator - top-level run coordinator.
//!
//! Connects, introspects the source catalog, provisions destination tables,
//! then reconciles columns and replicates rows one table at a time before
//! emitting a run report. Tables run in a fixed alphabetical order and
//! everything inside the run is strictly sequential. Both database
//! connections live for the whole run and are released on every exit path
//! when the orchestrator is dropped.

use crate::catalog::{self, TableDescriptor};
use crate::config::Config;
use crate::db::Db;
use crate::error::Result;
use crate::media::{AssetMigrator, AssetUrlPattern, MediaClient};
use crate::provision::Provisioner;
use crate::reconcile;
use crate::replicate::{self, TableOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Db,
    target: Db,
}

/// Per-table entry of the run report.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    /// Table name.
    pub table: String,

    /// Final status: "copied", "skipped" or "failed".
    pub status: String,

    /// Rows read from the source.
    pub rows_read: u64,

    /// Rows written to the destination.
    pub rows_written: u64,

    /// Assets migrated while copying this table.
    pub assets_migrated: u64,

    /// Assets whose transfer failed while copying this table.
    pub assets_failed: u64,

    /// Skip reason or failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TableReport {
    fn from_outcome(table: &TableDescriptor, outcome: TableOutcome) -> Self {
        let (status, detail) = match outcome.skipped {
            Some(reason) => ("skipped".to_string(), Some(reason.to_string())),
            None => ("copied".to_string(), None),
        };
        Self {
            table: table.name.clone(),
            status,
            rows_read: outcome.rows_read,
            rows_written: outcome.rows_written,
            assets_migrated: outcome.assets_migrated,
            assets_failed: outcome.assets_failed,
            detail,
        }
    }

    fn failed(table: &TableDescriptor, message: String) -> Self {
        Self {
            table: table.name.clone(),
            status: "failed".to_string(),
            rows_read: 0,
            rows_written: 0,
            assets_migrated: 0,
            assets_failed: 0,
            detail: Some(message),
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed", or "completed_with_failures" when some
    /// tables failed but the run finished.
    pub status: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Total tables discovered in the source.
    pub tables_total: usize,

    /// Tables copied successfully.
    pub tables_copied: usize,

    /// Tables skipped (empty source, no common columns).
    pub tables_skipped: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Total rows written to the destination.
    pub rows_written: u64,

    /// Distinct assets migrated across the whole run (cache entries).
    pub assets_migrated: u64,

    /// Total failed asset transfers.
    pub assets_failed: u64,

    /// Per-table details.
    pub tables: Vec<TableReport>,
}

impl RunReport {
    /// Names of tables that failed.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.status == "failed")
            .map(|t| t.table.as_str())
            .collect()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Connect to both databases and build the orchestrator.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let source = Db::connect("source", &config.source.database_url).await?;
        let target = Db::connect("target", &config.target.database_url).await?;

        Ok(Self {
            config,
            source,
            target,
        })
    }

    /// Run the migration.
    pub async fn run(self) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        // Phase 1: source catalog
        info!("Phase 1: introspecting source schema");
        let names = catalog::list_tables(&self.source, &self.config.source.schema).await?;
        info!(
            "Found {} tables in source schema '{}'",
            names.len(),
            self.config.source.schema
        );

        let mut source_tables = Vec::with_capacity(names.len());
        for name in &names {
            source_tables
                .push(catalog::load_table(&self.source, &self.config.source.schema, name).await?);
        }

        // Run-scoped asset migrator: single owner, one cache for all tables.
        let pattern = AssetUrlPattern::for_account(&self.config.source.media.account);
        let source_media = MediaClient::new(self.config.source.media.clone())?;
        let target_media = MediaClient::new(self.config.target.media.clone())?;
        let mut migrator =
            AssetMigrator::new(pattern, Arc::new(source_media), Arc::new(target_media));

        // Phase 2: provisioning (fatal if any table cannot be produced)
        info!("Phase 2: provisioning destination schema");
        let provisioner = Provisioner::new(
            &self.source,
            &self.target,
            &self.config.source.schema,
            &self.config.target.schema,
            self.config.bootstrap_command.as_deref(),
            &source_tables,
        );
        for table in &source_tables {
            provisioner.ensure(&table.name).await?;
        }

        // Phase 3: reconcile and copy, one table at a time
        info!("Phase 3: copying tables");
        let mut tables = Vec::with_capacity(source_tables.len());
        for descriptor in &source_tables {
            match self.copy_table(descriptor, &mut migrator).await {
                Ok(outcome) => tables.push(TableReport::from_outcome(descriptor, outcome)),
                Err(e) => {
                    error!("{}: copy failed - {}", descriptor.full_name(), e);
                    tables.push(TableReport::failed(descriptor, e.to_string()));
                }
            }
        }

        // Build result
        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let tables_copied = tables.iter().filter(|t| t.status == "copied").count();
        let tables_skipped = tables.iter().filter(|t| t.status == "skipped").count();
        let tables_failed = tables.iter().filter(|t| t.status == "failed").count();
        let rows_written: u64 = tables.iter().map(|t| t.rows_written).sum();
        let assets_failed: u64 = tables.iter().map(|t| t.assets_failed).sum();

        let status = if tables_failed > 0 {
            "completed_with_failures"
        } else {
            "completed"
        };

        let report = RunReport {
            run_id,
            status: status.to_string(),
            started_at,
            completed_at,
            duration_seconds: duration,
            tables_total: source_tables.len(),
            tables_copied,
            tables_skipped,
            tables_failed,
            rows_written,
            assets_migrated: migrator.cache_len() as u64,
            assets_failed,
            tables,
        };

        info!(
            "Migration {}: {}/{} tables, {} rows, {} assets in {:.1}s",
            report.status,
            report.tables_copied,
            report.tables_total,
            report.rows_written,
            report.assets_migrated,
            report.duration_seconds
        );

        Ok(report)
    }

    /// Reconcile one table's columns, then replicate its rows.
    ///
    /// The destination descriptor is re-introspected after reconciliation so
    /// serialization sees the actual destination column set.
    async fn copy_table(
        &self,
        descriptor: &TableDescriptor,
        migrator: &mut AssetMigrator,
    ) -> Result<TableOutcome> {
        let target_schema = &self.config.target.schema;

        let before =
            catalog::load_table(&self.target, target_schema, &descriptor.name).await?;
        reconcile::reconcile(&self.target, target_schema, descriptor, &before).await;
        let after = catalog::load_table(&self.target, target_schema, &descriptor.name).await?;

        replicate::replicate(&self.source, &self.target, descriptor, &after, migrator).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> TableDescriptor {
        TableDescriptor {
            schema: "public".to_string(),
            name: name.to_string(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    #[test]
    fn test_table_report_statuses() {
        let copied = TableReport::from_outcome(
            &descriptor("partners"),
            TableOutcome {
                rows_read: 3,
                rows_written: 3,
                assets_migrated: 3,
                assets_failed: 0,
                skipped: None,
            },
        );
        assert_eq!(copied.status, "copied");
        assert!(copied.detail.is_none());

        let skipped = TableReport::from_outcome(
            &descriptor("empty_table"),
            TableOutcome {
                skipped: Some("source empty"),
                ..TableOutcome::default()
            },
        );
        assert_eq!(skipped.status, "skipped");
        assert_eq!(skipped.detail.as_deref(), Some("source empty"));

        let failed = TableReport::failed(&descriptor("articles"), "boom".to_string());
        assert_eq!(failed.status, "failed");
    }

    #[test]
    fn test_run_report_lists_failed_tables() {
        let report = RunReport {
            run_id: "r".to_string(),
            status: "completed_with_failures".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 0.1,
            tables_total: 2,
            tables_copied: 1,
            tables_skipped: 0,
            tables_failed: 1,
            rows_written: 10,
            assets_migrated: 4,
            assets_failed: 1,
            tables: vec![
                TableReport::failed(&descriptor("articles"), "boom".to_string()),
                TableReport::from_outcome(&descriptor("partners"), TableOutcome::default()),
            ],
        };
        assert_eq!(report.failed_tables(), vec!["articles"]);
        assert!(report.to_json().unwrap().contains("\"articles\""));
    }
}
