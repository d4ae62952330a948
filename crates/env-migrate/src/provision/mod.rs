//! Destination schema provisioning with ordered fallback strategies.
//!
//! A table missing from the destination is created by trying, in order:
//! the destination application's own schema bootstrap, a structural clone of
//! the full source schema, and finally an ad hoc `CREATE TABLE` for the one
//! missing table. The list short-circuits on first success; exhausting it is
//! fatal for the run, since nothing downstream can proceed without the table.

use crate::catalog::{self, TableDescriptor};
use crate::db::Db;
use crate::error::{MigrateError, Result};
use tracing::{debug, info, warn};

/// One named provisioning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Run the destination's own declared-schema bootstrap command.
    DeclarativeApply,

    /// Replay the entire introspected source schema as `CREATE TABLE`
    /// statements, skipping volatile defaults.
    StructuralClone,

    /// Introspect just the missing table from the source and issue a single
    /// `CREATE TABLE IF NOT EXISTS`.
    TableCreate,
}

impl Strategy {
    /// The fallback order. Strategies are re-attempted per table, since
    /// different tables can fail for different reasons.
    pub const ORDERED: [Strategy; 3] = [
        Strategy::DeclarativeApply,
        Strategy::StructuralClone,
        Strategy::TableCreate,
    ];

    /// Human-readable name for log output.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DeclarativeApply => "declarative apply",
            Strategy::StructuralClone => "structural clone",
            Strategy::TableCreate => "per-table create",
        }
    }
}

/// Ensures destination tables exist before any data is copied into them.
pub struct Provisioner<'a> {
    source: &'a Db,
    target: &'a Db,
    source_schema: &'a str,
    target_schema: &'a str,
    bootstrap_command: Option<&'a str>,
    source_tables: &'a [TableDescriptor],
}

impl<'a> Provisioner<'a> {
    /// Create a provisioner over the already-introspected source catalog.
    pub fn new(
        source: &'a Db,
        target: &'a Db,
        source_schema: &'a str,
        target_schema: &'a str,
        bootstrap_command: Option<&'a str>,
        source_tables: &'a [TableDescriptor],
    ) -> Self {
        Self {
            source,
            target,
            source_schema,
            target_schema,
            bootstrap_command,
            source_tables,
        }
    }

    /// Make sure a table exists in the destination, or fail the run.
    pub async fn ensure(&self, table: &str) -> Result<()> {
        if catalog::table_exists(self.target, self.target_schema, table).await? {
            debug!("{}: already present in destination", table);
            return Ok(());
        }

        for strategy in Strategy::ORDERED {
            info!("{}: missing in destination, trying {}", table, strategy.name());

            if let Err(e) = self.apply(strategy, table).await {
                warn!("{}: {} failed: {}", table, strategy.name(), e);
                continue;
            }

            if catalog::table_exists(self.target, self.target_schema, table).await? {
                info!("{}: provisioned via {}", table, strategy.name());
                return Ok(());
            }

            debug!("{}: {} ran but the table is still missing", table, strategy.name());
        }

        Err(MigrateError::provision(
            table,
            "no provisioning strategy produced the table",
        ))
    }

    async fn apply(&self, strategy: Strategy, table: &str) -> Result<()> {
        match strategy {
            Strategy::DeclarativeApply => self.run_bootstrap().await,
            Strategy::StructuralClone => self.clone_structure().await,
            Strategy::TableCreate => self.create_one(table).await,
        }
    }

    /// Run the destination application's own schema bootstrap.
    async fn run_bootstrap(&self) -> Result<()> {
        let Some(command) = self.bootstrap_command else {
            return Err(MigrateError::Bootstrap(
                "TARGET_BOOTSTRAP_COMMAND is not set".to_string(),
            ));
        };

        info!("running destination bootstrap: {}", command);
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .await?;

        if !status.success() {
            return Err(MigrateError::Bootstrap(format!(
                "command exited with {}",
                status
            )));
        }
        Ok(())
    }

    /// Replay the full source schema on the destination.
    async fn clone_structure(&self) -> Result<()> {
        for descriptor in self.source_tables {
            if catalog::table_exists(self.target, self.target_schema, &descriptor.name).await? {
                continue;
            }
            let ddl = catalog::create_table_sql(descriptor, self.target_schema);
            self.target.execute(&ddl, &[]).await?;
            debug!("created {}.{}", self.target_schema, descriptor.name);
        }
        Ok(())
    }

    /// Create a single missing table from a fresh source introspection.
    async fn create_one(&self, table: &str) -> Result<()> {
        let descriptor = catalog::load_table(self.source, self.source_schema, table).await?;
        if descriptor.columns.is_empty() {
            return Err(MigrateError::provision(
                table,
                "table not present in source catalog",
            ));
        }
        let ddl = catalog::create_table_sql(&descriptor, self.target_schema);
        self.target.execute(&ddl, &[]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_order_is_fixed() {
        assert_eq!(
            Strategy::ORDERED,
            [
                Strategy::DeclarativeApply,
                Strategy::StructuralClone,
                Strategy::TableCreate,
            ]
        );
    }

    #[test]
    fn test_strategy_names_are_distinct() {
        let names: Vec<&str> = Strategy::ORDERED.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), 3);
        assert!(names.windows(2).all(|pair| pair[0] != pair[1]));
    }
}
