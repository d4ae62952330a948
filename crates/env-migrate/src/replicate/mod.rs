//! Table replication: stream source rows into the truncated destination copy.
//!
//! Rows are processed strictly in sequence, one at a time, so the media
//! host sees a bounded request rate and the migration cache fills in a
//! deterministic order. The only destructive statement is the destination
//! truncate; the source sees a single `SELECT`.

use crate::catalog::{quote_ident, ColumnDescriptor, TableDescriptor};
use crate::db::Db;
use crate::error::{MigrateError, Result};
use crate::media::AssetMigrator;
use crate::value::{self, CellValue};
use tokio_postgres::types::ToSql;
use tracing::{debug, info, warn};

/// Progress log cadence, in rows.
const PROGRESS_EVERY: u64 = 10;

/// Counters for one table's copy.
#[derive(Debug, Clone, Default)]
pub struct TableOutcome {
    /// Rows read from the source.
    pub rows_read: u64,

    /// Rows written to the destination.
    pub rows_written: u64,

    /// Assets migrated while copying this table.
    pub assets_migrated: u64,

    /// Assets whose transfer failed while copying this table.
    pub assets_failed: u64,

    /// Why the table was skipped, when it was.
    pub skipped: Option<&'static str>,
}

impl TableOutcome {
    fn skipped(reason: &'static str) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

/// The column set usable this run: source columns that also exist in the
/// destination after reconciliation, in source column order. Each pair is
/// (source column, destination column); the destination side drives
/// serialization.
pub fn working_columns<'s, 't>(
    source: &'s TableDescriptor,
    target: &'t TableDescriptor,
) -> Vec<(&'s ColumnDescriptor, &'t ColumnDescriptor)> {
    source
        .columns
        .iter()
        .filter_map(|sc| target.column(&sc.name).map(|tc| (sc, tc)))
        .collect()
}

/// `SELECT` for all source rows, ordered by primary key when one exists so
/// runs are deterministic.
pub fn select_sql(source: &TableDescriptor, columns: &[&ColumnDescriptor]) -> String {
    let col_list = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT {} FROM {}", col_list, source.qualified());
    if !source.primary_key.is_empty() {
        let order = source
            .primary_key
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ORDER BY {}", order));
    }
    sql
}

/// Parameterized `INSERT` over the working column set, preserving order.
pub fn insert_sql(target: &TableDescriptor, columns: &[&ColumnDescriptor]) -> String {
    let col_list = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        target.qualified(),
        col_list,
        placeholders
    )
}

/// Copy one table from source to destination.
///
/// A read failure is fatal for this table's copy only; an insert failure
/// aborts this table mid-way (the destination is left partial). Both are
/// surfaced as errors for the caller to record; other tables still run.
pub async fn replicate(
    source_db: &Db,
    target_db: &Db,
    source: &TableDescriptor,
    target: &TableDescriptor,
    migrator: &mut AssetMigrator,
) -> Result<TableOutcome> {
    let assets_before = migrator.stats();

    let working = working_columns(source, target);
    if working.is_empty() {
        warn!(
            "{}: no columns in common with the destination, skipping",
            source.full_name()
        );
        return Ok(TableOutcome::skipped("no common columns"));
    }
    let source_cols: Vec<&ColumnDescriptor> = working.iter().map(|(sc, _)| *sc).collect();

    let select = select_sql(source, &source_cols);
    let rows = source_db
        .query(&select, &[])
        .await
        .map_err(|e| MigrateError::copy(&source.name, format!("reading source rows: {}", e)))?;

    if rows.is_empty() {
        info!(
            "{}: source table is empty, destination left as-is",
            source.full_name()
        );
        return Ok(TableOutcome::skipped("source empty"));
    }

    info!("{}: copying {} rows", source.full_name(), rows.len());

    let truncate = format!("TRUNCATE TABLE {} CASCADE", target.qualified());
    target_db
        .execute(&truncate, &[])
        .await
        .map_err(|e| MigrateError::copy(&source.name, format!("truncating destination: {}", e)))?;
    debug!("{}: destination truncated", source.full_name());

    let insert = insert_sql(target, &source_cols);
    let statement = target_db
        .prepare(&insert)
        .await
        .map_err(|e| MigrateError::copy(&source.name, format!("preparing insert: {}", e)))?;

    let total = rows.len() as u64;
    let mut written = 0u64;

    for row in &rows {
        let mut values: Vec<CellValue> = Vec::with_capacity(working.len());
        for (idx, (_, target_col)) in working.iter().enumerate() {
            let mut cell = value::from_row(row, idx);
            migrator.rewrite_cell(&mut cell).await;
            values.push(value::prepare_for_column(cell, target_col));
        }

        let params: Vec<&(dyn ToSql + Sync)> = values
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect();

        target_db
            .execute_prepared(&statement, &params)
            .await
            .map_err(|e| {
                MigrateError::copy(
                    &source.name,
                    format!("inserting row {} of {}: {}", written + 1, total, e),
                )
            })?;

        written += 1;
        if written % PROGRESS_EVERY == 0 {
            info!("{}: {}/{} rows copied", source.full_name(), written, total);
        }
    }

    let assets_after = migrator.stats();
    info!("{}: copied {} rows", source.full_name(), written);

    Ok(TableOutcome {
        rows_read: total,
        rows_written: written,
        assets_migrated: assets_after.migrated - assets_before.migrated,
        assets_failed: assets_after.failed - assets_before.failed,
        skipped: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, sql_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            is_nullable: true,
            default: None,
        }
    }

    fn table(name: &str, columns: Vec<ColumnDescriptor>, pk: &[&str]) -> TableDescriptor {
        TableDescriptor {
            schema: "public".to_string(),
            name: name.to_string(),
            columns,
            primary_key: pk.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_working_columns_keep_source_order() {
        let source = table(
            "partners",
            vec![
                column("id", "integer"),
                column("name", "text"),
                column("image", "text"),
            ],
            &["id"],
        );
        let target = table(
            "partners",
            vec![
                column("image", "text"),
                column("id", "bigint"),
            ],
            &["id"],
        );

        let working = working_columns(&source, &target);
        let names: Vec<&str> = working.iter().map(|(sc, _)| sc.name.as_str()).collect();
        assert_eq!(names, vec!["id", "image"]);
        // Serialization follows the destination's declared type.
        assert_eq!(working[0].1.sql_type, "bigint");
    }

    #[test]
    fn test_working_columns_empty_when_disjoint() {
        let source = table("a", vec![column("x", "text")], &[]);
        let target = table("a", vec![column("y", "text")], &[]);
        assert!(working_columns(&source, &target).is_empty());
    }

    #[test]
    fn test_select_orders_by_primary_key() {
        let source = table(
            "partners",
            vec![column("id", "integer"), column("image", "text")],
            &["id"],
        );
        let cols: Vec<&ColumnDescriptor> = source.columns.iter().collect();
        assert_eq!(
            select_sql(&source, &cols),
            "SELECT \"id\", \"image\" FROM \"public\".\"partners\" ORDER BY \"id\""
        );
    }

    #[test]
    fn test_select_without_primary_key_has_no_order() {
        let source = table("notes", vec![column("body", "text")], &[]);
        let cols: Vec<&ColumnDescriptor> = source.columns.iter().collect();
        assert_eq!(
            select_sql(&source, &cols),
            "SELECT \"body\" FROM \"public\".\"notes\""
        );
    }

    #[test]
    fn test_insert_preserves_column_order() {
        let target = table(
            "partners",
            vec![column("id", "integer"), column("image", "text")],
            &["id"],
        );
        let cols: Vec<&ColumnDescriptor> = target.columns.iter().collect();
        assert_eq!(
            insert_sql(&target, &cols),
            "INSERT INTO \"public\".\"partners\" (\"id\", \"image\") VALUES ($1, $2)"
        );
    }
}
