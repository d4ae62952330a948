//! Column reconciliation: add source columns missing from the destination.
//!
//! Runs once per table per run, after the table is confirmed to exist and
//! before any row is inserted. A column that cannot be added is logged and
//! simply stays out of the working set; it never aborts the table.

use crate::catalog::{self, ColumnDescriptor, TableDescriptor};
use crate::db::Db;
use tracing::{debug, info, warn};

/// Columns present in the source but absent from the destination.
pub fn missing_columns<'a>(
    source: &'a TableDescriptor,
    target: &TableDescriptor,
) -> Vec<&'a ColumnDescriptor> {
    source
        .columns
        .iter()
        .filter(|column| target.column(&column.name).is_none())
        .collect()
}

/// Bring the destination table's column set up to the source's, copying
/// type, nullability and non-volatile default. Returns how many columns
/// were added.
pub async fn reconcile(
    target_db: &Db,
    target_schema: &str,
    source: &TableDescriptor,
    target: &TableDescriptor,
) -> usize {
    let missing = missing_columns(source, target);
    if missing.is_empty() {
        debug!("{}: destination columns already match", source.full_name());
        return 0;
    }

    let mut added = 0;
    for column in missing {
        let sql = catalog::add_column_sql(target_schema, &source.name, column);
        match target_db.execute(&sql, &[]).await {
            Ok(_) => {
                info!(
                    "{}: added missing column {} ({})",
                    source.full_name(),
                    column.name,
                    column.sql_type
                );
                added += 1;
            }
            Err(e) => {
                warn!(
                    "{}: could not add column {}, it will not be copied: {}",
                    source.full_name(),
                    column.name,
                    e
                );
            }
        }
    }
    added
}
