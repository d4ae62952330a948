//! Catalog introspection and DDL generation.
//!
//! Table and column descriptors are discovered from `information_schema` and
//! `pg_catalog`, and are immutable per run: after any destination schema
//! change the destination descriptor is re-introspected rather than patched.

use crate::db::Db;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Column definitions, in ordinal order.
    pub columns: Vec<ColumnDescriptor>,

    /// Primary key column names.
    pub primary_key: Vec<String>,
}

impl TableDescriptor {
    /// Get the fully qualified table name for log output.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Get the quoted, schema-qualified identifier for SQL statements.
    pub fn qualified(&self) -> String {
        qualify_table(&self.schema, &self.name)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// SQL type name as rendered by `format_type` (e.g. "character varying(255)").
    pub sql_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Default expression, if any.
    pub default: Option<String>,
}

impl ColumnDescriptor {
    /// Default expression, excluding volatile sequence defaults that may not
    /// exist on the destination.
    pub fn portable_default(&self) -> Option<&str> {
        self.default
            .as_deref()
            .filter(|expr| !expr.contains("nextval("))
    }

    /// Column fragment for `CREATE TABLE` / `ADD COLUMN` statements.
    pub fn ddl_fragment(&self) -> String {
        let mut fragment = format!("{} {}", quote_ident(&self.name), self.sql_type);
        if !self.is_nullable {
            fragment.push_str(" NOT NULL");
        }
        if let Some(default) = self.portable_default() {
            fragment.push_str(&format!(" DEFAULT {}", default));
        }
        fragment
    }
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualify a table name with schema and proper quoting.
pub fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// List the base tables of a schema, in a fixed alphabetical order.
pub async fn list_tables(db: &Db, schema: &str) -> Result<Vec<String>> {
    let query = r#"
        SELECT table_name
        FROM information_schema.tables
        WHERE table_type = 'BASE TABLE'
          AND table_schema = $1
        ORDER BY table_name
    "#;

    let rows = db.query(query, &[&schema]).await?;
    Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
}

/// Check whether a table exists.
pub async fn table_exists(db: &Db, schema: &str, table: &str) -> Result<bool> {
    let row = db
        .query_one(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )",
            &[&schema, &table],
        )
        .await?;
    Ok(row.get(0))
}

/// Load the full descriptor (columns and primary key) for one table.
pub async fn load_table(db: &Db, schema: &str, name: &str) -> Result<TableDescriptor> {
    let mut table = TableDescriptor {
        schema: schema.to_string(),
        name: name.to_string(),
        columns: Vec::new(),
        primary_key: Vec::new(),
    };

    load_columns(db, &mut table).await?;
    load_primary_key(db, &mut table).await?;
    Ok(table)
}

/// Load columns for a table.
async fn load_columns(db: &Db, table: &mut TableDescriptor) -> Result<()> {
    let query = r#"
        SELECT a.attname,
               pg_catalog.format_type(a.atttypid, a.atttypmod),
               NOT a.attnotnull,
               pg_catalog.pg_get_expr(d.adbin, d.adrelid)
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_catalog.pg_attrdef d
               ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE n.nspname = $1
          AND c.relname = $2
          AND a.attnum > 0
          AND NOT a.attisdropped
        ORDER BY a.attnum
    "#;

    let rows = db.query(query, &[&table.schema, &table.name]).await?;

    for row in rows {
        table.columns.push(ColumnDescriptor {
            name: row.get::<_, String>(0),
            sql_type: row.get::<_, String>(1),
            is_nullable: row.get::<_, bool>(2),
            default: row.get::<_, Option<String>>(3),
        });
    }

    debug!(
        "Loaded {} columns for {}",
        table.columns.len(),
        table.full_name()
    );
    Ok(())
}

/// Load primary key column names for a table.
async fn load_primary_key(db: &Db, table: &mut TableDescriptor) -> Result<()> {
    let query = r#"
        SELECT a.attname
        FROM pg_catalog.pg_constraint c
        JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
        WHERE n.nspname = $1
          AND t.relname = $2
          AND c.contype = 'p'
          AND a.attnum = ANY(c.conkey)
        ORDER BY array_position(c.conkey, a.attnum)
    "#;

    let rows = db.query(query, &[&table.schema, &table.name]).await?;

    for row in rows {
        table.primary_key.push(row.get::<_, String>(0));
    }

    debug!(
        "Primary key for {}: {:?}",
        table.full_name(),
        table.primary_key
    );
    Ok(())
}

/// Generate `CREATE TABLE IF NOT EXISTS` DDL for a table descriptor.
///
/// Volatile sequence defaults are skipped; the primary key is declared
/// inline when the source has one.
pub fn create_table_sql(table: &TableDescriptor, target_schema: &str) -> String {
    let mut ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n",
        qualify_table(target_schema, &table.name)
    );

    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|col| format!("    {}", col.ddl_fragment()))
        .collect();

    if !table.primary_key.is_empty() {
        let pk_cols: Vec<String> = table.primary_key.iter().map(|c| quote_ident(c)).collect();
        lines.push(format!("    PRIMARY KEY ({})", pk_cols.join(", ")));
    }

    ddl.push_str(&lines.join(",\n"));
    ddl.push_str("\n)");
    ddl
}

/// Generate `ALTER TABLE ... ADD COLUMN` DDL for one missing column.
pub fn add_column_sql(target_schema: &str, table: &str, column: &ColumnDescriptor) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        qualify_table(target_schema, table),
        column.ddl_fragment()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, sql_type: &str, nullable: bool, default: Option<&str>) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            is_nullable: nullable,
            default: default.map(|d| d.to_string()),
        }
    }

    fn partners() -> TableDescriptor {
        TableDescriptor {
            schema: "public".to_string(),
            name: "partners".to_string(),
            columns: vec![
                column("id", "integer", false, Some("nextval('partners_id_seq'::regclass)")),
                column("name", "character varying(255)", true, None),
                column("image", "text", true, None),
                column("created_at", "timestamp with time zone", true, Some("now()")),
            ],
            primary_key: vec!["id".to_string()],
        }
    }

    #[test]
    fn test_create_table_skips_sequence_default() {
        let ddl = create_table_sql(&partners(), "public");
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"partners\""));
        assert!(!ddl.contains("nextval"));
        assert!(ddl.contains("\"id\" integer NOT NULL"));
        assert!(ddl.contains("\"created_at\" timestamp with time zone DEFAULT now()"));
        assert!(ddl.contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn test_create_table_without_primary_key() {
        let mut table = partners();
        table.primary_key.clear();
        let ddl = create_table_sql(&table, "public");
        assert!(!ddl.contains("PRIMARY KEY"));
    }

    #[test]
    fn test_add_column_carries_type_and_nullability() {
        let col = column("twitter", "character varying(255)", false, None);
        let sql = add_column_sql("public", "team_members", &col);
        assert_eq!(
            sql,
            "ALTER TABLE \"public\".\"team_members\" ADD COLUMN \"twitter\" character varying(255) NOT NULL"
        );
    }

    #[test]
    fn test_add_column_keeps_portable_default() {
        let col = column("active", "boolean", true, Some("true"));
        let sql = add_column_sql("public", "partners", &col);
        assert!(sql.ends_with("\"active\" boolean DEFAULT true"));
    }

    #[test]
    fn test_quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }
}
