//! Cell value model for type-safe row handling.
//!
//! A cell is an explicit tagged variant so the asset-URL rewrite is total
//! and exhaustive: strings and JSON documents are traversed, everything
//! else (numbers, dates, binary, ...) passes through completely untouched.

use crate::catalog::ColumnDescriptor;
use bytes::BytesMut;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::Row;
use uuid::Uuid;

/// One cell of one row, as read from the source database.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (integer).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real).
    F32(f32),

    /// 64-bit floating point (double precision).
    F64(f64),

    /// Text data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID value.
    Uuid(Uuid),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// JSON document (json/jsonb columns).
    Json(serde_json::Value),

    /// Timestamp without timezone.
    Timestamp(NaiveDateTime),

    /// Timestamp with timezone offset.
    TimestampTz(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl CellValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

/// Convert one cell of a result row into a `CellValue`, driven by the
/// column's wire type.
pub fn from_row(row: &Row, idx: usize) -> CellValue {
    let ty = row.columns()[idx].type_().name();

    match ty {
        "bool" => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Bool)
            .unwrap_or(CellValue::Null),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(CellValue::I16)
            .unwrap_or(CellValue::Null),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(CellValue::I32)
            .unwrap_or(CellValue::Null),
        "int8" => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(CellValue::I64)
            .unwrap_or(CellValue::Null),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(CellValue::F32)
            .unwrap_or(CellValue::Null),
        "float8" => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(CellValue::F64)
            .unwrap_or(CellValue::Null),
        "uuid" => row
            .try_get::<_, Option<Uuid>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Uuid)
            .unwrap_or(CellValue::Null),
        "numeric" => row
            .try_get::<_, Option<Decimal>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Decimal)
            .unwrap_or(CellValue::Null),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Json)
            .unwrap_or(CellValue::Null),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Timestamp)
            .unwrap_or(CellValue::Null),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<FixedOffset>>>(idx)
            .ok()
            .flatten()
            .map(CellValue::TimestampTz)
            .unwrap_or(CellValue::Null),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Date)
            .unwrap_or(CellValue::Null),
        "time" => row
            .try_get::<_, Option<NaiveTime>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Time)
            .unwrap_or(CellValue::Null),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Bytes)
            .unwrap_or(CellValue::Null),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(CellValue::Text)
            .unwrap_or(CellValue::Null),
    }
}

impl ToSql for CellValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            CellValue::Null => Ok(IsNull::Yes),
            CellValue::Bool(v) => v.to_sql(ty, out),
            CellValue::I16(v) => v.to_sql(ty, out),
            CellValue::I32(v) => v.to_sql(ty, out),
            CellValue::I64(v) => v.to_sql(ty, out),
            CellValue::F32(v) => v.to_sql(ty, out),
            CellValue::F64(v) => v.to_sql(ty, out),
            CellValue::Text(v) => v.to_sql(ty, out),
            CellValue::Bytes(v) => v.to_sql(ty, out),
            CellValue::Uuid(v) => v.to_sql(ty, out),
            CellValue::Decimal(v) => v.to_sql(ty, out),
            CellValue::Json(v) => v.to_sql(ty, out),
            CellValue::Timestamp(v) => v.to_sql(ty, out),
            CellValue::TimestampTz(v) => v.to_sql(ty, out),
            CellValue::Date(v) => v.to_sql(ty, out),
            CellValue::Time(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Per-variant compatibility is enforced by the delegated encoders;
        // destination-type coercion happens in prepare_for_column.
        true
    }

    to_sql_checked!();
}

/// Serialize a cell for its destination column.
///
/// Values bound for JSON columns are round-tripped through parse→stringify
/// so the destination always receives valid JSON; timestamp-like values
/// bound for text columns are rendered as ISO-8601 strings; integers are
/// widened to the destination integer width; everything else passes through
/// unchanged.
pub fn prepare_for_column(value: CellValue, column: &ColumnDescriptor) -> CellValue {
    let ty = column.sql_type.to_lowercase();

    if is_json_type(&ty) {
        return match value {
            CellValue::Null => CellValue::Null,
            CellValue::Json(v) => CellValue::Json(v),
            CellValue::Text(s) => CellValue::Json(canonical_json(&s)),
            other => CellValue::Json(to_json_value(other)),
        };
    }

    if is_text_type(&ty) {
        return match value {
            CellValue::Json(v) => CellValue::Text(v.to_string()),
            CellValue::Timestamp(t) => CellValue::Text(render_timestamp(&t)),
            CellValue::TimestampTz(t) => CellValue::Text(t.to_rfc3339()),
            CellValue::Date(d) => CellValue::Text(d.to_string()),
            CellValue::Time(t) => CellValue::Text(t.to_string()),
            other => other,
        };
    }

    match ty.as_str() {
        "bigint" => match value {
            CellValue::I16(v) => CellValue::I64(v as i64),
            CellValue::I32(v) => CellValue::I64(v as i64),
            other => other,
        },
        "integer" => match value {
            CellValue::I16(v) => CellValue::I32(v as i32),
            other => other,
        },
        _ => value,
    }
}

/// Parse text into JSON, falling back to a JSON string so row content is
/// never lost when a JSON column holds unparsable text.
pub fn canonical_json(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}

/// Render a naive timestamp as an unambiguous ISO-8601 string.
pub fn render_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn is_json_type(ty: &str) -> bool {
    ty == "json" || ty == "jsonb"
}

fn is_text_type(ty: &str) -> bool {
    ty == "text" || ty == "name" || ty.starts_with("character")
}

fn to_json_value(value: CellValue) -> serde_json::Value {
    use serde_json::Value;

    match value {
        CellValue::Bool(b) => Value::Bool(b),
        CellValue::I16(v) => Value::from(v),
        CellValue::I32(v) => Value::from(v),
        CellValue::I64(v) => Value::from(v),
        CellValue::F32(v) => serde_json::Number::from_f64(v as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        CellValue::F64(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        CellValue::Uuid(v) => Value::String(v.to_string()),
        CellValue::Decimal(v) => Value::String(v.to_string()),
        CellValue::Timestamp(t) => Value::String(render_timestamp(&t)),
        CellValue::TimestampTz(t) => Value::String(t.to_rfc3339()),
        CellValue::Date(d) => Value::String(d.to_string()),
        CellValue::Time(t) => Value::String(t.to_string()),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(sql_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: "value".to_string(),
            sql_type: sql_type.to_string(),
            is_nullable: true,
            default: None,
        }
    }

    #[test]
    fn test_json_column_round_trips_text() {
        let prepared = prepare_for_column(
            CellValue::Text(r#"{"sections": [1, 2]}"#.to_string()),
            &column("jsonb"),
        );
        assert_eq!(
            prepared,
            CellValue::Json(serde_json::json!({"sections": [1, 2]}))
        );
    }

    #[test]
    fn test_unparsable_text_becomes_json_string() {
        let prepared = prepare_for_column(
            CellValue::Text("not { json".to_string()),
            &column("json"),
        );
        assert_eq!(
            prepared,
            CellValue::Json(serde_json::Value::String("not { json".to_string()))
        );
    }

    #[test]
    fn test_timestamp_renders_iso8601_for_text_column() {
        let ts = NaiveDate::from_ymd_opt(2021, 3, 14)
            .unwrap()
            .and_hms_milli_opt(9, 26, 53, 589)
            .unwrap();
        let prepared = prepare_for_column(CellValue::Timestamp(ts), &column("text"));
        assert_eq!(
            prepared,
            CellValue::Text("2021-03-14T09:26:53.589".to_string())
        );
    }

    #[test]
    fn test_integer_widening_for_bigint_column() {
        assert_eq!(
            prepare_for_column(CellValue::I32(7), &column("bigint")),
            CellValue::I64(7)
        );
        assert_eq!(
            prepare_for_column(CellValue::I16(7), &column("integer")),
            CellValue::I32(7)
        );
    }

    #[test]
    fn test_passthrough_for_matching_types() {
        let bytes = CellValue::Bytes(vec![0xde, 0xad]);
        assert_eq!(prepare_for_column(bytes.clone(), &column("bytea")), bytes);

        let text = CellValue::Text("plain".to_string());
        assert_eq!(
            prepare_for_column(text.clone(), &column("character varying(255)")),
            text
        );
    }

    #[test]
    fn test_null_stays_null_for_json_column() {
        assert_eq!(
            prepare_for_column(CellValue::Null, &column("jsonb")),
            CellValue::Null
        );
    }

    #[test]
    fn test_json_document_rendered_for_text_column() {
        let prepared = prepare_for_column(
            CellValue::Json(serde_json::json!({"a": 1})),
            &column("text"),
        );
        assert_eq!(prepared, CellValue::Text(r#"{"a":1}"#.to_string()));
    }
}
