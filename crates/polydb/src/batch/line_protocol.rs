//! InfluxDB line protocol.
//!
//! `measurement,tag=v field=1i,name="x" 1700000000000000000`
//!
//! Indexed columns become tags, the `time` column (or the first DateTime
//! column) becomes the timestamp, everything else is a field. Null fields
//! are omitted.

use chrono::NaiveDateTime;

use super::{BatchRequest, BatchStatement};
use crate::core::format::parse_datetime;
use crate::core::identifier::NameRules;
use crate::core::schema::{Column, DataType};
use crate::core::value::SqlValue;
use crate::error::{DbError, Result};

/// Nanoseconds since the Unix epoch.
pub(crate) fn epoch_nanos(value: NaiveDateTime) -> Result<i64> {
    value
        .and_utc()
        .timestamp_nanos_opt()
        .ok_or_else(|| DbError::Data(format!("timestamp {} is out of range", value)))
}

fn escape_key(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn escape_field_string(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn timestamp(column: &Column, value: &SqlValue) -> Result<i64> {
    let dt = match value {
        SqlValue::DateTime(dt) => *dt,
        SqlValue::DateTimeOffset(dt) => dt.naive_utc(),
        SqlValue::Date(d) => d.and_hms_opt(0, 0, 0).unwrap_or_default(),
        SqlValue::Text(s) => parse_datetime(s).ok_or_else(|| bad(column, value))?,
        other => return other.as_i64().ok_or_else(|| bad(column, value)),
    };
    epoch_nanos(dt)
}

fn bad(column: &Column, value: &SqlValue) -> DbError {
    DbError::Data(format!(
        "cannot write {:?} to field {} as {:?}",
        value, column.name, column.data_type
    ))
}

fn field_value(column: &Column, value: &SqlValue) -> Result<String> {
    Ok(match column.data_type {
        dt if dt.is_integer() => format!(
            "{}i",
            value.as_i64().ok_or_else(|| bad(column, value))?
        ),
        DataType::Boolean => value
            .as_bool()
            .map(|b| b.to_string())
            .ok_or_else(|| bad(column, value))?,
        DataType::Single | DataType::Double | DataType::Decimal => match value {
            SqlValue::F32(v) if v.is_finite() => v.to_string(),
            SqlValue::F64(v) if v.is_finite() => v.to_string(),
            SqlValue::Decimal(d) => d.to_string(),
            other => other
                .as_i64()
                .map(|v| v.to_string())
                .or_else(|| other.to_text().filter(|t| t.trim().parse::<f64>().is_ok()))
                .ok_or_else(|| bad(column, value))?,
        },
        DataType::Binary => match value {
            SqlValue::Bytes(b) => escape_field_string(&hex::encode(b)),
            other => escape_field_string(&other.to_text().ok_or_else(|| bad(column, value))?),
        },
        _ => escape_field_string(&value.to_text().ok_or_else(|| bad(column, value))?),
    })
}

/// Render rows as line protocol, `batch_size` lines per statement.
pub(super) fn render(
    names: &NameRules,
    request: &BatchRequest,
    columns: &[&Column],
    batch_size: usize,
) -> Result<Vec<BatchStatement>> {
    let table = &request.table;
    let measurement = escape_key(&names.table_raw(&table.name));

    let time_index = columns
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case("time"))
        .or_else(|| columns.iter().position(|c| c.data_type == DataType::DateTime));
    let is_tag = |c: &Column| {
        table
            .indexes
            .iter()
            .any(|i| i.columns.iter().any(|n| n.eq_ignore_ascii_case(&c.name)))
    };

    let mut lines = Vec::with_capacity(request.rows.len());
    for row in &request.rows {
        let mut line = measurement.clone();
        let mut fields = Vec::new();
        let mut stamp = None;
        for (i, (column, value)) in columns.iter().zip(row).enumerate() {
            if value.is_null() {
                continue;
            }
            if Some(i) == time_index {
                stamp = Some(timestamp(column, value)?);
            } else if is_tag(column) {
                let text = value.to_text().ok_or_else(|| bad(column, value))?;
                line.push_str(&format!(",{}={}", escape_key(&column.name), escape_key(&text)));
            } else {
                fields.push(format!(
                    "{}={}",
                    escape_key(&column.name),
                    field_value(column, value)?
                ));
            }
        }
        if fields.is_empty() {
            return Err(DbError::Data(format!(
                "a point in {} needs at least one non-null field",
                table.name
            )));
        }
        line.push(' ');
        line.push_str(&fields.join(","));
        if let Some(ns) = stamp {
            line.push_str(&format!(" {}", ns));
        }
        lines.push(line);
    }

    Ok(lines
        .chunks(batch_size)
        .map(|chunk| BatchStatement {
            sql: chunk.join("\n"),
            params: Vec::new(),
        })
        .collect())
}
