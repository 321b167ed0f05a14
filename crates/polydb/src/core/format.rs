//! Literal rendering shared by every dialect.
//!
//! [`render_value`] coerces a [`SqlValue`] to the neutral type of its target
//! column and renders it with the dialect's literal hooks.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::schema::{Column, DataType};
use super::traits::SqlFormatter;
use super::value::SqlValue;
use crate::error::{DbError, Result};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// `yyyy-MM-dd HH:mm:ss`, with milliseconds when present.
pub fn iso_datetime(value: NaiveDateTime) -> String {
    if value.nanosecond() == 0 {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
    }
}

/// Parse the textual date forms accepted for DateTime columns.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn mismatch(column: &Column, value: &SqlValue) -> DbError {
    DbError::Data(format!(
        "cannot convert {:?} to {:?} for column {}",
        value, column.data_type, column.name
    ))
}

fn finite(column: &Column, v: f64) -> Result<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(DbError::Data(format!(
            "non-finite value {} for column {}",
            v, column.name
        )))
    }
}

/// Render `value` as a literal for `column`.
pub fn render_value<F: SqlFormatter + ?Sized>(
    fmt: &F,
    column: &Column,
    value: &SqlValue,
) -> Result<String> {
    if value.is_null() {
        if column.nullable {
            return Ok("null".to_string());
        }
        return Ok(match column.data_type {
            DataType::String => "''".to_string(),
            DataType::Binary => fmt.null_binary().to_string(),
            _ => String::new(),
        });
    }

    match column.data_type {
        DataType::Boolean => value
            .as_bool()
            .map(|b| fmt.format_bool(b).to_string())
            .ok_or_else(|| mismatch(column, value)),

        DataType::Byte | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            match value {
                SqlValue::F32(v) => integral(column, f64::from(*v)),
                SqlValue::F64(v) => integral(column, *v),
                other => other
                    .as_i64()
                    .map(|v| v.to_string())
                    .ok_or_else(|| mismatch(column, value)),
            }
        }

        DataType::Single | DataType::Double => match value {
            SqlValue::F32(v) => Ok(finite(column, f64::from(*v))?.to_string()),
            SqlValue::F64(v) => Ok(finite(column, *v)?.to_string()),
            SqlValue::Decimal(d) => Ok(d.to_string()),
            SqlValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| mismatch(column, value))
                .and_then(|v| finite(column, v))
                .map(|v| v.to_string()),
            other => other
                .as_i64()
                .map(|v| v.to_string())
                .ok_or_else(|| mismatch(column, value)),
        },

        DataType::Decimal => match value {
            SqlValue::Decimal(d) => Ok(d.to_string()),
            SqlValue::F32(v) => Ok(finite(column, f64::from(*v))?.to_string()),
            SqlValue::F64(v) => Ok(finite(column, *v)?.to_string()),
            SqlValue::Text(s) => Decimal::from_str(s.trim())
                .map(|d| d.to_string())
                .map_err(|_| mismatch(column, value)),
            other => other
                .as_i64()
                .map(|v| v.to_string())
                .ok_or_else(|| mismatch(column, value)),
        },

        DataType::String => {
            let text = value.to_text().ok_or_else(|| mismatch(column, value))?;
            Ok(fmt.format_string(column, &text))
        }

        DataType::DateTime => {
            let dt = match value {
                SqlValue::DateTime(dt) => *dt,
                SqlValue::DateTimeOffset(dt) => dt.naive_local(),
                SqlValue::Date(d) => d.and_hms_opt(0, 0, 0).ok_or_else(|| mismatch(column, value))?,
                SqlValue::Text(s) => parse_datetime(s).ok_or_else(|| mismatch(column, value))?,
                _ => return Err(mismatch(column, value)),
            };
            fmt.format_datetime(dt)
        }

        DataType::Guid => {
            let id = match value {
                SqlValue::Uuid(u) => *u,
                SqlValue::Text(s) => {
                    Uuid::parse_str(s.trim()).map_err(|_| mismatch(column, value))?
                }
                SqlValue::Bytes(b) => Uuid::from_slice(b).map_err(|_| mismatch(column, value))?,
                _ => return Err(mismatch(column, value)),
            };
            Ok(fmt.quote_literal(&id.to_string()))
        }

        DataType::Binary => match value {
            SqlValue::Bytes(b) => Ok(fmt.format_binary(b)),
            SqlValue::Text(s) => Ok(fmt.format_binary(s.as_bytes())),
            _ => Err(mismatch(column, value)),
        },
    }
}

fn integral(column: &Column, v: f64) -> Result<String> {
    let v = finite(column, v)?;
    if v.fract() != 0.0 || v.abs() > i64::MAX as f64 {
        return Err(DbError::Data(format!(
            "value {} is not an integer for column {}",
            v, column.name
        )));
    }
    Ok((v as i64).to_string())
}
