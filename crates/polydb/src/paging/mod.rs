//! Pagination strategies.
//!
//! A strategy turns an unbounded query plus a row window into bounded SQL.
//! Strategies hold no state; the dialect picks one per server version via
//! [`Dialect::paging_style`](crate::core::traits::Dialect::paging_style).
//!
//! Contract for every style:
//!
//! | start | max | result |
//! |-------|-----|--------|
//! | <= 0  | <= 0 | input unchanged |
//! | <= 0  | > 0  | plain top-N |
//! | > 0   | > 0  | window |
//! | > 0   | <= 0 | skip only (rejected by SQL Server shapes) |

mod sqlserver;

use crate::core::sql::{find_keyword, SelectBuilder};
use crate::error::{DbError, Result};

/// Pagination algorithm shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingStyle {
    /// `LIMIT b OFFSET a`. Skip-only renders `OFFSET a`, or
    /// `LIMIT {unbounded} OFFSET a` when the engine requires a limit.
    OffsetLimit { unbounded: Option<&'static str> },
    /// `LIMIT a, b` (MySQL protocol).
    MySqlLimit,
    /// `OFFSET a ROWS FETCH NEXT b ROWS ONLY` (SQL Server 2012+).
    RowWindow,
    /// `ROW_NUMBER()` sub-select (SQL Server 2005/2008).
    RankedSubquery,
    /// `TOP` with `NOT IN` or `MAX`/`MIN` bracketing (SQL Server 2000).
    TopNotIn,
}

/// Sort direction carried by a key such as `Id desc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyDirection {
    Asc,
    Desc,
    /// Explicitly unknown; ordered ascending.
    Unknown,
}

/// Pagination key: column plus optional explicit direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageKey {
    pub column: String,
    pub direction: Option<KeyDirection>,
}

impl PageKey {
    pub fn parse(key: &str) -> Option<PageKey> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        let lower = key.to_ascii_lowercase();
        for (suffix, dir) in [
            (" asc", KeyDirection::Asc),
            (" desc", KeyDirection::Desc),
            (" unknown", KeyDirection::Unknown),
        ] {
            if lower.ends_with(suffix) {
                let column = key[..key.len() - suffix.len()].trim().to_string();
                return Some(PageKey {
                    column,
                    direction: Some(dir),
                });
            }
        }
        Some(PageKey {
            column: key.to_string(),
            direction: None,
        })
    }

    /// ORDER BY text for this key.
    pub fn order_by(&self) -> String {
        match self.direction {
            Some(KeyDirection::Desc) => format!("{} DESC", self.column),
            Some(KeyDirection::Asc) => format!("{} ASC", self.column),
            _ => self.column.clone(),
        }
    }
}

pub(crate) fn missing_key() -> DbError {
    DbError::Pagination("pagination requires a sortable key".to_string())
}

/// Paginate raw SQL text.
pub fn paginate(
    style: PagingStyle,
    sql: &str,
    start: i64,
    max: i64,
    key: Option<&str>,
) -> Result<String> {
    if start <= 0 && max <= 0 {
        return Ok(sql.to_string());
    }
    let sql = sql.trim().trim_end_matches(';').trim_end();

    match style {
        PagingStyle::OffsetLimit { .. } | PagingStyle::MySqlLimit => {
            let suffix = limit_clause(style, start, max);
            if find_keyword(sql, "limit", 0).is_some() {
                Ok(format!("SELECT * FROM ({}) t_page {}", sql, suffix))
            } else {
                Ok(format!("{} {}", sql, suffix))
            }
        }
        _ => {
            let builder = SelectBuilder::parse(sql).unwrap_or_else(|| wrap(sql));
            Ok(paginate_builder(style, builder, start, max, key)?.to_string())
        }
    }
}

/// Paginate a structured query, by mutating its limit clause or wrapping it.
pub fn paginate_builder(
    style: PagingStyle,
    mut builder: SelectBuilder,
    start: i64,
    max: i64,
    key: Option<&str>,
) -> Result<SelectBuilder> {
    if start <= 0 && max <= 0 {
        return Ok(builder);
    }
    let key = key.and_then(PageKey::parse);

    match style {
        PagingStyle::OffsetLimit { .. } | PagingStyle::MySqlLimit => {
            if builder.limit.is_some() || builder.top.is_some() {
                builder = SelectBuilder::new(format!("({}) t_page", builder));
            }
            builder.limit = Some(limit_clause(style, start, max));
            Ok(builder)
        }
        PagingStyle::RowWindow => sqlserver::row_window(builder, start, max, key),
        PagingStyle::RankedSubquery => sqlserver::ranked(builder, start, max, key),
        PagingStyle::TopNotIn => sqlserver::top_not_in(builder, start, max, key),
    }
}

fn limit_clause(style: PagingStyle, start: i64, max: i64) -> String {
    match style {
        PagingStyle::MySqlLimit => match (start > 0, max > 0) {
            (false, _) => format!("LIMIT {}", max),
            (true, true) => format!("LIMIT {}, {}", start, max),
            (true, false) => format!("LIMIT {}, 18446744073709551615", start),
        },
        PagingStyle::OffsetLimit { unbounded } => match (start > 0, max > 0) {
            (false, _) => format!("LIMIT {}", max),
            (true, true) => format!("LIMIT {} OFFSET {}", max, start),
            (true, false) => match unbounded {
                Some(all) => format!("LIMIT {} OFFSET {}", all, start),
                None => format!("OFFSET {}", start),
            },
        },
        _ => String::new(),
    }
}

/// Wrap arbitrary SQL as a derived table, lifting its top-level ORDER BY.
fn wrap(sql: &str) -> SelectBuilder {
    let (inner, order) = split_order_by(sql);
    let mut builder = SelectBuilder::new(format!("({}) t_page", inner));
    builder.order_by = order;
    builder
}

/// Split a statement at its top-level ORDER BY.
pub(crate) fn split_order_by(sql: &str) -> (String, Option<String>) {
    match find_keyword(sql, "order by", 0) {
        Some(pos) => {
            let order = sql[pos..]
                .splitn(2, |c: char| c.is_ascii_whitespace())
                .nth(1)
                .unwrap_or("")
                .trim_start();
            // drop the "BY" word
            let order = order.get(2..).unwrap_or("").trim().to_string();
            (sql[..pos].trim_end().to_string(), Some(order).filter(|o| !o.is_empty()))
        }
        None => (sql.to_string(), None),
    }
}
