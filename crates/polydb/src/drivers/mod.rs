//! Backend dialect implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`mssql`]: Microsoft SQL Server
//! - [`postgres`]: PostgreSQL, HighGo, KingBase, VastBase
//! - [`sqlite`]: SQLite
//! - [`dameng`]: DaMeng
//! - [`mysql`]: MySQL/MariaDB and IRIS
//! - [`influxdb`]: InfluxDB
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/` with a `dialect.rs`
//! 2. Implement `SqlFormatter`, `SchemaDdl`, `CatalogReader` and `Dialect`
//! 3. Add a `DbType` variant and return the dialect from [`dialect_for`]

pub mod dameng;
pub mod influxdb;
pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

pub use dameng::DamengDialect;
pub use influxdb::InfluxDialect;
pub use mssql::MssqlDialect;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::config::DbType;
use crate::core::identifier::{fold_case, NameRules};
use crate::core::schema::{Column, Table};
use crate::core::traits::{Dialect, SqlFormatter};

/// Built-in dialect for a backend.
pub fn dialect_for(db_type: DbType) -> Arc<dyn Dialect> {
    match db_type {
        DbType::SqlServer => Arc::new(MssqlDialect::new()),
        DbType::PostgreSql => Arc::new(PostgresDialect::new()),
        DbType::HighGo => Arc::new(PostgresDialect::highgo()),
        DbType::KingBase => Arc::new(PostgresDialect::kingbase()),
        DbType::VastBase => Arc::new(PostgresDialect::vastbase()),
        DbType::Sqlite => Arc::new(SqliteDialect::new()),
        DbType::DaMeng => Arc::new(DamengDialect::new()),
        DbType::MySql => Arc::new(MysqlDialect::new()),
        DbType::Iris => Arc::new(MysqlDialect::iris()),
        DbType::InfluxDb => Arc::new(InfluxDialect::new()),
    }
}

/// Standard string literal, quotes doubled. Used for catalog filters.
pub(crate) fn sql_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// ` AND column IN ('a', 'b')`, or nothing when `names` is empty.
pub(crate) fn name_filter(column: &str, names: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let list: Vec<String> = names.iter().map(|n| sql_literal(n)).collect();
    format!(" AND {} IN ({})", column, list.join(", "))
}

/// Leading numeric components of a version string (`"10.50.1600"` → `[10, 50, 1600]`).
fn version_parts(version: &str) -> Vec<u32> {
    version
        .trim()
        .split(|c: char| !c.is_ascii_digit())
        .skip_while(|p| p.is_empty())
        .take_while(|p| !p.is_empty())
        .filter_map(|p| p.parse().ok())
        .collect()
}

pub(crate) fn version_major(version: Option<&str>) -> Option<u32> {
    version.and_then(|v| version_parts(v).first().copied())
}

/// Whether `version` is at least `major.minor`; unknown versions are not.
pub(crate) fn version_at_least(version: Option<&str>, major: u32, minor: u32) -> bool {
    match version.map(version_parts) {
        Some(parts) if !parts.is_empty() => {
            let found = (parts[0], parts.get(1).copied().unwrap_or(0));
            found >= (major, minor)
        }
        _ => false,
    }
}

/// `COMMENT ON TABLE t IS '...'`
pub(crate) fn comment_on_table<F: SqlFormatter + ?Sized>(
    fmt: &F,
    table: &Table,
    names: &NameRules,
) -> String {
    match table.description.as_deref().filter(|d| !d.is_empty()) {
        Some(text) => format!(
            "COMMENT ON TABLE {} IS {}",
            names.table(&table.name),
            fmt.quote_literal(text)
        ),
        None => String::new(),
    }
}

/// `COMMENT ON COLUMN t.c IS '...'`
pub(crate) fn comment_on_column<F: SqlFormatter + ?Sized>(
    fmt: &F,
    table: &Table,
    column: &Column,
    names: &NameRules,
) -> String {
    match column.description.as_deref().filter(|d| !d.is_empty()) {
        Some(text) => format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            names.table(&table.name),
            names.quote(&fold_case(&column.name, names.format)),
            fmt.quote_literal(text)
        ),
        None => String::new(),
    }
}
