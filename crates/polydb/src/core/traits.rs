//! Capability traits implemented by every backend.
//!
//! Each concern is its own trait so backends only override what differs:
//!
//! - [`SqlFormatter`]: literals, names, parameters, LIKE and concatenation
//! - [`SchemaDdl`]: DDL text and backend capabilities
//! - [`CatalogReader`]: catalog SQL and schema detection hooks
//! - [`Dialect`]: the union of the above plus pagination and upsert style
//!
//! Network I/O is not done here. The host application supplies a
//! [`ConnectionFactory`] that opens [`Connection`]s for a backend.
//!
//! # Design Pattern
//!
//! This is a **Strategy** pattern: each backend struct provides an
//! interchangeable implementation, and the default methods carry the rules
//! most engines share.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::batch::UpsertStyle;
use crate::config::{DbType, NameFormat};
use crate::error::{DbError, DriverError, Result};
use crate::paging::PagingStyle;

use super::format::{iso_datetime, render_value};
use super::identifier::{NameRules, QuoteStyle};
use super::schema::{Column, DataType, Index, Table};
use super::typemap::{ResolvedType, TypeTable};
use super::value::{RowSet, SqlValue};

/// Named bind parameter.
pub type Param = (String, SqlValue);

/// Value and name formatting rules.
pub trait SqlFormatter: Send + Sync {
    /// Backend this formatter belongs to.
    fn db_type(&self) -> DbType;

    /// Ordered vendor type table.
    fn type_table(&self) -> &TypeTable;

    /// Identifier quoting convention.
    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::DoubleQuote
    }

    /// Prefix of named parameters (`@`, `:` or `$`).
    fn parameter_prefix(&self) -> &'static str {
        "@"
    }

    fn format_parameter_name(&self, name: &str) -> String {
        format!("{}{}", self.parameter_prefix(), name)
    }

    /// Whether string literals must also double backslashes.
    fn escape_backslash(&self) -> bool {
        false
    }

    /// Quote a string literal.
    fn quote_literal(&self, text: &str) -> String {
        let mut escaped = text.replace('\'', "''");
        if self.escape_backslash() {
            escaped = escaped.replace('\\', "\\\\");
        }
        format!("'{}'", escaped)
    }

    /// Literal for a string column (SQL Server prefixes unicode columns).
    fn format_string(&self, _column: &Column, text: &str) -> String {
        self.quote_literal(text)
    }

    fn format_bool(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn format_datetime(&self, value: NaiveDateTime) -> Result<String> {
        Ok(format!("'{}'", iso_datetime(value)))
    }

    fn format_binary(&self, bytes: &[u8]) -> String {
        format!("X'{}'", hex::encode_upper(bytes))
    }

    /// Literal used for NULL in a NOT NULL binary column.
    fn null_binary(&self) -> &'static str {
        "''"
    }

    fn string_concat(&self, left: &str, right: &str) -> String {
        format!("{}||{}", left, right)
    }

    /// Escape LIKE wildcards and the escape character itself.
    fn escape_like(&self, value: &str) -> String {
        value
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    }

    /// Build a LIKE operand from `template` (e.g. `%{0}%`).
    ///
    /// Literal mode returns a quoted literal; parameterized mode returns the
    /// bind value itself.
    fn format_like(&self, value: &str, template: &str, parameterized: bool) -> String {
        let pattern = template.replace("{0}", &self.escape_like(value));
        if parameterized {
            pattern
        } else {
            self.quote_literal(&pattern)
        }
    }

    /// Render a value as a literal for `column`, coercing to its type.
    fn format_value(&self, column: &Column, value: &SqlValue) -> Result<String> {
        render_value(self, column, value)
    }
}

/// DDL generation and backend capabilities.
///
/// Methods that return a `String` return an empty string when the backend
/// silently does not support the statement (comments on SQLite, for example).
pub trait SchemaDdl: SqlFormatter {
    /// Longest bounded string; longer columns use the unbounded type.
    fn max_string_length(&self) -> i32 {
        4000
    }

    fn field_type(&self, column: &Column) -> Result<String> {
        self.type_table()
            .render(column, self.max_string_length())
            .ok_or_else(|| {
                DbError::Unsupported(format!(
                    "{} has no type for {:?} (column {})",
                    self.db_type(),
                    column.data_type,
                    column.name
                ))
            })
    }

    /// Clause appended after the type of an identity column.
    fn identity_clause(&self) -> &'static str {
        ""
    }

    /// Full column definition for CREATE TABLE / ADD COLUMN.
    fn column_definition(&self, column: &Column, names: &NameRules) -> Result<String> {
        let mut def = format!("{} {}", names.column(&column.name), self.field_type(column)?);
        if column.identity {
            def.push_str(self.identity_clause());
        }
        def.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = column.default_value.as_deref().filter(|d| !d.is_empty()) {
            if !column.identity {
                def.push_str(" DEFAULT ");
                def.push_str(default);
            }
        }
        Ok(def)
    }

    /// Definition used by ALTER COLUMN: name, type and nullability only.
    fn alter_definition(&self, column: &Column, names: &NameRules) -> Result<String> {
        Ok(format!(
            "{} {}{}",
            names.column(&column.name),
            self.field_type(column)?,
            if column.nullable { " NULL" } else { " NOT NULL" }
        ))
    }

    fn primary_key_clause(&self, table: &Table, names: &NameRules) -> Option<String> {
        let keys: Vec<String> = table
            .primary_keys()
            .iter()
            .map(|c| names.column(&c.name))
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(format!("PRIMARY KEY ({})", keys.join(", ")))
        }
    }

    fn create_table(&self, table: &Table, names: &NameRules) -> Result<String> {
        let mut parts = Vec::with_capacity(table.columns.len() + 1);
        for column in &table.columns {
            parts.push(self.column_definition(column, names)?);
        }
        if let Some(pk) = self.primary_key_clause(table, names) {
            parts.push(pk);
        }
        Ok(format!(
            "CREATE TABLE {} ({})",
            names.table(&table.name),
            parts.join(", ")
        ))
    }

    fn drop_table(&self, table_name: &str, names: &NameRules) -> String {
        format!("DROP TABLE {}", names.table(table_name))
    }

    fn add_column(&self, table: &Table, column: &Column, names: &NameRules) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            names.table(&table.name),
            self.column_definition(column, names)?
        ))
    }

    /// Change type or nullability of an existing column.
    fn alter_column(
        &self,
        table: &Table,
        column: &Column,
        names: &NameRules,
    ) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            names.table(&table.name),
            self.alter_definition(column, names)?
        )])
    }

    fn drop_column(&self, table: &Table, column_name: &str, names: &NameRules) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            names.table(&table.name),
            names.column(column_name)
        ))
    }

    /// CREATE INDEX. Primary key indexes are created with the table.
    fn create_index(&self, table: &Table, index: &Index, names: &NameRules) -> Result<String> {
        if index.primary_key {
            return Ok(String::new());
        }
        let cols: Vec<String> = index.columns.iter().map(|c| names.column(c)).collect();
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            names.quote(&index.name),
            names.table(&table.name),
            cols.join(", ")
        ))
    }

    fn drop_index(&self, _table: &Table, index_name: &str, names: &NameRules) -> String {
        format!("DROP INDEX {}", names.quote(index_name))
    }

    fn table_comment(&self, _table: &Table, _names: &NameRules) -> String {
        String::new()
    }

    fn column_comment(&self, _table: &Table, _column: &Column, _names: &NameRules) -> String {
        String::new()
    }

    fn create_database(&self, name: &str, names: &NameRules) -> String {
        format!("CREATE DATABASE {}", names.quote(name))
    }

    fn drop_database(&self, name: &str, names: &NameRules) -> String {
        format!("DROP DATABASE {}", names.quote(name))
    }

    fn rename_table(&self, from: &str, to: &str, names: &NameRules) -> String {
        format!("ALTER TABLE {} RENAME TO {}", names.quote(from), names.quote(to))
    }

    /// Statement allowing explicit values in an identity column while rows
    /// are copied, or empty when the backend accepts them anyway.
    fn identity_insert(&self, _table_name: &str, _on: bool, _names: &NameRules) -> String {
        String::new()
    }

    /// Whether ALTER COLUMN can change type or nullability in place.
    fn can_alter_column(&self) -> bool {
        true
    }

    /// Whether DROP COLUMN works on the given server version.
    fn can_drop_column(&self, _version: Option<&str>) -> bool {
        true
    }

    /// Whether DDL statements take part in transactions.
    fn transactional_ddl(&self) -> bool {
        true
    }

    /// Whether tables are declared at all (false for schemaless engines).
    fn supports_ddl(&self) -> bool {
        true
    }

    /// Literal for a NOT NULL column's default when copying rows or adding
    /// a column to a populated table.
    fn type_default(&self, column: &Column) -> String {
        match column.data_type {
            dt if dt.is_numeric() => "0".to_string(),
            DataType::Boolean => self.format_bool(false).to_string(),
            DataType::DateTime => chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .and_then(|epoch| self.format_datetime(epoch).ok())
                .unwrap_or_else(|| "''".to_string()),
            DataType::Binary => self.null_binary().to_string(),
            _ => "''".to_string(),
        }
    }
}

/// Catalog queries and detection hooks.
///
/// Catalog SQL must alias its result columns to the neutral layout the
/// schema reader expects:
///
/// - tables: `table_name`, `description`
/// - columns: `table_name`, `column_name`, `data_type`, `length`,
///   `precision`, `scale`, `nullable`, `identity`, `primary_key`,
///   `default_value`, `description`, ordered by position
/// - indexes: `table_name`, `index_name`, `column_name`, `is_unique`,
///   `is_primary`, one row per indexed column in key order
///
/// `names` holds physical table names to filter by; empty means all tables.
pub trait CatalogReader: SqlFormatter {
    fn tables_sql(&self, owner: Option<&str>, names: &[String]) -> String;

    fn columns_sql(&self, owner: Option<&str>, names: &[String]) -> String;

    fn indexes_sql(&self, owner: Option<&str>, names: &[String]) -> String;

    /// SQL listing databases (`database_name` column), if the engine has one.
    fn databases_sql(&self) -> Option<String> {
        None
    }

    /// SQL listing reserved keywords (`word` column), if the engine has one.
    fn reserved_words_sql(&self) -> Option<String> {
        None
    }

    fn resolve_type(&self, raw: &str) -> Option<ResolvedType> {
        self.type_table().resolve(raw)
    }

    /// Identity detection; `flagged` is the catalog's own flag.
    fn is_identity(&self, flagged: bool, _default_value: Option<&str>) -> bool {
        flagged
    }

    /// Primary key index detection.
    fn is_primary_index(&self, _table: &str, _index_name: &str, flagged: bool) -> bool {
        flagged
    }

    /// Guess the naming convention of an existing database.
    fn detect_name_format(&self, names: &[String]) -> NameFormat {
        detect_name_format(names)
    }
}

/// Full backend dialect.
pub trait Dialect: SchemaDdl + CatalogReader {
    /// Pagination algorithm for the given server version.
    fn paging_style(&self, version: Option<&str>) -> PagingStyle;

    fn upsert_style(&self) -> UpsertStyle;

    /// Static reserved-word list (comma separated).
    fn reserved_words(&self) -> &'static str;

    /// Query returning the server version in its first column.
    fn version_sql(&self) -> Option<&'static str>;

    /// Owner used when the connection does not name one.
    fn default_owner(&self) -> Option<&'static str> {
        None
    }
}

/// Shared name-format heuristic.
pub fn detect_name_format(names: &[String]) -> NameFormat {
    let letters = |s: &String| s.chars().any(|c| c.is_alphabetic());
    let named: Vec<&String> = names.iter().filter(|n| letters(n)).collect();
    if named.is_empty() {
        return NameFormat::Default;
    }
    let all_lower = named.iter().all(|n| !n.chars().any(|c| c.is_uppercase()));
    let all_upper = named.iter().all(|n| !n.chars().any(|c| c.is_lowercase()));
    if all_lower && named.iter().any(|n| n.contains('_')) {
        NameFormat::Underline
    } else if all_lower {
        NameFormat::Lower
    } else if all_upper {
        NameFormat::Upper
    } else {
        NameFormat::Default
    }
}

/// Live connection supplied by the host's vendor driver.
///
/// `get_schema` exposes the driver's generic metadata collections. Drivers
/// that return a collection must use the neutral layout documented on
/// [`CatalogReader`] (and `database_name` for `Databases`, `word` for
/// `ReservedWords`); returning `None` makes the reader fall back to SQL.
#[async_trait]
pub trait Connection: Send {
    /// Execute a statement, returning the affected row count.
    async fn execute(&mut self, sql: &str, params: &[Param]) -> std::result::Result<u64, DriverError>;

    /// Run a query and collect its rows.
    async fn query(&mut self, sql: &str, params: &[Param]) -> std::result::Result<RowSet, DriverError>;

    async fn begin(&mut self) -> std::result::Result<(), DriverError>;

    async fn commit(&mut self) -> std::result::Result<(), DriverError>;

    async fn rollback(&mut self) -> std::result::Result<(), DriverError>;

    /// Generic metadata collection (`Databases`, `Tables`, `Columns`,
    /// `Indexes`, `ReservedWords`) restricted by `[owner, table]`.
    async fn get_schema(
        &mut self,
        _collection: &str,
        _restrictions: &[Option<String>],
    ) -> std::result::Result<Option<RowSet>, DriverError> {
        Ok(None)
    }

    /// Forward the command timeout to the driver (0 = driver default).
    fn set_command_timeout(&mut self, _seconds: u64) {}

    async fn close(&mut self) -> std::result::Result<(), DriverError> {
        Ok(())
    }
}

/// Opens connections for one backend.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    fn db_type(&self) -> DbType;

    /// Open a connection. The string has polydb options stripped.
    async fn connect(
        &self,
        connection_string: &str,
    ) -> std::result::Result<Box<dyn Connection>, DriverError>;
}
