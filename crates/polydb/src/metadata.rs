//! Live schema reader.
//!
//! Turns the dialect's catalog result sets into the neutral [`Table`] model.
//! Catalog collections come from [`Connection::get_schema`] when the driver
//! provides them and from the dialect's catalog SQL otherwise.
//!
//! [`Connection::get_schema`]: crate::core::traits::Connection::get_schema

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::NameFormat;
use crate::core::identifier::ReservedWords;
use crate::core::schema::{Column, DataType, Index, Table};
use crate::core::value::{Row, RowSet};
use crate::error::Result;
use crate::session::Session;

/// Filters naming at most this many tables are pushed into the catalog SQL.
const MAX_PUSHED_NAMES: usize = 10;

/// Schema reader bound to one session.
#[derive(Debug)]
pub struct MetaData {
    session: Arc<Session>,
    owner: Option<String>,
}

impl MetaData {
    pub fn new(session: Arc<Session>) -> Self {
        let owner = session
            .config()
            .owner
            .clone()
            .or_else(|| session.dialect().default_owner().map(str::to_string));
        Self { session, owner }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Read tables with their columns and indexes.
    ///
    /// `filter` holds logical table names; empty reads every table.
    pub async fn get_tables(&self, filter: &[String]) -> Result<Vec<Table>> {
        let names = self.session.names();
        let dialect = self.session.dialect();
        let owner = self.owner.as_deref();

        let physical: Vec<String> = filter.iter().map(|n| names.table_raw(n)).collect();
        let pushed: &[String] = if physical.len() <= MAX_PUSHED_NAMES {
            &physical
        } else {
            &[]
        };

        let table_rows = self
            .collection("Tables", dialect.tables_sql(owner, pushed), &physical)
            .await?;
        let column_rows = self
            .collection("Columns", dialect.columns_sql(owner, pushed), &physical)
            .await?;
        let index_rows = self
            .collection("Indexes", dialect.indexes_sql(owner, pushed), &physical)
            .await?;

        let mut tables: Vec<Table> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for row in table_rows.iter() {
            let Some(table_name) = row.text("table_name") else {
                continue;
            };
            if !physical.is_empty() && !physical.iter().any(|p| p.eq_ignore_ascii_case(&table_name)) {
                continue;
            }
            let key = table_name.to_lowercase();
            if positions.contains_key(&key) {
                continue;
            }
            let mut table = Table::new(names.logical_table(&table_name));
            table.description = row.text("description");
            table.owner = self.owner.clone();
            positions.insert(key, tables.len());
            tables.push(table);
        }

        for row in column_rows.iter() {
            let Some(position) = lookup(&positions, row) else {
                continue;
            };
            let table = &mut tables[position];
            if let Some(column) = self.build_column(&table.name, row) {
                table.columns.push(column);
            }
        }

        let mut grouped: Vec<(usize, Index)> = Vec::new();
        for row in index_rows.iter() {
            let Some(position) = lookup(&positions, row) else {
                continue;
            };
            let (Some(index_name), Some(column_name)) =
                (row.text("index_name"), row.text("column_name"))
            else {
                continue;
            };
            match grouped
                .iter_mut()
                .find(|(p, idx)| *p == position && idx.name.eq_ignore_ascii_case(&index_name))
            {
                Some((_, index)) => index.columns.push(column_name),
                None => {
                    let table_name = names.table_raw(&tables[position].name);
                    let mut index = Index::new(index_name.clone(), [column_name]);
                    index.unique = row.flag("is_unique");
                    if dialect.is_primary_index(&table_name, &index_name, row.flag("is_primary")) {
                        index = index.primary();
                    }
                    grouped.push((position, index));
                }
            }
        }
        for (position, index) in grouped {
            tables[position].indexes.push(index);
        }

        for table in tables.iter_mut() {
            table.fix();
        }
        debug!("Read {} tables from catalog", tables.len());
        Ok(tables)
    }

    /// Logical names of the existing tables.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let rows = self
            .collection(
                "Tables",
                self.session.dialect().tables_sql(self.owner.as_deref(), &[]),
                &[],
            )
            .await?;
        let names = self.session.names();
        Ok(rows
            .iter()
            .filter_map(|r| r.text("table_name"))
            .map(|n| names.logical_table(&n))
            .collect())
    }

    /// Whether a table with this logical name exists.
    pub async fn table_exists(&self, name: &str) -> Result<bool> {
        let physical = vec![self.session.names().table_raw(name)];
        let rows = self
            .collection(
                "Tables",
                self.session
                    .dialect()
                    .tables_sql(self.owner.as_deref(), &physical),
                &physical,
            )
            .await?;
        let exists = rows
            .iter()
            .filter_map(|r| r.text("table_name"))
            .any(|n| n.eq_ignore_ascii_case(&physical[0]));
        Ok(exists)
    }

    /// Databases visible to the connection.
    pub async fn databases(&self) -> Result<Vec<String>> {
        if let Some(rows) = self.session.get_schema("Databases", &[]).await? {
            return Ok(database_names(&rows));
        }
        match self.session.dialect().databases_sql() {
            Some(sql) => Ok(database_names(&self.session.query(&sql, &[]).await?)),
            None => Ok(self.session.config().database_name.iter().cloned().collect()),
        }
    }

    /// Reserved words of the live server, falling back to the static list.
    pub async fn reserved_words(&self) -> Result<ReservedWords> {
        let dialect = self.session.dialect();
        if let Some(rows) = self.session.get_schema("ReservedWords", &[]).await? {
            return Ok(ReservedWords::from_words(
                rows.iter().filter_map(|r| r.text("word")),
            ));
        }
        if let Some(sql) = dialect.reserved_words_sql() {
            match self.session.query(&sql, &[]).await {
                Ok(rows) if !rows.is_empty() => {
                    return Ok(ReservedWords::from_words(
                        rows.iter().filter_map(|r| r.text("word")),
                    ))
                }
                Ok(_) => {}
                Err(e) => warn!("Reading reserved words failed, using static list: {}", e),
            }
        }
        Ok(ReservedWords::from_list(dialect.reserved_words()))
    }

    /// Guess the naming convention from the existing table names.
    pub async fn detect_name_format(&self) -> Result<NameFormat> {
        let rows = self
            .collection(
                "Tables",
                self.session.dialect().tables_sql(self.owner.as_deref(), &[]),
                &[],
            )
            .await?;
        let names: Vec<String> = rows.iter().filter_map(|r| r.text("table_name")).collect();
        Ok(self.session.dialect().detect_name_format(&names))
    }

    async fn collection(&self, name: &str, sql: String, physical: &[String]) -> Result<RowSet> {
        let table = match physical {
            [single] => Some(single.clone()),
            _ => None,
        };
        let restrictions = [self.owner.clone(), table];
        if let Some(rows) = self.session.get_schema(name, &restrictions).await? {
            return Ok(rows);
        }
        if sql.trim().is_empty() {
            return Ok(RowSet::default());
        }
        self.session.query(&sql, &[]).await
    }

    fn build_column(&self, table: &str, row: Row<'_>) -> Option<Column> {
        let dialect = self.session.dialect();
        let name = row.text("column_name")?;
        let raw = row.text("data_type").unwrap_or_default();

        let resolved = dialect.resolve_type(&raw);
        let (data_type, length, precision, scale) = match resolved {
            Some(r) => (r.data_type, r.length, r.precision, r.scale),
            None => {
                warn!(
                    "Unknown type '{}' on {}.{}, reading as String",
                    raw, table, name
                );
                (DataType::String, 0, 0, 0)
            }
        };
        let catalog = |key: &str, fallback: i32| match row.int(key) {
            0 => fallback,
            v => i32::try_from(v).unwrap_or(fallback),
        };

        let mut column = Column::new(name, data_type).raw_type(raw);
        if matches!(data_type, DataType::String | DataType::Binary) {
            column.length = catalog("length", length);
        }
        if data_type == DataType::Decimal {
            column.precision = catalog("precision", precision);
            column.scale = catalog("scale", scale);
        }
        column.nullable = row.flag("nullable");
        column.default_value = row.text("default_value").map(|d| trim_parens(&d).to_string());
        column.description = row.text("description");
        column.primary_key = row.flag("primary_key");
        if dialect.is_identity(row.flag("identity"), column.default_value.as_deref()) {
            column.identity = true;
            column.default_value = None;
        }
        if column.identity || column.primary_key {
            column.nullable = false;
        }
        Some(column)
    }
}

fn lookup(positions: &HashMap<String, usize>, row: Row<'_>) -> Option<usize> {
    row.text("table_name")
        .and_then(|t| positions.get(&t.to_lowercase()).copied())
}

fn database_names(rows: &RowSet) -> Vec<String> {
    rows.iter().filter_map(|r| r.text("database_name")).collect()
}

/// Strip balanced outer parentheses, as in `((0))`.
fn trim_parens(text: &str) -> &str {
    let mut s = text.trim();
    while s.len() >= 2 && s.starts_with('(') && s.ends_with(')') && encloses(s) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

/// Whether the first parenthesis closes at the last character.
fn encloses(s: &str) -> bool {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return i == s.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}
