//! Batch insert and upsert SQL.
//!
//! [`BatchBuilder`] renders a [`BatchRequest`] into statements for one
//! dialect: multi-row `INSERT`s split at the configured batch size, plus the
//! backend's upsert form. All validation happens before any SQL is produced,
//! so a bad request never sends a partial batch.

mod line_protocol;

pub(crate) use line_protocol::epoch_nanos;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::identifier::NameRules;
use crate::core::schema::{Column, Table};
use crate::core::traits::{Dialect, Param};
use crate::core::value::SqlValue;
use crate::error::{DbError, Result};

/// How a backend expresses insert-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertStyle {
    /// `ON CONFLICT (key) DO UPDATE SET col = EXCLUDED.col`
    OnConflict,
    /// `ON DUPLICATE KEY UPDATE col = VALUES(col)`
    OnDuplicateKey,
    /// `BEGIN INSERT ..; EXCEPTION WHEN DUP_VAL_ON_INDEX THEN UPDATE ..; END;`
    ExceptionBlock,
    /// `UPDATE .. WHERE key; IF @@ROWCOUNT = 0 INSERT ..;`
    UpdateThenInsert,
    /// Line protocol; writes to an existing point overwrite it.
    LineProtocol,
}

/// One statement ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatement {
    pub sql: String,
    /// Bind values in parameterized mode; names carry no prefix.
    pub params: Vec<Param>,
}

/// Rows to write into one table.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub table: Table,
    /// Written columns, in value order.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    /// Columns overwritten on conflict.
    pub update_columns: Option<Vec<String>>,
    /// Columns incremented (`col = col + new`) on conflict.
    pub accumulate_columns: Option<Vec<String>>,
}

impl BatchRequest {
    pub fn new<S: Into<String>>(table: Table, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            table,
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            update_columns: None,
            accumulate_columns: None,
        }
    }

    /// Request writing every column of the table.
    pub fn all_columns(table: Table) -> Self {
        let columns: Vec<String> = table.columns.iter().map(|c| c.name.clone()).collect();
        Self::new(table, columns)
    }

    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn rows(mut self, rows: impl IntoIterator<Item = Vec<SqlValue>>) -> Self {
        self.rows.extend(rows);
        self
    }

    pub fn update<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.update_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn accumulate<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.accumulate_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }
}

/// Columns touched when a row already exists.
#[derive(Debug, Default)]
struct ConflictPlan<'a> {
    keys: Vec<&'a Column>,
    updates: Vec<&'a Column>,
    accumulates: Vec<&'a Column>,
}

impl ConflictPlan<'_> {
    fn is_noop(&self) -> bool {
        self.updates.is_empty() && self.accumulates.is_empty()
    }
}

/// Renders batch writes for one dialect.
pub struct BatchBuilder<'a> {
    dialect: &'a dyn Dialect,
    names: &'a NameRules,
    batch_size: usize,
    parameterized: bool,
}

impl<'a> BatchBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect, names: &'a NameRules) -> Self {
        Self {
            dialect,
            names,
            batch_size: 5_000,
            parameterized: false,
        }
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn parameterized(mut self, on: bool) -> Self {
        self.parameterized = on;
        self
    }

    /// Multi-row INSERT statements.
    pub fn insert(&self, request: &BatchRequest) -> Result<Vec<BatchStatement>> {
        let columns = self.resolve_columns(request)?;
        if request.rows.is_empty() {
            return Ok(Vec::new());
        }
        if self.dialect.upsert_style() == UpsertStyle::LineProtocol {
            return line_protocol::render(self.names, request, &columns, self.batch_size);
        }

        let mut statements = Vec::new();
        for chunk in request.rows.chunks(self.batch_size) {
            let mut params = Vec::new();
            let mut values = Vec::with_capacity(chunk.len());
            for row in chunk {
                values.push(format!("({})", self.render_row(&columns, row, &mut params)?.join(", ")));
            }
            statements.push(BatchStatement {
                sql: format!("{} VALUES {}", self.insert_head(request, &columns), values.join(",")),
                params,
            });
        }
        debug!(
            "Batch insert into {}: {} rows in {} statements",
            request.table.name,
            request.rows.len(),
            statements.len()
        );
        Ok(statements)
    }

    /// Insert-or-update statements in the dialect's upsert style.
    pub fn upsert(&self, request: &BatchRequest) -> Result<Vec<BatchStatement>> {
        let columns = self.resolve_columns(request)?;
        let style = self.dialect.upsert_style();
        if style == UpsertStyle::LineProtocol {
            if request.accumulate_columns.as_ref().is_some_and(|a| !a.is_empty()) {
                return Err(DbError::Unsupported(format!(
                    "{} cannot accumulate on upsert",
                    self.dialect.db_type()
                )));
            }
            return self.insert(request);
        }
        let plan = self.conflict_plan(request, &columns)?;
        if request.rows.is_empty() {
            return Ok(Vec::new());
        }

        match style {
            UpsertStyle::OnConflict | UpsertStyle::OnDuplicateKey => {
                let tail = self.conflict_tail(style, request, &plan);
                let mut statements = Vec::new();
                for chunk in request.rows.chunks(self.batch_size) {
                    let mut params = Vec::new();
                    let mut values = Vec::with_capacity(chunk.len());
                    for row in chunk {
                        values.push(format!(
                            "({})",
                            self.render_row(&columns, row, &mut params)?.join(", ")
                        ));
                    }
                    statements.push(BatchStatement {
                        sql: format!(
                            "{} VALUES {} {}",
                            self.insert_head(request, &columns),
                            values.join(","),
                            tail
                        ),
                        params,
                    });
                }
                Ok(statements)
            }
            _ => request
                .rows
                .iter()
                .map(|row| self.per_row_upsert(style, request, &columns, &plan, row))
                .collect(),
        }
    }

    /// One UPDATE per row, keyed by the primary key.
    pub fn update(&self, request: &BatchRequest) -> Result<Vec<BatchStatement>> {
        let columns = self.resolve_columns(request)?;
        let keys = self.primary_key(request, &columns, "update")?;
        let table = self.names.table(&request.table.name);
        let mut statements = Vec::with_capacity(request.rows.len());
        for row in &request.rows {
            let mut params = Vec::new();
            let rendered = self.render_row(&columns, row, &mut params)?;
            let sets: Vec<String> = columns
                .iter()
                .zip(&rendered)
                .filter(|(c, _)| !keys.iter().any(|k| k.name == c.name))
                .map(|(c, v)| format!("{} = {}", self.names.column(&c.name), v))
                .collect();
            if sets.is_empty() {
                continue;
            }
            statements.push(BatchStatement {
                sql: format!(
                    "UPDATE {} SET {} WHERE {}",
                    table,
                    sets.join(", "),
                    self.key_predicate(&keys, &columns, &rendered)
                ),
                params,
            });
        }
        Ok(statements)
    }

    /// One DELETE per row, keyed by the primary key.
    pub fn delete(&self, request: &BatchRequest) -> Result<Vec<BatchStatement>> {
        let columns = self.resolve_columns(request)?;
        let keys = self.primary_key(request, &columns, "delete")?;
        let table = self.names.table(&request.table.name);
        request
            .rows
            .iter()
            .map(|row| {
                let mut params = Vec::new();
                let rendered = self.render_row(&columns, row, &mut params)?;
                Ok(BatchStatement {
                    sql: format!(
                        "DELETE FROM {} WHERE {}",
                        table,
                        self.key_predicate(&keys, &columns, &rendered)
                    ),
                    params,
                })
            })
            .collect()
    }

    fn resolve_columns<'r>(&self, request: &'r BatchRequest) -> Result<Vec<&'r Column>> {
        if request.columns.is_empty() {
            return Err(DbError::Data(format!(
                "no columns to write into {}",
                request.table.name
            )));
        }
        let columns = request
            .columns
            .iter()
            .map(|name| {
                request.table.column(name).ok_or_else(|| {
                    DbError::Data(format!(
                        "column {} does not exist in {}",
                        name, request.table.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for (i, row) in request.rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DbError::Data(format!(
                    "row {} of {} has {} values for {} columns",
                    i,
                    request.table.name,
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(columns)
    }

    fn primary_key<'r>(
        &self,
        request: &'r BatchRequest,
        columns: &[&'r Column],
        action: &str,
    ) -> Result<Vec<&'r Column>> {
        let keys: Vec<&Column> = request.table.primary_keys();
        if keys.is_empty() {
            return Err(DbError::Data(format!(
                "cannot {} {} without a primary key",
                action, request.table.name
            )));
        }
        if let Some(missing) = keys
            .iter()
            .find(|k| !columns.iter().any(|c| c.name == k.name))
        {
            return Err(DbError::Data(format!(
                "cannot {} {}: key column {} is not written",
                action, request.table.name, missing.name
            )));
        }
        Ok(keys)
    }

    /// Resolve the conflict target and the update/accumulate sets.
    fn conflict_plan<'r>(
        &self,
        request: &'r BatchRequest,
        columns: &[&'r Column],
    ) -> Result<ConflictPlan<'r>> {
        let table = &request.table;
        let written = |name: &str| columns.iter().any(|c| c.name.eq_ignore_ascii_case(name));

        let updates = request.update_columns.clone().unwrap_or_default();
        let accumulates = request.accumulate_columns.clone().unwrap_or_default();
        if let Some(both) = updates
            .iter()
            .find(|u| accumulates.iter().any(|a| a.eq_ignore_ascii_case(u)))
        {
            return Err(DbError::Data(format!(
                "column {} of {} is both updated and accumulated",
                both, table.name
            )));
        }

        let unique = table
            .indexes
            .iter()
            .filter(|i| i.unique && !i.primary_key)
            .chain(table.indexes.iter().filter(|i| i.primary_key))
            .find(|i| !i.columns.is_empty() && i.columns.iter().all(|c| written(c.as_str())));

        let key_names: Vec<String> = match unique {
            Some(index) => index.columns.clone(),
            None => {
                let pk: Vec<String> = table.primary_keys().iter().map(|c| c.name.clone()).collect();
                if pk.is_empty() || !pk.iter().all(|c| written(c.as_str())) {
                    return Err(DbError::Data(format!(
                        "no unique index or primary key of {} is covered by the written columns",
                        table.name
                    )));
                }
                pk
            }
        };

        let lookup = |name: &str| -> Result<&'r Column> {
            columns
                .iter()
                .copied()
                .find(|c| c.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    DbError::Data(format!(
                        "column {} is not written to {}",
                        name, table.name
                    ))
                })
        };

        let keys = key_names
            .iter()
            .map(|k| lookup(k.as_str()))
            .collect::<Result<Vec<_>>>()?;
        let is_key = |c: &Column| keys.iter().any(|k| k.name == c.name);

        let (updates, accumulates) =
            if request.update_columns.is_none() && request.accumulate_columns.is_none() {
                let all: Vec<&Column> = columns.iter().copied().filter(|c| !is_key(c)).collect();
                (all, Vec::new())
            } else {
                (
                    updates.iter().map(|n| lookup(n.as_str())).collect::<Result<Vec<_>>>()?,
                    accumulates.iter().map(|n| lookup(n.as_str())).collect::<Result<Vec<_>>>()?,
                )
            };

        let updates = updates.into_iter().filter(|c| !is_key(c)).collect();
        let accumulates = accumulates.into_iter().filter(|c| !is_key(c)).collect();
        Ok(ConflictPlan {
            keys,
            updates,
            accumulates,
        })
    }

    fn insert_head(&self, request: &BatchRequest, columns: &[&Column]) -> String {
        let cols: Vec<String> = columns.iter().map(|c| self.names.column(&c.name)).collect();
        format!(
            "INSERT INTO {} ({})",
            self.names.table(&request.table.name),
            cols.join(", ")
        )
    }

    /// Render one row as literals or placeholders.
    fn render_row(
        &self,
        columns: &[&Column],
        row: &[SqlValue],
        params: &mut Vec<Param>,
    ) -> Result<Vec<String>> {
        columns
            .iter()
            .zip(row)
            .map(|(column, value)| {
                if self.parameterized {
                    let name = format!("p{}", params.len());
                    let placeholder = self.dialect.format_parameter_name(&name);
                    params.push((name, value.clone()));
                    Ok(placeholder)
                } else {
                    self.dialect.format_value(column, value)
                }
            })
            .collect()
    }

    fn conflict_tail(&self, style: UpsertStyle, request: &BatchRequest, plan: &ConflictPlan<'_>) -> String {
        let table = self.names.table(&request.table.name);
        match style {
            UpsertStyle::OnConflict => {
                let keys: Vec<String> = plan.keys.iter().map(|c| self.names.column(&c.name)).collect();
                if plan.is_noop() {
                    return format!("ON CONFLICT ({}) DO NOTHING", keys.join(", "));
                }
                let mut sets: Vec<String> = plan
                    .updates
                    .iter()
                    .map(|c| {
                        let col = self.names.column(&c.name);
                        format!("{} = EXCLUDED.{}", col, col)
                    })
                    .collect();
                sets.extend(plan.accumulates.iter().map(|c| {
                    let col = self.names.column(&c.name);
                    format!("{} = {}.{} + EXCLUDED.{}", col, table, col, col)
                }));
                format!(
                    "ON CONFLICT ({}) DO UPDATE SET {}",
                    keys.join(", "),
                    sets.join(", ")
                )
            }
            _ => {
                let mut sets: Vec<String> = plan
                    .updates
                    .iter()
                    .map(|c| {
                        let col = self.names.column(&c.name);
                        format!("{} = VALUES({})", col, col)
                    })
                    .collect();
                sets.extend(plan.accumulates.iter().map(|c| {
                    let col = self.names.column(&c.name);
                    format!("{} = {} + VALUES({})", col, col, col)
                }));
                if sets.is_empty() {
                    // MySQL has no DO NOTHING; a self-assignment keeps the row.
                    if let Some(key) = plan.keys.first() {
                        let col = self.names.column(&key.name);
                        sets.push(format!("{} = {}", col, col));
                    }
                }
                format!("ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
        }
    }

    fn key_predicate(&self, keys: &[&Column], columns: &[&Column], rendered: &[String]) -> String {
        keys.iter()
            .filter_map(|k| {
                columns
                    .iter()
                    .position(|c| c.name == k.name)
                    .map(|i| format!("{} = {}", self.names.column(&k.name), rendered[i]))
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn set_list(&self, plan: &ConflictPlan<'_>, columns: &[&Column], rendered: &[String]) -> Vec<String> {
        let value_of = |c: &Column| {
            columns
                .iter()
                .position(|w| w.name == c.name)
                .map(|i| rendered[i].clone())
                .unwrap_or_else(|| "null".to_string())
        };
        let mut sets: Vec<String> = plan
            .updates
            .iter()
            .map(|c| format!("{} = {}", self.names.column(&c.name), value_of(c)))
            .collect();
        sets.extend(plan.accumulates.iter().map(|c| {
            let col = self.names.column(&c.name);
            format!("{} = {} + {}", col, col, value_of(c))
        }));
        sets
    }

    fn per_row_upsert(
        &self,
        style: UpsertStyle,
        request: &BatchRequest,
        columns: &[&Column],
        plan: &ConflictPlan<'_>,
        row: &[SqlValue],
    ) -> Result<BatchStatement> {
        let mut params = Vec::new();
        let rendered = self.render_row(columns, row, &mut params)?;
        let table = self.names.table(&request.table.name);
        let insert = format!(
            "{} VALUES ({})",
            self.insert_head(request, columns),
            rendered.join(", ")
        );
        let predicate = self.key_predicate(&plan.keys, columns, &rendered);
        let sets = self.set_list(plan, columns, &rendered);

        let sql = match style {
            UpsertStyle::ExceptionBlock => {
                let on_duplicate = if sets.is_empty() {
                    "NULL".to_string()
                } else {
                    format!("UPDATE {} SET {} WHERE {}", table, sets.join(", "), predicate)
                };
                format!(
                    "BEGIN {}; EXCEPTION WHEN DUP_VAL_ON_INDEX THEN {}; END;",
                    insert, on_duplicate
                )
            }
            _ => {
                if sets.is_empty() {
                    format!(
                        "IF NOT EXISTS (SELECT 1 FROM {} WHERE {}) {};",
                        table, predicate, insert
                    )
                } else {
                    format!(
                        "UPDATE {} SET {} WHERE {}; IF @@ROWCOUNT = 0 {};",
                        table,
                        sets.join(", "),
                        predicate,
                        insert
                    )
                }
            }
        };
        Ok(BatchStatement { sql, params })
    }
}
