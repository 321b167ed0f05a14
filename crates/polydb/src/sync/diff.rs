//! Table diffing: desired model against the live catalog.

use crate::core::identifier::{fold_case, NameRules};
use crate::core::schema::{Column, DataType, Index, Table};
use crate::core::traits::Dialect;
use crate::error::Result;

use super::{TablePlan, TableState};

/// Suffix of the renamed live table during a rebuild.
pub(crate) const OLD_SUFFIX: &str = "_old";

pub(crate) struct Differ<'a> {
    pub dialect: &'a dyn Dialect,
    pub names: &'a NameRules,
    pub no_delete: bool,
    pub version: Option<&'a str>,
}

/// Result of comparing one column pair.
#[derive(Default)]
struct ColumnChange {
    alter: bool,
    rebuild: Option<String>,
}

impl Differ<'_> {
    pub fn plan(&self, desired: &Table, live: Option<&Table>) -> Result<TablePlan> {
        match live {
            None => Ok(TablePlan {
                table: desired.name.clone(),
                state: TableState::Missing,
                statements: self.create_statements(desired)?,
                destructive: Vec::new(),
                reasons: vec!["table does not exist".to_string()],
            }),
            Some(live) => self.plan_existing(desired, live),
        }
    }

    fn plan_existing(&self, desired: &Table, live: &Table) -> Result<TablePlan> {
        let d = self.dialect;
        let mut alters = Vec::new();
        let mut destructive = Vec::new();
        let mut reasons = Vec::new();
        let mut rebuild: Vec<String> = Vec::new();

        for column in &desired.columns {
            match self.live_column(live, &column.name) {
                None if column.identity => {
                    rebuild.push(format!("identity column {} added", column.name));
                }
                None => {
                    let mut added = column.clone();
                    if !added.nullable && added.default_value.is_none() {
                        added.default_value = Some(d.type_default(column));
                    }
                    push(&mut alters, d.add_column(desired, &added, self.names)?);
                    reasons.push(format!("column {} added", column.name));
                }
                Some(existing) => {
                    let change = self.compare_column(column, existing)?;
                    if let Some(reason) = change.rebuild {
                        rebuild.push(reason);
                    } else if change.alter {
                        alters.extend(d.alter_column(desired, column, self.names)?);
                        reasons.push(format!("column {} altered", column.name));
                    }
                    if column.description.is_some() && column.description != existing.description {
                        let sql = d.column_comment(desired, column, self.names);
                        if !sql.is_empty() {
                            alters.push(sql);
                            reasons.push(format!("comment on {} changed", column.name));
                        }
                    }
                }
            }
        }

        // Drop indexes before the columns they cover.
        for existing in live.indexes.iter().filter(|i| !i.primary_key) {
            let wanted = desired
                .indexes
                .iter()
                .any(|i| !i.primary_key && self.same_index_columns(i, existing));
            if !wanted && !engine_owned(existing) {
                push(&mut destructive, d.drop_index(live, &existing.name, self.names));
                reasons.push(format!("index {} dropped", existing.name));
            }
        }

        for existing in &live.columns {
            if self.desired_column(desired, &existing.name).is_some() {
                continue;
            }
            if d.can_drop_column(self.version) {
                destructive.push(d.drop_column(live, &existing.name, self.names)?);
                reasons.push(format!("column {} dropped", existing.name));
            } else {
                rebuild.push(format!("column {} dropped", existing.name));
            }
        }

        if !self.same_primary_key(desired, live) {
            rebuild.push("primary key changed".to_string());
        }

        for index in desired.indexes.iter().filter(|i| !i.primary_key) {
            match live
                .indexes
                .iter()
                .find(|l| !l.primary_key && self.same_index_columns(index, l))
            {
                Some(existing) if existing.unique == index.unique => {}
                Some(existing) => {
                    alters.push(d.drop_index(live, &existing.name, self.names));
                    push(&mut alters, d.create_index(desired, index, self.names)?);
                    reasons.push(format!("index {} changed", index.name));
                }
                None => {
                    push(&mut alters, d.create_index(desired, index, self.names)?);
                    reasons.push(format!("index {} added", index.name));
                }
            }
        }

        if desired.description.is_some() && desired.description != live.description {
            let sql = d.table_comment(desired, self.names);
            if !sql.is_empty() {
                alters.push(sql);
                reasons.push("table comment changed".to_string());
            }
        }

        if !rebuild.is_empty() {
            let sequence = self.rebuild_statements(desired, live)?;
            reasons.extend(rebuild);
            let (statements, destructive) = if self.no_delete {
                (alters, sequence)
            } else {
                (sequence, Vec::new())
            };
            return Ok(TablePlan {
                table: desired.name.clone(),
                state: TableState::RebuildRequired,
                statements,
                destructive,
                reasons,
            });
        }

        let (statements, destructive) = if self.no_delete {
            (alters, destructive)
        } else {
            alters.extend(destructive);
            (alters, Vec::new())
        };
        let state = if statements.is_empty() && destructive.is_empty() {
            TableState::InSync
        } else {
            TableState::Alter
        };
        Ok(TablePlan {
            table: desired.name.clone(),
            state,
            statements,
            destructive,
            reasons,
        })
    }

    fn compare_column(&self, desired: &Column, live: &Column) -> Result<ColumnChange> {
        let d = self.dialect;
        let mut change = ColumnChange::default();

        if desired.identity && !live.identity {
            change.rebuild = Some(format!("column {} becomes identity", desired.name));
            return Ok(change);
        }

        let wanted = d.field_type(desired)?;
        let current = d.field_type(live)?;
        if !wanted.eq_ignore_ascii_case(&current) {
            if !widens(live, desired) {
                change.rebuild = Some(format!(
                    "column {} changes type {} -> {}",
                    desired.name, current, wanted
                ));
                return Ok(change);
            }
            change.alter = true;
        }

        if desired.nullable != live.nullable && !desired.primary_key && !desired.identity {
            if !desired.nullable {
                change.rebuild = Some(format!("column {} becomes NOT NULL", desired.name));
                return Ok(change);
            }
            change.alter = true;
        }

        if change.alter && !d.can_alter_column() {
            change.rebuild = Some(format!("column {} cannot be altered in place", desired.name));
        }
        Ok(change)
    }

    /// Statements creating a missing table with its indexes and comments.
    pub fn create_statements(&self, table: &Table) -> Result<Vec<String>> {
        let d = self.dialect;
        let mut out = vec![d.create_table(table, self.names)?];
        for index in &table.indexes {
            push(&mut out, d.create_index(table, index, self.names)?);
        }
        self.comment_statements(table, &mut out);
        Ok(out)
    }

    fn comment_statements(&self, table: &Table, out: &mut Vec<String>) {
        let d = self.dialect;
        if table.description.is_some() {
            push(out, d.table_comment(table, self.names));
        }
        for column in table.columns.iter().filter(|c| c.description.is_some()) {
            push(out, d.column_comment(table, column, self.names));
        }
    }

    /// Rename the live table, create the desired one, copy the common
    /// columns and drop the old table.
    pub fn rebuild_statements(&self, desired: &Table, live: &Table) -> Result<Vec<String>> {
        let d = self.dialect;
        let names = self.names;
        let physical = names.table_raw(&desired.name);
        let old = format!("{}{}", physical, OLD_SUFFIX);

        let mut out = Vec::new();
        for index in live.indexes.iter().filter(|i| !i.primary_key && !engine_owned(i)) {
            push(&mut out, d.drop_index(live, &index.name, names));
        }
        push(&mut out, d.rename_table(&physical, &old, names));
        out.push(d.create_table(desired, names)?);

        let mut targets = Vec::new();
        let mut sources = Vec::new();
        let mut copies_identity = false;
        for column in &desired.columns {
            match self.live_column(live, &column.name) {
                Some(existing) => {
                    let source = names.column(&existing.name);
                    sources.push(if !column.nullable && existing.nullable {
                        format!("COALESCE({}, {})", source, d.type_default(column))
                    } else {
                        source
                    });
                    targets.push(names.column(&column.name));
                    copies_identity |= column.identity;
                }
                None if !column.nullable && !column.identity => {
                    targets.push(names.column(&column.name));
                    sources.push(
                        column
                            .default_value
                            .clone()
                            .unwrap_or_else(|| d.type_default(column)),
                    );
                }
                None => {}
            }
        }
        if !targets.is_empty() {
            if copies_identity {
                push(&mut out, d.identity_insert(&physical, true, names));
            }
            out.push(format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                names.table(&desired.name),
                targets.join(", "),
                sources.join(", "),
                names.quote(&old)
            ));
            if copies_identity {
                push(&mut out, d.identity_insert(&physical, false, names));
            }
        }

        for index in &desired.indexes {
            push(&mut out, d.create_index(desired, index, names)?);
        }
        self.comment_statements(desired, &mut out);
        out.push(d.drop_table(&old, names));
        Ok(out)
    }

    fn live_column<'t>(&self, live: &'t Table, name: &str) -> Option<&'t Column> {
        let physical = fold_case(name, self.names.format);
        live.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&physical))
    }

    fn desired_column<'t>(&self, desired: &'t Table, physical: &str) -> Option<&'t Column> {
        desired
            .columns
            .iter()
            .find(|c| fold_case(&c.name, self.names.format).eq_ignore_ascii_case(physical))
    }

    fn same_index_columns(&self, desired: &Index, live: &Index) -> bool {
        desired.columns.len() == live.columns.len()
            && desired
                .columns
                .iter()
                .zip(&live.columns)
                .all(|(a, b)| fold_case(a, self.names.format).eq_ignore_ascii_case(b))
    }

    fn same_primary_key(&self, desired: &Table, live: &Table) -> bool {
        let wanted: Vec<String> = desired
            .primary_keys()
            .iter()
            .map(|c| fold_case(&c.name, self.names.format).to_lowercase())
            .collect();
        let current: Vec<String> = live
            .primary_keys()
            .iter()
            .map(|c| c.name.to_lowercase())
            .collect();
        wanted == current
    }
}

/// Whether `desired` holds every value of `live` without loss.
fn widens(live: &Column, desired: &Column) -> bool {
    if live.data_type != desired.data_type {
        return live.data_type.widens_to(desired.data_type);
    }
    match desired.data_type {
        DataType::String | DataType::Binary => {
            desired.is_unbounded() || (!live.is_unbounded() && desired.length >= live.length)
        }
        DataType::Decimal => {
            desired.precision >= live.precision
                && desired.scale >= live.scale
                && desired.precision - desired.scale >= live.precision - live.scale
        }
        _ => false,
    }
}

/// Indexes the engine creates and drops itself.
fn engine_owned(index: &Index) -> bool {
    index.name.to_ascii_lowercase().starts_with("sqlite_autoindex")
}

fn push(out: &mut Vec<String>, sql: String) {
    if !sql.trim().is_empty() {
        out.push(sql);
    }
}
