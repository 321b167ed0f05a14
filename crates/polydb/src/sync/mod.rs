//! Schema synchronization.
//!
//! [`SchemaSync`] compares the desired tables with the live catalog and
//! brings the database in line:
//!
//! - missing tables are created with their indexes and comments
//! - compatible changes (added columns, widening, relaxed nullability, new
//!   indexes, comments) become incremental ALTER statements
//! - everything else rebuilds the table: rename, create, copy, drop
//!
//! The [`Migration`] mode gates execution. `Off` does nothing, `ReadOnly`
//! only plans, `On` suppresses drops and rebuilds (reporting their SQL) and
//! `Full` runs everything.

mod diff;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Migration;
use crate::core::identifier::NameRules;
use crate::core::schema::Table;
use crate::core::traits::Dialect;
use crate::error::{DbError, Result};
use crate::metadata::MetaData;
use crate::session::Session;

use diff::Differ;

/// Outcome of comparing one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    /// The table does not exist and will be created.
    Missing,
    /// Nothing to do.
    InSync,
    /// Incremental ALTER statements bring the table in line.
    Alter,
    /// The table must be rebuilt.
    RebuildRequired,
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableState::Missing => "missing",
            TableState::InSync => "in sync",
            TableState::Alter => "alter",
            TableState::RebuildRequired => "rebuild required",
        };
        f.write_str(s)
    }
}

/// Planned DDL for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePlan {
    /// Logical table name.
    pub table: String,
    pub state: TableState,
    /// Statements to execute, in order.
    pub statements: Vec<String>,
    /// Drops and rebuild SQL suppressed by the migration mode (report only).
    pub destructive: Vec<String>,
    /// Human readable reasons for the planned changes.
    pub reasons: Vec<String>,
}

impl TablePlan {
    pub fn is_in_sync(&self) -> bool {
        self.state == TableState::InSync
    }

    /// Whether the statements form a rebuild sequence.
    pub fn rebuilds(&self) -> bool {
        self.state == TableState::RebuildRequired && self.destructive.is_empty()
    }
}

/// Plan for a set of tables plus the per-table failures.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub tables: Vec<TablePlan>,
    /// Tables whose diff or execution failed; the others are unaffected.
    pub errors: Vec<(String, DbError)>,
}

impl SyncPlan {
    /// Every statement to execute, in order.
    pub fn statements(&self) -> Vec<&str> {
        self.tables
            .iter()
            .flat_map(|t| t.statements.iter().map(String::as_str))
            .collect()
    }

    /// Whether no table needs any change.
    pub fn is_in_sync(&self) -> bool {
        self.errors.is_empty()
            && self
                .tables
                .iter()
                .all(|t| t.statements.is_empty() && t.destructive.is_empty())
    }

    pub fn table(&self, name: &str) -> Option<&TablePlan> {
        self.tables.iter().find(|t| t.table.eq_ignore_ascii_case(name))
    }
}

/// Schema synchronizer for one connection.
#[derive(Clone)]
pub struct SchemaSync {
    dialect: Arc<dyn Dialect>,
    names: Arc<NameRules>,
    migration: Migration,
    version: Option<String>,
}

impl SchemaSync {
    pub fn new(dialect: Arc<dyn Dialect>, names: Arc<NameRules>, migration: Migration) -> Self {
        Self {
            dialect,
            names,
            migration,
            version: None,
        }
    }

    /// Server version, used to decide which column changes work in place.
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn migration(&self) -> Migration {
        self.migration
    }

    fn differ(&self) -> Differ<'_> {
        Differ {
            dialect: self.dialect.as_ref(),
            names: &self.names,
            no_delete: self.migration.no_delete(),
            version: self.version.as_deref(),
        }
    }

    /// Plan one table against its live counterpart, if any.
    pub fn plan_table(&self, desired: &Table, live: Option<&Table>) -> Result<TablePlan> {
        let mut desired = desired.clone();
        desired.fix();
        self.differ().plan(&desired, live)
    }

    /// Plan every desired table. Live tables are matched by physical name.
    pub fn plan(&self, desired: &[Table], live: &[Table]) -> SyncPlan {
        let mut plan = SyncPlan::default();
        for table in desired {
            let physical = self.names.table_raw(&table.name);
            let existing = live
                .iter()
                .find(|l| self.names.table_raw(&l.name).eq_ignore_ascii_case(&physical));
            match self.plan_table(table, existing) {
                Ok(table_plan) => {
                    debug!("{}: {}", table.name, table_plan.state);
                    plan.tables.push(table_plan);
                }
                Err(e) => {
                    warn!("Cannot diff table {}: {}", table.name, e);
                    plan.errors.push((table.name.clone(), e));
                }
            }
        }
        plan
    }

    /// Read the live schema, plan and (depending on the mode) execute.
    pub async fn sync(&self, metadata: &MetaData, desired: &[Table]) -> Result<SyncPlan> {
        if self.migration == Migration::Off {
            return Ok(SyncPlan::default());
        }
        if !self.dialect.supports_ddl() {
            debug!("{} declares no tables, skipping sync", self.dialect.db_type());
            return Ok(SyncPlan::default());
        }

        let filter: Vec<String> = desired.iter().map(|t| t.name.clone()).collect();
        let live = metadata.get_tables(&filter).await?;
        let mut plan = self.plan(desired, &live);

        for table in plan.tables.iter().filter(|t| !t.destructive.is_empty()) {
            warn!(
                "{}: {} destructive statement(s) suppressed by Migration={:?}",
                table.table,
                table.destructive.len(),
                self.migration
            );
        }
        if self.migration == Migration::ReadOnly {
            info!(
                "Planned {} statement(s), not executing (Migration=ReadOnly)",
                plan.statements().len()
            );
            return Ok(plan);
        }

        let session = metadata.session();
        let mut failed = Vec::new();
        for table in plan.tables.iter().filter(|t| !t.statements.is_empty()) {
            if let Err(e) = self.apply(session, table).await {
                warn!("Sync of table {} failed: {}", table.table, e);
                failed.push((table.table.clone(), e));
            }
        }
        plan.errors.extend(failed);
        Ok(plan)
    }

    /// Execute a table plan.
    ///
    /// Rebuilds run inside one transaction when the backend has
    /// transactional DDL; any failure rolls back and surfaces as
    /// [`DbError::Rebuild`] carrying the planned SQL.
    pub async fn apply(&self, session: &Session, plan: &TablePlan) -> Result<()> {
        if !plan.rebuilds() {
            for sql in &plan.statements {
                session.execute(sql, &[]).await?;
            }
            if !plan.statements.is_empty() {
                info!("{}: {} ({} statement(s))", plan.table, plan.state, plan.statements.len());
            }
            return Ok(());
        }

        info!("Rebuilding table {}: {}", plan.table, plan.reasons.join("; "));
        let ddl = plan.statements.join(";\n");
        let transactional = self.dialect.transactional_ddl();
        if transactional {
            session
                .begin()
                .await
                .map_err(|e| DbError::rebuild(&plan.table, &ddl, e))?;
        }
        for sql in &plan.statements {
            if let Err(e) = session.execute(sql, &[]).await {
                if transactional {
                    warn!("Rolling back rebuild of {}", plan.table);
                    if let Err(rollback) = session.rollback().await {
                        warn!("Rollback of {} failed: {}", plan.table, rollback);
                    }
                }
                return Err(DbError::rebuild(&plan.table, ddl, e));
            }
        }
        if transactional {
            session
                .commit()
                .await
                .map_err(|e| DbError::rebuild(&plan.table, &ddl, e))?;
        }
        Ok(())
    }
}

impl fmt::Debug for SchemaSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaSync")
            .field("db_type", &self.dialect.db_type())
            .field("migration", &self.migration)
            .field("version", &self.version)
            .finish()
    }
}
