//! # polydb
//!
//! SQL dialect and schema-synchronization engine for ten database backends:
//! SQL Server, PostgreSQL, HighGo, KingBase, VastBase, SQLite, DaMeng,
//! MySQL, IRIS and InfluxDB.
//!
//! The library provides:
//!
//! - **Dialects** that quote names, render literals and emit DDL per backend
//! - **Pagination** strategies chosen per server version
//! - **Batch insert and upsert** statements with per-backend conflict handling
//! - **Schema reading** from the live catalog into a neutral table model
//! - **Schema synchronization** with in-place ALTER or table rebuilds
//!
//! Connections come from the host: implement [`ConnectionFactory`] for the
//! vendor driver and register it with [`resolver::register_driver`] (or pass
//! it to [`Database::with_factory`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use polydb::{Column, DataType, Database, Table};
//!
//! # async fn run() -> polydb::Result<()> {
//! let db = Database::new("shop", "Data Source=shop.db;Provider=sqlite;Migration=Full", None)?;
//! let mut stock = Table::new("Stock")
//!     .with_column(Column::new("Id", DataType::Int32).identity().primary_key())
//!     .with_column(Column::new("Sku", DataType::String).length(32));
//! stock.fix();
//! let plan = db.sync_tables(&[stock]).await?;
//! println!("{} statement(s) executed", plan.statements().len());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod core;
pub mod database;
pub mod drivers;
pub mod error;
pub mod metadata;
pub mod paging;
pub mod resolver;
pub mod session;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use batch::{BatchBuilder, BatchRequest, BatchStatement, UpsertStyle};
pub use config::{ConnectionString, ConnectionsFile, DbConfig, DbType, Migration, NameFormat};
pub use crate::core::{
    CatalogReader, Column, Connection, ConnectionFactory, DataType, Dialect, DialectCatalog, Index,
    NameRules, Param, Row, RowSet, SchemaDdl, SelectBuilder, SqlFormatter, SqlValue, Table,
};
pub use database::{Database, SessionContext};
pub use drivers::dialect_for;
pub use error::{DbError, DriverError, Result};
pub use metadata::MetaData;
pub use paging::{paginate, paginate_builder, PagingStyle};
pub use resolver::{DriverResolver, Platform};
pub use session::Session;
pub use sync::{SchemaSync, SyncPlan, TablePlan, TableState};
