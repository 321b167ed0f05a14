//! Core abstractions shared by every backend.
//!
//! - [`schema`]: neutral Table, Column and Index model
//! - [`value`]: SQL values and query result sets
//! - [`typemap`]: ordered vendor type tables
//! - [`identifier`]: name validation, folding, quoting and reserved words
//! - [`sql`]: SQL text builders
//! - [`format`]: literal rendering shared by the formatters
//! - [`traits`]: capability traits for dialects and the connection primitive
//! - [`catalog`]: dialect registry for dependency injection
//!
//! # Architecture
//!
//! The core defines database-agnostic abstractions that are implemented by
//! driver modules (`drivers/mssql`, `drivers/postgres`, etc.). New backends
//! are added without modifying core code, and core logic is tested with mock
//! connections.

pub mod catalog;
pub mod format;
pub mod identifier;
pub mod schema;
pub mod sql;
pub mod traits;
pub mod typemap;
pub mod value;

pub use catalog::DialectCatalog;
pub use identifier::{NameRules, QuoteStyle, ReservedWords};
pub use schema::{Column, DataType, Index, Table};
pub use sql::{SelectBuilder, SqlBuilder};
pub use traits::{
    CatalogReader, Connection, ConnectionFactory, Dialect, Param, SchemaDdl, SqlFormatter,
};
pub use typemap::{ResolvedType, TypeTable};
pub use value::{Row, RowSet, SqlValue};
