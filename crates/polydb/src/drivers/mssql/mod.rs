//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy for SQL Server 2000 and later
//! - `catalog`: `sys.*` catalog queries used by the schema reader

mod catalog;
mod dialect;

pub use dialect::MssqlDialect;
