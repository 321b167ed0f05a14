//! PostgreSQL-family driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL, HighGo,
//!   KingBase and VastBase
//! - `catalog`: `pg_catalog` / `information_schema` queries

mod catalog;
mod dialect;

pub use dialect::PostgresDialect;
