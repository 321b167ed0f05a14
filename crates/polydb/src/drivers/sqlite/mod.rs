//! SQLite driver.

mod catalog;
mod dialect;

pub use dialect::SqliteDialect;
