//! MySQL-protocol driver (MySQL, MariaDB, IRIS).
//!
//! - [`MysqlDialect`]: SQL syntax strategy, with an IRIS flavor
//! - `catalog`: `information_schema` queries
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+
//! - InterSystems IRIS 2021+

mod catalog;
mod dialect;

pub use dialect::MysqlDialect;
