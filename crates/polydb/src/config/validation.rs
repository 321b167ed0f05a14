//! Configuration validation.

use super::{ConnectionsFile, DbConfig, DbType};
use crate::error::{DbError, Result};

/// Validate one connection's configuration.
pub fn validate(config: &DbConfig) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(DbError::Config("connection name is required".into()));
    }
    if config.connection_string.is_empty() {
        return Err(DbError::Config(format!(
            "connection {} has an empty connection string",
            config.name
        )));
    }
    if config.batch_size == 0 {
        return Err(DbError::Config(format!(
            "connection {}: BatchSize must be at least 1",
            config.name
        )));
    }
    if config.max_sql_length == 0 {
        return Err(DbError::Config(format!(
            "connection {}: MaxSqlLength must be at least 1",
            config.name
        )));
    }
    if let Some(prefix) = &config.table_prefix {
        if prefix.contains(char::is_whitespace) || prefix.contains('\0') {
            return Err(DbError::Config(format!(
                "connection {}: TablePrefix '{}' is not a valid name fragment",
                config.name, prefix
            )));
        }
    }
    if config.db_type == DbType::Sqlite && config.database_name.is_none() {
        return Err(DbError::Config(format!(
            "connection {}: SQLite requires a Data Source file",
            config.name
        )));
    }
    Ok(())
}

/// Validate every entry of a named connections file.
pub fn validate_file(file: &ConnectionsFile) -> Result<()> {
    for (name, entry) in &file.connections {
        if entry.connection_string.trim().is_empty() {
            return Err(DbError::Config(format!(
                "connections.{}.connection_string is required",
                name
            )));
        }
        if let Some(provider) = &entry.provider {
            if DbType::from_provider(provider).is_none() {
                return Err(DbError::Config(format!(
                    "connections.{}.provider '{}' is not a known database type",
                    name, provider
                )));
            }
        }
    }
    Ok(())
}
