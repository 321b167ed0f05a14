//! Configuration loading and validation.

mod connection_string;
mod types;
mod validation;

pub use connection_string::{ConnectionString, POLYDB_OPTIONS};
pub use types::*;

use crate::error::{DbError, Result};
use std::path::Path;

impl DbConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl ConnectionsFile {
    /// Load named connections from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse named connections from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: ConnectionsFile = serde_yaml::from_str(yaml)?;
        file.validate()?;
        Ok(file)
    }

    /// Validate every entry.
    pub fn validate(&self) -> Result<()> {
        validation::validate_file(self)
    }

    /// Build the configuration of a named connection.
    pub fn config(&self, name: &str) -> Result<DbConfig> {
        let entry = self
            .connections
            .get(name)
            .ok_or_else(|| DbError::Config(format!("No connection named '{}'", name)))?;
        let hint = match &entry.provider {
            Some(p) => DbType::from_provider(p),
            None => None,
        };
        let config = DbConfig::from_connection_string(name, &entry.connection_string, hint)?;
        config.validate()?;
        Ok(config)
    }
}
