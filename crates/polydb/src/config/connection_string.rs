//! Connection string parsing and option extraction.
//!
//! Connection strings are `;`-separated `key=value` pairs with
//! case-insensitive keys. polydb reads its own options out of the string and
//! hands the remainder to the vendor driver.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::types::{default_batch_size, default_max_sql_length, DbConfig, DbType};
use crate::error::{DbError, Result};

/// Options consumed by polydb and stripped from the driver-facing string.
pub const POLYDB_OPTIONS: &[&str] = &[
    "Owner",
    "ShowSQL",
    "UseParameter",
    "Migration",
    "TablePrefix",
    "Readonly",
    "DataCache",
    "NameFormat",
    "BatchSize",
    "CommandTimeout",
    "RetryOnFailure",
    "MaxSqlLength",
    "Provider",
];

/// Keys that carry the database name, in lookup order.
const DATABASE_KEYS: &[&str] = &["Database", "Db", "Initial Catalog", "Data Source"];

/// Keys whose values are redacted from debug output.
const SECRET_KEYS: &[&str] = &["Password", "Pwd", "Token"];

/// Ordered key/value map with case-insensitive keys.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ConnectionString {
    pairs: Vec<(String, String)>,
}

impl ConnectionString {
    /// Parse `k=v;k=v`. Empty segments are skipped; a repeated key keeps the
    /// last value. Values may be wrapped in single or double quotes.
    pub fn parse(text: &str) -> Self {
        let mut cs = ConnectionString::default();
        for segment in split_segments(text) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = match segment.split_once('=') {
                Some((k, v)) => (k.trim(), unquote(v.trim())),
                None => (segment, ""),
            };
            if !key.is_empty() {
                cs.set(key, value);
            }
        }
        cs
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// First present key from `keys`, skipping blank values.
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.trim().is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a value, keeping the original key position.
    pub fn set(&mut self, key: &str, value: &str) {
        match self
            .pairs
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(pair) => pair.1 = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self
            .pairs
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.pairs.remove(pos).1)
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    /// The string handed to the vendor driver: polydb options removed.
    pub fn driver_string(&self) -> String {
        let mut cs = self.clone();
        for key in POLYDB_OPTIONS {
            cs.remove(key);
        }
        cs.to_string()
    }

    fn flag(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "" => Ok(None),
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                _ => Err(invalid(key, v)),
            },
        }
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| invalid(key, v)),
        }
    }

    fn text(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Split on `;` outside quoted values. A quote only opens directly after `=`.
fn split_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut quote: Option<char> = None;
    let mut after_eq = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') if after_eq => quote = Some(c),
            (None, ';') => {
                segments.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        if !c.is_whitespace() {
            after_eq = c == '=';
        }
    }
    segments.push(&text[start..]);
    segments
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn invalid(key: &str, value: &str) -> DbError {
    DbError::Config(format!("Invalid value '{}' for option {}", value, key))
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            if v.contains(';') {
                write!(f, "{}=\"{}\"", k, v)?;
            } else {
                write!(f, "{}={}", k, v)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.pairs {
            if SECRET_KEYS.iter().any(|s| s.eq_ignore_ascii_case(k)) {
                map.entry(k, &"[REDACTED]");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}

impl From<String> for ConnectionString {
    fn from(s: String) -> Self {
        ConnectionString::parse(&s)
    }
}

impl From<ConnectionString> for String {
    fn from(cs: ConnectionString) -> Self {
        cs.to_string()
    }
}

impl DbConfig {
    /// Build a connection's configuration from its connection string.
    ///
    /// The backend comes from the `Provider` option, falling back to
    /// `type_hint`.
    pub fn from_connection_string(
        name: &str,
        connection_string: &str,
        type_hint: Option<DbType>,
    ) -> Result<DbConfig> {
        let cs = ConnectionString::parse(connection_string);

        let db_type = match cs.text("Provider") {
            Some(provider) => DbType::from_provider(&provider).ok_or_else(|| {
                DbError::Config(format!(
                    "Unknown Provider '{}' for connection {}",
                    provider, name
                ))
            })?,
            None => type_hint.ok_or_else(|| {
                DbError::Config(format!(
                    "Cannot detect database type for connection {}; set Provider",
                    name
                ))
            })?,
        };

        let name_format = match cs.text("NameFormat") {
            Some(v) => v.parse()?,
            None => Default::default(),
        };
        let migration = match cs.text("Migration") {
            Some(v) => v.parse()?,
            None => Default::default(),
        };

        let database_name = database_name(&cs, db_type);

        Ok(DbConfig {
            name: name.to_string(),
            db_type,
            owner: cs.text("Owner"),
            table_prefix: cs.text("TablePrefix"),
            name_format,
            migration,
            readonly: cs.flag("Readonly")?.unwrap_or(false),
            data_cache: cs.number("DataCache")?.unwrap_or(0),
            batch_size: cs.number("BatchSize")?.unwrap_or_else(default_batch_size),
            command_timeout: cs.number("CommandTimeout")?.unwrap_or(0),
            retry_on_failure: cs.number("RetryOnFailure")?.unwrap_or(0),
            use_parameter: cs.flag("UseParameter")?.unwrap_or(false),
            show_sql: cs.flag("ShowSQL")?.unwrap_or(false),
            max_sql_length: cs
                .number("MaxSqlLength")?
                .unwrap_or_else(default_max_sql_length),
            database_name,
            connection_string: cs,
        })
    }

    /// Connection string for the vendor driver, polydb options stripped.
    pub fn driver_connection_string(&self) -> String {
        self.connection_string.driver_string()
    }
}

fn database_name(cs: &ConnectionString, db_type: DbType) -> Option<String> {
    let raw = cs.get_any(DATABASE_KEYS)?.trim();
    if db_type == DbType::Sqlite {
        // SQLite names the database after its file.
        return Path::new(raw)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty());
    }
    Some(raw.to_string())
}
