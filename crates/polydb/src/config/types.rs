//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DbError;

use super::connection_string::ConnectionString;

/// Backend type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    SqlServer,
    PostgreSql,
    HighGo,
    KingBase,
    VastBase,
    Sqlite,
    DaMeng,
    MySql,
    Iris,
    InfluxDb,
}

impl DbType {
    /// All backends, in registration order.
    pub const ALL: [DbType; 10] = [
        DbType::SqlServer,
        DbType::PostgreSql,
        DbType::HighGo,
        DbType::KingBase,
        DbType::VastBase,
        DbType::Sqlite,
        DbType::DaMeng,
        DbType::MySql,
        DbType::Iris,
        DbType::InfluxDb,
    ];

    /// Canonical lowercase tag.
    pub fn as_str(self) -> &'static str {
        match self {
            DbType::SqlServer => "sqlserver",
            DbType::PostgreSql => "postgresql",
            DbType::HighGo => "highgo",
            DbType::KingBase => "kingbase",
            DbType::VastBase => "vastbase",
            DbType::Sqlite => "sqlite",
            DbType::DaMeng => "dameng",
            DbType::MySql => "mysql",
            DbType::Iris => "iris",
            DbType::InfluxDb => "influxdb",
        }
    }

    /// Base name of the vendor driver module for plugin resolution.
    pub fn driver_module(self) -> &'static str {
        match self {
            DbType::SqlServer => "Microsoft.Data.SqlClient",
            DbType::PostgreSql => "Npgsql",
            DbType::HighGo => "Nhgdb",
            DbType::KingBase => "Kdbndp",
            DbType::VastBase => "Npgsql.Vastbase",
            DbType::Sqlite => "Microsoft.Data.Sqlite",
            DbType::DaMeng => "DmProvider",
            DbType::MySql => "MySqlConnector",
            DbType::Iris => "InterSystems.Data.IRISClient",
            DbType::InfluxDb => "InfluxDB.Client",
        }
    }

    /// Whether the backend speaks a PostgreSQL-compatible dialect.
    pub fn is_postgres_family(self) -> bool {
        matches!(
            self,
            DbType::PostgreSql | DbType::HighGo | DbType::KingBase | DbType::VastBase
        )
    }

    /// Whether the backend speaks the MySQL protocol.
    pub fn is_mysql_protocol(self) -> bool {
        matches!(self, DbType::MySql | DbType::Iris)
    }

    /// Detect the backend from a `Provider` option value.
    ///
    /// Accepts canonical tags and aliases (`pg`, `dm`, `mssql`) as well as
    /// vendor driver names (`Npgsql`, `System.Data.SQLite`).
    pub fn from_provider(provider: &str) -> Option<DbType> {
        if let Ok(db_type) = provider.parse() {
            return Some(db_type);
        }
        let lower = provider.to_ascii_lowercase();
        const HINTS: &[(&str, DbType)] = &[
            ("kingbase", DbType::KingBase),
            ("kdbndp", DbType::KingBase),
            ("highgo", DbType::HighGo),
            ("nhgdb", DbType::HighGo),
            ("vastbase", DbType::VastBase),
            ("npgsql", DbType::PostgreSql),
            ("postgres", DbType::PostgreSql),
            ("sqlclient", DbType::SqlServer),
            ("sqlserver", DbType::SqlServer),
            ("sqlite", DbType::Sqlite),
            ("dameng", DbType::DaMeng),
            ("dmprovider", DbType::DaMeng),
            ("iris", DbType::Iris),
            ("mysql", DbType::MySql),
            ("mariadb", DbType::MySql),
            ("influx", DbType::InfluxDb),
        ];
        HINTS
            .iter()
            .find(|(hint, _)| lower.contains(hint))
            .map(|(_, db_type)| *db_type)
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let db_type = match s.trim().to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" | "sql_server" => DbType::SqlServer,
            "postgresql" | "postgres" | "pg" | "pgsql" => DbType::PostgreSql,
            "highgo" | "hgdb" => DbType::HighGo,
            "kingbase" | "kingbasees" | "kdb" => DbType::KingBase,
            "vastbase" => DbType::VastBase,
            "sqlite" | "sqlite3" => DbType::Sqlite,
            "dameng" | "dm" => DbType::DaMeng,
            "mysql" | "mariadb" => DbType::MySql,
            "iris" | "intersystems" => DbType::Iris,
            "influxdb" | "influx" => DbType::InfluxDb,
            other => {
                return Err(DbError::Config(format!("Unknown database type '{}'", other)))
            }
        };
        Ok(db_type)
    }
}

/// Case-folding policy for table and column names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameFormat {
    /// Names are used as declared.
    #[default]
    Default,
    Upper,
    Lower,
    /// camelCase / PascalCase become snake_case.
    Underline,
}

impl FromStr for NameFormat {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "default" => Ok(NameFormat::Default),
            "upper" => Ok(NameFormat::Upper),
            "lower" => Ok(NameFormat::Lower),
            "underline" => Ok(NameFormat::Underline),
            other => Err(DbError::Config(format!("Unknown NameFormat '{}'", other))),
        }
    }
}

/// How the schema synchronizer may touch the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Migration {
    /// No schema checks at all.
    Off,
    /// Plan and report, never execute.
    ReadOnly,
    /// Create and alter, never drop.
    #[default]
    On,
    /// Create, alter, drop and rebuild.
    Full,
}

impl Migration {
    /// Whether drops and destructive rebuilds are suppressed.
    pub fn no_delete(self) -> bool {
        !matches!(self, Migration::Full)
    }
}

impl FromStr for Migration {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Migration::Off),
            "readonly" | "read_only" => Ok(Migration::ReadOnly),
            "on" => Ok(Migration::On),
            "full" => Ok(Migration::Full),
            other => Err(DbError::Config(format!("Unknown Migration mode '{}'", other))),
        }
    }
}

/// Configuration of one named database connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Connection name (used in logs and error messages).
    pub name: String,

    /// Normalized connection string, including polydb options.
    pub connection_string: ConnectionString,

    /// Backend type.
    pub db_type: DbType,

    /// Owner / schema name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Prefix prepended to table names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_prefix: Option<String>,

    /// Case folding applied to names.
    #[serde(default)]
    pub name_format: NameFormat,

    /// Schema migration mode.
    #[serde(default)]
    pub migration: Migration,

    /// Reject writes through this connection.
    #[serde(default)]
    pub readonly: bool,

    /// Entity cache lifetime in seconds (0 disables).
    #[serde(default)]
    pub data_cache: u64,

    /// Rows per batch insert statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Command timeout in seconds (0 uses the driver default).
    #[serde(default)]
    pub command_timeout: u64,

    /// Retries for transient failures outside transactions.
    #[serde(default)]
    pub retry_on_failure: u32,

    /// Emit bind parameters instead of inline literals.
    #[serde(default)]
    pub use_parameter: bool,

    /// Log every statement at info level.
    #[serde(default)]
    pub show_sql: bool,

    /// Maximum SQL length quoted in error messages.
    #[serde(default = "default_max_sql_length")]
    pub max_sql_length: usize,

    /// Database name extracted from the connection string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
}

pub(crate) fn default_batch_size() -> usize {
    5_000
}

pub(crate) fn default_max_sql_length() -> usize {
    4_096
}

/// One entry in a named connections file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEntry {
    /// Raw connection string.
    pub connection_string: String,

    /// Backend hint used when the connection string has no `Provider` option.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// YAML file of named connections.
///
/// ```yaml
/// connections:
///   Membership:
///     connection_string: "Data Source=member.db"
///     provider: sqlite
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionsFile {
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_type_aliases() {
        assert_eq!("pg".parse::<DbType>().unwrap(), DbType::PostgreSql);
        assert_eq!("KingbaseES".parse::<DbType>().unwrap(), DbType::KingBase);
        assert_eq!("dm".parse::<DbType>().unwrap(), DbType::DaMeng);
        assert_eq!("MSSQL".parse::<DbType>().unwrap(), DbType::SqlServer);
        assert!("oracle".parse::<DbType>().is_err());
    }

    #[test]
    fn test_db_type_from_provider() {
        assert_eq!(DbType::from_provider("Npgsql"), Some(DbType::PostgreSql));
        assert_eq!(
            DbType::from_provider("System.Data.SQLite"),
            Some(DbType::Sqlite)
        );
        assert_eq!(
            DbType::from_provider("Microsoft.Data.SqlClient"),
            Some(DbType::SqlServer)
        );
        assert_eq!(DbType::from_provider("Kdbndp"), Some(DbType::KingBase));
        assert_eq!(DbType::from_provider("nothing"), None);
    }

    #[test]
    fn test_db_type_round_trip_tag() {
        for db_type in DbType::ALL {
            assert_eq!(db_type.as_str().parse::<DbType>().unwrap(), db_type);
        }
    }

    #[test]
    fn test_name_format_parse() {
        assert_eq!("None".parse::<NameFormat>().unwrap(), NameFormat::Default);
        assert_eq!("UNDERLINE".parse::<NameFormat>().unwrap(), NameFormat::Underline);
        assert!("camel".parse::<NameFormat>().is_err());
    }

    #[test]
    fn test_migration_no_delete() {
        assert!(Migration::On.no_delete());
        assert!(Migration::ReadOnly.no_delete());
        assert!(!Migration::Full.no_delete());
        assert_eq!("ReadOnly".parse::<Migration>().unwrap(), Migration::ReadOnly);
    }

    #[test]
    fn test_connections_file_yaml() {
        let yaml = r#"
connections:
  Membership:
    connection_string: "Data Source=member.db"
    provider: sqlite
  Log:
    connection_string: "Server=.;Database=Log;Provider=sqlserver"
"#;
        let file: ConnectionsFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.connections.len(), 2);
        assert_eq!(
            file.connections["Membership"].provider.as_deref(),
            Some("sqlite")
        );
        assert!(file.connections["Log"].provider.is_none());
    }
}
