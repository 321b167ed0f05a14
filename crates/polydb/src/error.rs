//! Error types for the dialect engine.

use thiserror::Error;

/// Error reported by the externally supplied connection primitive.
///
/// Host drivers map their native errors into this shape so the session can
/// decide whether a failure is worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    /// Driver message.
    pub message: String,
    /// Vendor error code, if the driver exposes one.
    pub code: Option<i32>,
    /// Whether the failure is transient (deadlock, dropped connection, timeout).
    pub transient: bool,
}

impl DriverError {
    /// A permanent driver failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            transient: false,
        }
    }

    /// A transient driver failure that may succeed when retried.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            transient: true,
        }
    }

    /// Attach a vendor error code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}

/// Main error type for dialect, session and schema operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// Configuration error (missing connection string, bad option value, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No driver module could be located for a backend.
    #[error("Missing driver for {backend}: expected module at {path}")]
    MissingDriver { backend: String, path: String },

    /// The connection's driver could not be resolved when opening.
    #[error("Driver not found for connection {connection} ({backend})")]
    DriverNotFound { connection: String, backend: String },

    /// The backend cannot express the requested operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The query cannot be paginated as requested.
    #[error("Pagination error: {0}")]
    Pagination(String),

    /// The underlying connection primitive failed.
    #[error("[{connection}] {source}\n  SQL: {sql}\n  Parameters: {params}")]
    Driver {
        connection: String,
        sql: String,
        params: usize,
        #[source]
        source: DriverError,
    },

    /// A table rebuild failed and was rolled back.
    #[error("Rebuild of table {table} failed and was rolled back\n  DDL: {ddl}")]
    Rebuild {
        table: String,
        ddl: String,
        #[source]
        source: Box<DbError>,
    },

    /// A value or request cannot be turned into SQL.
    #[error("Data error: {0}")]
    Data(String),

    /// IO error (plugin directory, schema files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// Wrap a driver error with the statement that caused it.
    ///
    /// The statement text is cut at `max_len` characters.
    pub fn driver(
        connection: impl Into<String>,
        sql: &str,
        params: usize,
        max_len: usize,
        source: DriverError,
    ) -> Self {
        DbError::Driver {
            connection: connection.into(),
            sql: truncate_sql(sql, max_len),
            params,
            source,
        }
    }

    /// Create a Rebuild error.
    pub fn rebuild(table: impl Into<String>, ddl: impl Into<String>, source: DbError) -> Self {
        DbError::Rebuild {
            table: table.into(),
            ddl: ddl.into(),
            source: Box::new(source),
        }
    }

    /// Whether retrying the same statement may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Driver { source, .. } if source.transient)
    }

    /// Process exit code for command-line front ends.
    pub fn exit_code(&self) -> u8 {
        match self {
            DbError::Config(_) | DbError::Yaml(_) | DbError::Json(_) => 1,
            DbError::MissingDriver { .. } | DbError::DriverNotFound { .. } => 2,
            DbError::Driver { .. } => 3,
            DbError::Rebuild { .. } => 4,
            DbError::Unsupported(_) | DbError::Pagination(_) | DbError::Data(_) => 5,
            DbError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

fn truncate_sql(sql: &str, max_len: usize) -> String {
    if max_len == 0 || sql.chars().count() <= max_len {
        return sql.to_string();
    }
    let cut: String = sql.chars().take(max_len).collect();
    format!("{}...", cut)
}

/// Result type alias for polydb operations.
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_names_connection_and_sql() {
        let err = DbError::driver(
            "Membership",
            "SELECT * FROM users",
            2,
            0,
            DriverError::new("table missing"),
        );
        let text = err.to_string();
        assert!(text.contains("[Membership]"));
        assert!(text.contains("SELECT * FROM users"));
        assert!(text.contains("Parameters: 2"));
    }

    #[test]
    fn test_driver_error_truncates_long_sql() {
        let sql = "x".repeat(50);
        let err = DbError::driver("c", &sql, 0, 10, DriverError::new("boom"));
        match err {
            DbError::Driver { sql, .. } => assert_eq!(sql, "xxxxxxxxxx..."),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_transient_classification() {
        let transient = DbError::driver("c", "q", 0, 0, DriverError::transient("deadlock"));
        let permanent = DbError::driver("c", "q", 0, 0, DriverError::new("syntax"));
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
        assert!(!DbError::Config("x".into()).is_transient());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(DbError::Config("x".into()).exit_code(), 1);
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(DbError::from(missing).exit_code(), 7);
        let driver = DbError::driver("c", "q", 0, 0, DriverError::new("x"));
        assert_eq!(DbError::rebuild("t", "ddl", driver).exit_code(), 4);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let inner = DbError::driver("c", "ALTER", 0, 0, DriverError::new("locked"));
        let err = DbError::rebuild("users", "ALTER TABLE users", inner);
        let detailed = err.format_detailed();
        assert!(detailed.contains("Rebuild of table users"));
        assert!(detailed.contains("Caused by"));
    }
}
