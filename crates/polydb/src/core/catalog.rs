//! Dialect catalog for explicit dependency injection.
//!
//! The [`DialectCatalog`] maps backend types to dialect implementations. It is
//! constructed explicitly and handed to whatever needs to look a dialect up
//! (the database, the CLI), so tests can swap in their own dialects.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::DbType;
use crate::drivers::dialect_for;
use crate::error::{DbError, Result};

use super::traits::Dialect;

/// Registry of backend dialects keyed by [`DbType`].
///
/// # Example
///
/// ```rust
/// use polydb::config::DbType;
/// use polydb::core::catalog::DialectCatalog;
///
/// let catalog = DialectCatalog::with_builtins();
/// let dialect = catalog.lookup("kingbasees").unwrap();
/// assert_eq!(dialect.db_type(), DbType::KingBase);
/// ```
#[derive(Default)]
pub struct DialectCatalog {
    dialects: BTreeMap<DbType, Arc<dyn Dialect>>,
}

impl DialectCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with all ten built-in dialects registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        for db_type in DbType::ALL {
            catalog.register_arc(db_type, dialect_for(db_type));
        }
        catalog
    }

    /// Register a dialect, replacing any previous one for the same backend.
    pub fn register(&mut self, db_type: DbType, dialect: impl Dialect + 'static) {
        self.dialects.insert(db_type, Arc::new(dialect));
    }

    /// Register a shared dialect.
    pub fn register_arc(&mut self, db_type: DbType, dialect: Arc<dyn Dialect>) {
        self.dialects.insert(db_type, dialect);
    }

    pub fn get(&self, db_type: DbType) -> Option<Arc<dyn Dialect>> {
        self.dialects.get(&db_type).cloned()
    }

    /// Get a dialect, returning an error if none is registered.
    pub fn require(&self, db_type: DbType) -> Result<Arc<dyn Dialect>> {
        self.get(db_type).ok_or_else(|| {
            DbError::Config(format!("No dialect registered for {}", db_type))
        })
    }

    /// Resolve a tag or alias (`sqlserver`, `pg`, `kingbasees`, `dm`, ...).
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Dialect>> {
        let db_type = match name.parse::<DbType>() {
            Ok(t) => t,
            Err(_) => DbType::from_provider(name).ok_or_else(|| {
                DbError::Config(format!(
                    "Unknown database type: '{}'. Supported types: {}",
                    name,
                    self.names().join(", ")
                ))
            })?,
        };
        self.require(db_type)
    }

    pub fn contains(&self, db_type: DbType) -> bool {
        self.dialects.contains_key(&db_type)
    }

    /// Registered backend tags, in registration order of [`DbType::ALL`].
    pub fn names(&self) -> Vec<&'static str> {
        self.dialects.keys().map(|t| t.as_str()).collect()
    }
}

impl std::fmt::Debug for DialectCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialectCatalog")
            .field("dialects", &self.names())
            .finish()
    }
}
