//! Per-connection entry point.
//!
//! A [`Database`] owns one connection's configuration, its dialect and name
//! rules, the resolved driver factory and the sessions handed out per
//! [`SessionContext`] slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::thread::ThreadId;

use tracing::{debug, info, warn};

use crate::config::{DbConfig, DbType};
use crate::core::identifier::{NameRules, ReservedWords};
use crate::core::schema::{Column, Table};
use crate::core::sql::SelectBuilder;
use crate::core::traits::{Connection, ConnectionFactory, Dialect};
use crate::core::value::SqlValue;
use crate::drivers::dialect_for;
use crate::error::{DbError, Result};
use crate::metadata::MetaData;
use crate::paging;
use crate::resolver::DriverResolver;
use crate::session::Session;
use crate::sync::{SchemaSync, SyncPlan};

static NEXT_CHAIN: AtomicU64 = AtomicU64::new(1);

/// Session slot selector.
///
/// Thread slots and call-chain slots live in independent maps: the same
/// thread can hold one thread session and any number of chain sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionContext {
    /// One session per OS thread.
    Thread(ThreadId),
    /// One session per async call chain; the caller carries the handle.
    Chain(u64),
}

impl SessionContext {
    pub fn current_thread() -> Self {
        SessionContext::Thread(std::thread::current().id())
    }

    /// A fresh call-chain handle.
    pub fn new_chain() -> Self {
        SessionContext::Chain(NEXT_CHAIN.fetch_add(1, Ordering::Relaxed))
    }
}

/// Configuration-derived state, replaced as a whole when the connection
/// string changes.
struct DbState {
    config: Arc<DbConfig>,
    dialect: Arc<dyn Dialect>,
    names: OnceLock<Arc<NameRules>>,
}

/// One named database connection.
pub struct Database {
    state: RwLock<Arc<DbState>>,
    resolver: Option<Arc<DriverResolver>>,
    factory: RwLock<Option<Arc<dyn ConnectionFactory>>>,
    thread_sessions: Mutex<HashMap<ThreadId, Arc<Session>>>,
    chain_sessions: Mutex<HashMap<u64, Arc<Session>>>,
    metadata: tokio::sync::Mutex<Option<Arc<MetaData>>>,
    version: RwLock<Option<String>>,
    reserved: OnceLock<ReservedWords>,
}

impl Database {
    /// Parse the connection string and pick the dialect.
    ///
    /// The backend comes from the `Provider` option, else from `type_hint`.
    pub fn new(name: &str, connection_string: &str, type_hint: Option<DbType>) -> Result<Self> {
        let config = DbConfig::from_connection_string(name, connection_string, type_hint)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: DbConfig) -> Self {
        debug!("Database {} uses {}", config.name, config.db_type);
        Self {
            state: RwLock::new(Arc::new(DbState::new(config))),
            resolver: None,
            factory: RwLock::new(None),
            thread_sessions: Mutex::new(HashMap::new()),
            chain_sessions: Mutex::new(HashMap::new()),
            metadata: tokio::sync::Mutex::new(None),
            version: RwLock::new(None),
            reserved: OnceLock::new(),
        }
    }

    /// Resolve drivers through this resolver instead of the global one.
    pub fn with_resolver(mut self, resolver: Arc<DriverResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use this factory directly, bypassing driver resolution.
    pub fn with_factory(self, factory: Arc<dyn ConnectionFactory>) -> Self {
        if let Ok(mut slot) = self.factory.write() {
            *slot = Some(factory);
        }
        self
    }

    fn state(&self) -> Arc<DbState> {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn name(&self) -> String {
        self.state().config.name.clone()
    }

    pub fn db_type(&self) -> DbType {
        self.state().config.db_type
    }

    pub fn config(&self) -> Arc<DbConfig> {
        self.state().config.clone()
    }

    pub fn dialect(&self) -> Arc<dyn Dialect> {
        self.state().dialect.clone()
    }

    /// Name rules of this connection, built on first use.
    pub fn names(&self) -> Arc<NameRules> {
        let state = self.state();
        state
            .names
            .get_or_init(|| {
                let reserved = self
                    .reserved
                    .get()
                    .cloned()
                    .unwrap_or_else(|| ReservedWords::from_list(state.dialect.reserved_words()));
                Arc::new(
                    NameRules::new(state.dialect.quote_style())
                        .with_prefix(state.config.table_prefix.clone())
                        .with_format(state.config.name_format)
                        .with_reserved(reserved),
                )
            })
            .clone()
    }

    /// Replace the static reserved-word list, typically with the list read
    /// from the live catalog. Only effective before names are first formatted.
    pub fn install_reserved_words(&self, words: ReservedWords) -> bool {
        self.reserved.set(words).is_ok()
    }

    fn resolver(&self) -> &DriverResolver {
        self.resolver
            .as_deref()
            .unwrap_or_else(|| DriverResolver::global())
    }

    async fn factory(&self) -> Result<Arc<dyn ConnectionFactory>> {
        let cached = self.factory.read().ok().and_then(|slot| slot.clone());
        if let Some(factory) = cached {
            return Ok(factory);
        }
        let config = self.config();
        let factory = self
            .resolver()
            .resolve(config.db_type)
            .await
            .map_err(|e| {
                warn!("Driver resolution for {} failed: {}", config.name, e);
                DbError::DriverNotFound {
                    connection: config.name.clone(),
                    backend: config.db_type.to_string(),
                }
            })?;
        if let Ok(mut slot) = self.factory.write() {
            *slot = Some(factory.clone());
        }
        Ok(factory)
    }

    /// Open a raw connection with the driver-facing connection string.
    pub async fn open(&self) -> Result<Box<dyn Connection>> {
        let factory = self.factory().await?;
        let config = self.config();
        let mut conn = factory
            .connect(&config.driver_connection_string())
            .await
            .map_err(|e| DbError::driver(config.name.clone(), "<connect>", 0, config.max_sql_length, e))?;
        conn.set_command_timeout(config.command_timeout);
        Ok(conn)
    }

    /// The session of a slot, created on first use and replaced once it
    /// was disposed or its connection failed.
    pub async fn create_session(&self, context: &SessionContext) -> Result<Arc<Session>> {
        let state = self.state();
        if state.config.connection_string.is_empty() {
            return Err(DbError::Config(format!(
                "Connection {} has an empty connection string",
                state.config.name
            )));
        }
        let factory = self.factory().await?;

        let usable = |s: &Arc<Session>| {
            !s.is_disposed() && !s.is_errored() && Arc::ptr_eq(s.config_arc(), &state.config)
        };
        let fresh = || {
            Arc::new(Session::new(
                state.config.clone(),
                state.dialect.clone(),
                self.names(),
                factory.clone(),
            ))
        };

        let session = match context {
            SessionContext::Thread(id) => {
                let mut map = lock(&self.thread_sessions);
                match map.get(id) {
                    Some(s) if usable(s) => s.clone(),
                    _ => {
                        let s = fresh();
                        map.insert(*id, s.clone());
                        s
                    }
                }
            }
            SessionContext::Chain(id) => {
                let mut map = lock(&self.chain_sessions);
                map.retain(|_, s| !s.is_disposed());
                match map.get(id) {
                    Some(s) if usable(s) => s.clone(),
                    _ => {
                        let s = fresh();
                        map.insert(*id, s.clone());
                        s
                    }
                }
            }
        };
        Ok(session)
    }

    /// Session of the calling thread.
    pub async fn session(&self) -> Result<Arc<Session>> {
        self.create_session(&SessionContext::current_thread()).await
    }

    /// End a slot: remove its session and close the connection.
    ///
    /// A call chain releases its slot when it completes. Returns false when
    /// the slot held no session.
    pub async fn release_session(&self, context: &SessionContext) -> bool {
        let session = match context {
            SessionContext::Thread(id) => {
                let mut map = lock(&self.thread_sessions);
                map.remove(id)
            }
            SessionContext::Chain(id) => {
                let mut map = lock(&self.chain_sessions);
                map.remove(id)
            }
        };
        match session {
            Some(session) => {
                debug!("Releasing session {} of {}", session.id(), self.name());
                session.dispose().await;
                true
            }
            None => false,
        }
    }

    /// Quote and fold a column (or any non-table) name.
    pub fn format_name(&self, name: &str) -> String {
        self.names().column(name)
    }

    /// Physical table name: prefix, folding and quoting.
    pub fn format_table_name(&self, name: &str) -> String {
        self.names().table(name)
    }

    pub fn format_value(&self, column: &Column, value: &SqlValue) -> Result<String> {
        self.dialect().format_value(column, value)
    }

    pub fn format_parameter_name(&self, name: &str) -> String {
        self.dialect().format_parameter_name(name)
    }

    pub fn string_concat(&self, left: &str, right: &str) -> String {
        self.dialect().string_concat(left, right)
    }

    /// LIKE operand from a `{0}` template; a bind value when parameters are on.
    pub fn format_like(&self, value: &str, template: &str) -> String {
        let parameterized = self.config().use_parameter;
        self.dialect().format_like(value, template, parameterized)
    }

    fn cached_version(&self) -> Option<String> {
        self.version.read().ok().and_then(|v| v.clone())
    }

    /// Paginate raw SQL with the strategy of the cached server version.
    pub fn paginate(&self, sql: &str, start: i64, max: i64, key: Option<&str>) -> Result<String> {
        let version = self.cached_version();
        let style = self.dialect().paging_style(version.as_deref());
        paging::paginate(style, sql, start, max, key)
    }

    pub fn paginate_builder(
        &self,
        builder: SelectBuilder,
        start: i64,
        max: i64,
        key: Option<&str>,
    ) -> Result<SelectBuilder> {
        let version = self.cached_version();
        let style = self.dialect().paging_style(version.as_deref());
        paging::paginate_builder(style, builder, start, max, key)
    }

    /// Server version string, queried once and cached.
    pub async fn server_version(&self, session: &Session) -> Result<Option<String>> {
        if let Some(version) = self.cached_version() {
            return Ok(Some(version));
        }
        let Some(sql) = self.dialect().version_sql() else {
            return Ok(None);
        };
        let version = session
            .query_scalar(sql, &[])
            .await?
            .and_then(|v| v.to_text())
            .map(|v| v.trim().to_string());
        if let Some(v) = &version {
            info!("{} server version {}", self.name(), v);
            if let Ok(mut slot) = self.version.write() {
                *slot = Some(v.clone());
            }
        }
        Ok(version)
    }

    /// Replace the connection string.
    ///
    /// Disposes every session and drops the cached server version and
    /// metadata. The backend type is kept unless the new string names a
    /// different `Provider`.
    pub async fn set_connection_string(&self, connection_string: &str) -> Result<()> {
        let current = self.config();
        let config =
            DbConfig::from_connection_string(&current.name, connection_string, Some(current.db_type))?;
        let backend_changed = config.db_type != current.db_type;
        {
            let mut state = match self.state.write() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            *state = Arc::new(DbState::new(config));
        }
        if backend_changed {
            if let Ok(mut slot) = self.factory.write() {
                *slot = None;
            }
        }
        if let Ok(mut slot) = self.version.write() {
            *slot = None;
        }
        self.dispose_sessions().await;
        self.dispose_metadata().await;
        Ok(())
    }

    /// The schema reader, built once and reused until disposed.
    pub async fn create_metadata(&self) -> Result<Arc<MetaData>> {
        let mut slot = self.metadata.lock().await;
        if let Some(metadata) = slot.as_ref() {
            if !metadata.session().is_disposed() && !metadata.session().is_errored() {
                return Ok(metadata.clone());
            }
        }
        let session = self.create_session(&SessionContext::new_chain()).await?;
        let metadata = Arc::new(MetaData::new(session));
        *slot = Some(metadata.clone());
        Ok(metadata)
    }

    pub async fn dispose_metadata(&self) {
        let metadata = self.metadata.lock().await.take();
        if let Some(metadata) = metadata {
            metadata.session().dispose().await;
        }
    }

    /// Synchronize the given tables according to the `Migration` option.
    pub async fn sync_tables(&self, tables: &[Table]) -> Result<SyncPlan> {
        let metadata = self.create_metadata().await?;
        let version = self.server_version(metadata.session()).await?;
        let sync = SchemaSync::new(self.dialect(), self.names(), self.config().migration)
            .with_version(version);
        sync.sync(&metadata, tables).await
    }

    /// Dispose every session and the metadata.
    pub async fn dispose(&self) {
        self.dispose_sessions().await;
        self.dispose_metadata().await;
    }

    async fn dispose_sessions(&self) {
        let mut sessions: Vec<Arc<Session>> = lock(&self.thread_sessions)
            .drain()
            .map(|(_, s)| s)
            .collect();
        sessions.extend(lock(&self.chain_sessions).drain().map(|(_, s)| s));
        for session in sessions {
            session.dispose().await;
        }
    }
}

impl DbState {
    fn new(config: DbConfig) -> Self {
        let dialect = dialect_for(config.db_type);
        Self {
            config: Arc::new(config),
            dialect,
            names: OnceLock::new(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self.config();
        f.debug_struct("Database")
            .field("name", &config.name)
            .field("db_type", &config.db_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Migration;
    use crate::core::schema::DataType;
    use crate::core::value::RowSet;
    use crate::error::DriverError;
    use crate::sync::TableState;
    use crate::testing::MockFactory;

    fn database(cs: &str, db_type: DbType) -> (Database, MockFactory) {
        let factory = MockFactory::new(db_type);
        let db = Database::new("shop", cs, Some(db_type))
            .unwrap()
            .with_factory(Arc::new(factory.clone()));
        (db, factory)
    }

    #[tokio::test]
    async fn test_session_slots() {
        let (db, _factory) = database("Data Source=shop.db", DbType::Sqlite);
        let thread = SessionContext::current_thread();
        let first = db.create_session(&thread).await.unwrap();
        let again = db.create_session(&thread).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let chain = SessionContext::new_chain();
        let chained = db.create_session(&chain).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &chained));
        assert_ne!(chain, SessionContext::new_chain());

        first.dispose().await;
        let replaced = db.create_session(&thread).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &replaced));
        assert!(!replaced.is_disposed());
    }

    #[tokio::test]
    async fn test_released_chains_close_connections() {
        let (db, factory) = database("Data Source=shop.db", DbType::Sqlite);
        let chains: Vec<SessionContext> = (0..3).map(|_| SessionContext::new_chain()).collect();
        for chain in &chains {
            let session = db.create_session(chain).await.unwrap();
            session.query("SELECT 1", &[]).await.unwrap();
        }
        assert_eq!(factory.connects(), 3);
        assert_eq!(lock(&db.chain_sessions).len(), 3);

        for chain in &chains {
            assert!(db.release_session(chain).await);
        }
        assert_eq!(factory.closes(), 3);
        assert!(lock(&db.chain_sessions).is_empty());
        assert!(!db.release_session(&chains[0]).await);
    }

    #[tokio::test]
    async fn test_disposed_chain_sessions_are_pruned() {
        let (db, _factory) = database("Data Source=shop.db", DbType::Sqlite);
        let first = db.create_session(&SessionContext::new_chain()).await.unwrap();
        first.dispose().await;
        db.create_session(&SessionContext::new_chain()).await.unwrap();
        assert_eq!(lock(&db.chain_sessions).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_connection_string_is_rejected() {
        let (db, _factory) = database("", DbType::Sqlite);
        let err = db.session().await.unwrap_err();
        assert!(matches!(err, DbError::Config(ref m) if m.contains("shop")));
    }

    #[tokio::test]
    async fn test_unresolved_driver_names_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new("shop", "Data Source=shop.db", Some(DbType::Sqlite))
            .unwrap()
            .with_resolver(Arc::new(DriverResolver::new(dir.path())));
        match db.open().await {
            Err(DbError::DriverNotFound { connection, backend }) => {
                assert_eq!(connection, "shop");
                assert_eq!(backend, "sqlite");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_formatting_applies_config() {
        let (db, _factory) = database(
            "Data Source=shop.db;TablePrefix=app_;NameFormat=Lower;UseParameter=true",
            DbType::Sqlite,
        );
        assert_eq!(db.format_table_name("Stock"), "app_stock");
        assert_eq!(db.format_name("Order"), "\"order\"");
        assert_eq!(db.format_parameter_name("p0"), "@p0");
        assert_eq!(db.string_concat("a", "b"), "a||b");
        assert_eq!(db.format_like("50%", "%{0}%"), "%50\\%%");
        let qty = Column::new("Qty", DataType::Int32);
        assert_eq!(db.format_value(&qty, &SqlValue::I32(7)).unwrap(), "7");
    }

    #[test]
    fn test_installed_reserved_words_take_effect() {
        let (db, _factory) = database("Data Source=shop.db", DbType::Sqlite);
        assert!(db.install_reserved_words(ReservedWords::from_list("stock")));
        assert_eq!(db.format_name("Stock"), "\"Stock\"");
        assert!(!db.install_reserved_words(ReservedWords::default()));
    }

    #[tokio::test]
    async fn test_paging_follows_cached_version() {
        let (db, factory) = database("Server=.;Database=shop", DbType::SqlServer);
        let sql = "SELECT * FROM Stock ORDER BY Id";
        assert!(db.paginate(sql, 10, 10, None).unwrap().contains("FETCH NEXT 10 ROWS ONLY"));

        factory.on_query(
            "SERVERPROPERTY",
            RowSet::new(vec!["v".into()]).with_row(vec![SqlValue::Text("10.50.1600".into())]),
        );
        let session = db.session().await.unwrap();
        assert_eq!(
            db.server_version(&session).await.unwrap().as_deref(),
            Some("10.50.1600")
        );
        assert!(db.paginate(sql, 10, 10, None).unwrap().contains("ROW_NUMBER()"));

        // Cached: no second query.
        db.server_version(&session).await.unwrap();
        assert_eq!(factory.log().len(), 1);
    }

    #[tokio::test]
    async fn test_set_connection_string_resets_state() {
        let (db, factory) = database("Server=.;Database=shop", DbType::SqlServer);
        factory.on_query(
            "SERVERPROPERTY",
            RowSet::new(vec!["v".into()]).with_row(vec![SqlValue::Text("8.00.2039".into())]),
        );
        let session = db.session().await.unwrap();
        db.server_version(&session).await.unwrap();
        let metadata = db.create_metadata().await.unwrap();
        assert!(Arc::ptr_eq(&metadata, &db.create_metadata().await.unwrap()));

        db.set_connection_string("Server=.;Database=other;TablePrefix=t_")
            .await
            .unwrap();
        assert!(session.is_disposed());
        assert!(metadata.session().is_disposed());
        assert_eq!(db.config().database_name.as_deref(), Some("other"));
        assert_eq!(db.format_table_name("Stock"), "t_Stock");
        assert!(db.paginate("SELECT * FROM Stock ORDER BY Id", 10, 10, None).unwrap().contains("FETCH NEXT"));
        assert!(!Arc::ptr_eq(&metadata, &db.create_metadata().await.unwrap()));
    }

    fn table(name: &str) -> Table {
        Table::new(name).with_column(Column::new("Id", DataType::Int32).primary_key())
    }

    #[tokio::test]
    async fn test_sync_isolates_failing_tables() {
        let (db, factory) = database("Data Source=shop.db;Migration=Full", DbType::Sqlite);
        factory.fail_on("sqlite_version", DriverError::new("no such function"));
        assert!(db.sync_tables(&[table("A")]).await.is_err());

        factory.fail_on("CREATE TABLE A", DriverError::new("disk full"));
        let plan = db.sync_tables(&[table("A"), table("B")]).await.unwrap();
        assert_eq!(plan.tables.len(), 2);
        assert!(plan.tables.iter().all(|t| t.state == TableState::Missing));
        assert_eq!(plan.errors.len(), 1);
        assert_eq!(plan.errors[0].0, "A");
        assert!(factory.log().iter().any(|sql| sql.starts_with("CREATE TABLE B")));
    }

    #[tokio::test]
    async fn test_sync_readonly_does_not_execute() {
        let (db, factory) = database("Data Source=shop.db;Migration=ReadOnly", DbType::Sqlite);
        let plan = db.sync_tables(&[table("A")]).await.unwrap();
        assert_eq!(plan.tables[0].state, TableState::Missing);
        assert!(!factory.log().iter().any(|sql| sql.starts_with("CREATE")));
        assert_eq!(db.config().migration, Migration::ReadOnly);
    }
}
