//! Sessions: one live connection plus its transaction.
//!
//! A [`Session`] connects lazily on first use and runs statements in
//! submission order behind an async mutex. Transient driver failures are
//! retried up to `RetryOnFailure` times, never inside a transaction.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::batch::{BatchBuilder, BatchRequest, BatchStatement};
use crate::config::DbConfig;
use crate::core::identifier::NameRules;
use crate::core::traits::{Connection, ConnectionFactory, Dialect, Param};
use crate::core::value::{RowSet, SqlValue};
use crate::error::{DbError, DriverError, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct SessionState {
    connection: Option<Box<dyn Connection>>,
    in_transaction: bool,
}

#[derive(Clone, Copy)]
enum Command<'a> {
    Execute(&'a str, &'a [Param]),
    Query(&'a str, &'a [Param]),
}

enum Outcome {
    Affected(u64),
    Rows(RowSet),
}

/// A connection-scoped unit of work.
pub struct Session {
    id: u64,
    config: Arc<DbConfig>,
    dialect: Arc<dyn Dialect>,
    names: Arc<NameRules>,
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<SessionState>,
    span: Span,
    disposed: AtomicBool,
    errored: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        config: Arc<DbConfig>,
        dialect: Arc<dyn Dialect>,
        names: Arc<NameRules>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("session", connection = %config.name, id);
        Self {
            id,
            config,
            dialect,
            names,
            factory,
            state: Mutex::new(SessionState::default()),
            span,
            disposed: AtomicBool::new(false),
            errored: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub(crate) fn config_arc(&self) -> &Arc<DbConfig> {
        &self.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn names(&self) -> &NameRules {
        &self.names
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Whether the connection broke and the session must be replaced.
    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::Acquire)
    }

    /// Whether a transaction is open.
    pub async fn in_transaction(&self) -> bool {
        self.state.lock().await.in_transaction
    }

    /// Execute a statement, returning the affected row count.
    pub async fn execute(&self, sql: &str, params: &[Param]) -> Result<u64> {
        if self.config.readonly {
            return Err(DbError::Config(format!(
                "Connection {} is read-only",
                self.config.name
            )));
        }
        match self.run(Command::Execute(sql, params)).await? {
            Outcome::Affected(n) => Ok(n),
            Outcome::Rows(rows) => Ok(rows.len() as u64),
        }
    }

    /// Run a query and collect its rows.
    pub async fn query(&self, sql: &str, params: &[Param]) -> Result<RowSet> {
        match self.run(Command::Query(sql, params)).await? {
            Outcome::Rows(rows) => Ok(rows),
            Outcome::Affected(_) => Ok(RowSet::default()),
        }
    }

    /// First column of the first row.
    pub async fn query_scalar(&self, sql: &str, params: &[Param]) -> Result<Option<SqlValue>> {
        let rows = self.query(sql, params).await?;
        Ok(rows.rows.into_iter().next().and_then(|r| r.into_iter().next()))
    }

    /// Execute every statement in order, returning the total affected rows.
    pub async fn execute_batch(&self, statements: &[BatchStatement]) -> Result<u64> {
        let mut total = 0;
        for statement in statements {
            total += self.execute(&statement.sql, &statement.params).await?;
        }
        Ok(total)
    }

    /// Insert rows with multi-row INSERT statements.
    pub async fn insert(&self, request: &BatchRequest) -> Result<u64> {
        let statements = self.batch_builder().insert(request)?;
        self.execute_batch(&statements).await
    }

    /// Insert rows, updating (or accumulating into) rows that already exist.
    pub async fn upsert(&self, request: &BatchRequest) -> Result<u64> {
        let statements = self.batch_builder().upsert(request)?;
        self.execute_batch(&statements).await
    }

    /// Batch builder configured from this connection.
    pub fn batch_builder(&self) -> BatchBuilder<'_> {
        BatchBuilder::new(self.dialect.as_ref(), &self.names)
            .batch_size(self.config.batch_size)
            .parameterized(self.config.use_parameter)
    }

    /// Generic metadata collection from the driver, if it provides one.
    pub async fn get_schema(
        &self,
        collection: &str,
        restrictions: &[Option<String>],
    ) -> Result<Option<RowSet>> {
        let mut state = self.state.lock().await;
        let conn = self.connection(&mut state).await?;
        conn.get_schema(collection, restrictions)
            .instrument(self.span.clone())
            .await
            .map_err(|e| self.driver_error(collection, 0, e))
    }

    pub async fn begin(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.in_transaction {
            return Err(DbError::Unsupported(
                "nested transactions are not supported".to_string(),
            ));
        }
        let conn = self.connection(&mut state).await?;
        if let Err(e) = conn.begin().instrument(self.span.clone()).await {
            self.errored.store(true, Ordering::Release);
            return Err(self.driver_error("BEGIN", 0, e));
        }
        state.in_transaction = true;
        debug!(parent: &self.span, "Transaction started");
        Ok(())
    }

    pub async fn commit(&self) -> Result<()> {
        self.finish(true).await
    }

    /// Roll back the open transaction. Without one this does nothing.
    pub async fn rollback(&self) -> Result<()> {
        self.finish(false).await
    }

    /// Close the connection. Open transactions are rolled back.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock().await;
        if let Some(mut conn) = state.connection.take() {
            if state.in_transaction {
                warn!(parent: &self.span, "Rolling back open transaction on dispose");
                if let Err(e) = conn.rollback().await {
                    warn!(parent: &self.span, "Rollback failed: {}", e);
                }
            }
            if let Err(e) = conn.close().await {
                debug!(parent: &self.span, "Close failed: {}", e);
            }
        }
        state.in_transaction = false;
    }

    async fn finish(&self, commit: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.in_transaction {
            debug!(parent: &self.span, "No transaction to {}", if commit { "commit" } else { "roll back" });
            return Ok(());
        }
        state.in_transaction = false;
        let conn = self.connection(&mut state).await?;
        let (verb, result) = if commit {
            ("COMMIT", conn.commit().instrument(self.span.clone()).await)
        } else {
            ("ROLLBACK", conn.rollback().instrument(self.span.clone()).await)
        };
        result.map_err(|e| {
            self.errored.store(true, Ordering::Release);
            self.driver_error(verb, 0, e)
        })
    }

    async fn connection<'s>(
        &self,
        state: &'s mut SessionState,
    ) -> Result<&'s mut Box<dyn Connection>> {
        if self.is_disposed() {
            return Err(DbError::Config(format!(
                "Session {} of connection {} is disposed",
                self.id, self.config.name
            )));
        }
        if state.connection.is_none() {
            let conn = self
                .factory
                .connect(&self.config.driver_connection_string())
                .instrument(self.span.clone())
                .await
                .map_err(|e| {
                    self.errored.store(true, Ordering::Release);
                    self.driver_error("<connect>", 0, e)
                })?;
            debug!(parent: &self.span, "Connected");
            state.connection = Some(conn);
        }
        let conn = state
            .connection
            .as_mut()
            .ok_or_else(|| DbError::Config("connection unavailable".to_string()))?;
        conn.set_command_timeout(self.config.command_timeout);
        Ok(conn)
    }

    async fn run(&self, command: Command<'_>) -> Result<Outcome> {
        let (sql, params) = match command {
            Command::Execute(sql, params) | Command::Query(sql, params) => (sql, params),
        };
        if self.config.show_sql {
            info!(parent: &self.span, "{}", sql);
        } else {
            debug!(parent: &self.span, "{}", sql);
        }

        let mut state = self.state.lock().await;
        let retries = if state.in_transaction {
            0
        } else {
            self.config.retry_on_failure
        };

        let mut attempt = 0;
        loop {
            let conn = self.connection(&mut state).await?;
            let result = match command {
                Command::Execute(..) => conn
                    .execute(sql, params)
                    .instrument(self.span.clone())
                    .await
                    .map(Outcome::Affected),
                Command::Query(..) => conn
                    .query(sql, params)
                    .instrument(self.span.clone())
                    .await
                    .map(Outcome::Rows),
            };
            match result {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.transient && attempt < retries => {
                    attempt += 1;
                    warn!(
                        parent: &self.span,
                        "Transient failure ({}), retry {}/{}",
                        e.message, attempt, retries
                    );
                }
                Err(e) => {
                    // Outside a transaction the connection state is unknown;
                    // the slot hands out a fresh session next time.
                    if !state.in_transaction {
                        self.errored.store(true, Ordering::Release);
                    }
                    return Err(self.driver_error(sql, params.len(), e));
                }
            }
        }
    }

    fn driver_error(&self, sql: &str, params: usize, source: DriverError) -> DbError {
        DbError::driver(
            self.config.name.clone(),
            sql,
            params,
            self.config.max_sql_length,
            source,
        )
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connection", &self.config.name)
            .field("disposed", &self.is_disposed())
            .field("errored", &self.is_errored())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbType;
    use crate::core::schema::{Column, DataType, Table};
    use crate::drivers::dialect_for;
    use crate::testing::MockFactory;

    fn session(options: &str) -> (Session, MockFactory) {
        let cs = format!("Data Source=app.db;{}", options);
        let config = DbConfig::from_connection_string("app", &cs, Some(DbType::Sqlite)).unwrap();
        let dialect = dialect_for(DbType::Sqlite);
        let names = Arc::new(NameRules::new(dialect.quote_style()));
        let factory = MockFactory::new(DbType::Sqlite);
        let session = Session::new(Arc::new(config), dialect, names, Arc::new(factory.clone()));
        (session, factory)
    }

    #[tokio::test]
    async fn test_connects_lazily_once() {
        let (session, factory) = session("CommandTimeout=30");
        assert_eq!(factory.connects(), 0);
        session.execute("DELETE FROM a", &[]).await.unwrap();
        session.query("SELECT 1", &[]).await.unwrap();
        assert_eq!(factory.connects(), 1);
        assert_eq!(factory.log(), vec!["DELETE FROM a", "SELECT 1"]);
        assert!(factory.state.lock().unwrap().timeouts.iter().all(|t| *t == 30));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (session, factory) = session("RetryOnFailure=2");
        factory.fail_next(DriverError::transient("deadlock"));
        factory.fail_next(DriverError::transient("deadlock"));
        assert_eq!(session.execute("UPDATE a SET x = 1", &[]).await.unwrap(), 1);
        assert_eq!(factory.log().len(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let (session, factory) = session("RetryOnFailure=1");
        factory.fail_next(DriverError::transient("timeout"));
        factory.fail_next(DriverError::transient("timeout"));
        let err = session.execute("UPDATE a SET x = 1", &[]).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(factory.log().len(), 2);
        assert!(session.is_errored());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let (session, factory) = session("RetryOnFailure=3");
        factory.fail_next(DriverError::new("syntax error").with_code(1));
        let err = session.execute("UPDATE", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::Driver { ref connection, .. } if connection == "app"));
        assert_eq!(factory.log().len(), 1);
        assert!(session.is_errored());
    }

    #[tokio::test]
    async fn test_failure_inside_transaction_keeps_session() {
        let (session, factory) = session("");
        session.begin().await.unwrap();
        factory.fail_next(DriverError::new("constraint violation"));
        assert!(session.execute("INSERT INTO a VALUES (1)", &[]).await.is_err());
        assert!(!session.is_errored());
        session.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_retry_inside_transaction() {
        let (session, factory) = session("RetryOnFailure=3");
        session.begin().await.unwrap();
        assert!(session.in_transaction().await);
        factory.fail_next(DriverError::transient("deadlock"));
        assert!(session.execute("UPDATE a SET x = 1", &[]).await.is_err());
        session.rollback().await.unwrap();
        assert_eq!(factory.log(), vec!["BEGIN", "UPDATE a SET x = 1", "ROLLBACK"]);
        assert!(!session.in_transaction().await);
    }

    #[tokio::test]
    async fn test_nested_begin_is_rejected() {
        let (session, _factory) = session("");
        session.begin().await.unwrap();
        assert!(matches!(session.begin().await, Err(DbError::Unsupported(_))));
        session.commit().await.unwrap();
        // Commit without a transaction is a no-op.
        session.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_readonly_rejects_execute() {
        let (session, factory) = session("Readonly=true");
        assert!(matches!(
            session.execute("DELETE FROM a", &[]).await,
            Err(DbError::Config(_))
        ));
        session.query("SELECT 1", &[]).await.unwrap();
        assert_eq!(factory.log(), vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn test_dispose_rolls_back_and_closes() {
        let (session, factory) = session("");
        session.begin().await.unwrap();
        session.dispose().await;
        assert!(session.is_disposed());
        assert_eq!(factory.log(), vec!["BEGIN", "ROLLBACK"]);
        assert!(session.query("SELECT 1", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_query_scalar_and_insert() {
        let (session, factory) = session("");
        factory.on_query(
            "COUNT",
            RowSet::new(vec!["n".into()]).with_row(vec![SqlValue::I64(3)]),
        );
        assert_eq!(
            session.query_scalar("SELECT COUNT(*) FROM a", &[]).await.unwrap(),
            Some(SqlValue::I64(3))
        );

        let mut table = Table::new("Stock")
            .with_column(Column::new("Id", DataType::Int32).primary_key());
        table.fix();
        let request = BatchRequest::new(table, ["Id"]).rows((1..=3).map(|i| vec![i.into()]));
        assert_eq!(session.insert(&request).await.unwrap(), 1);
        assert_eq!(
            factory.log().last().map(String::as_str),
            Some("INSERT INTO Stock (Id) VALUES (1),(2),(3)")
        );
    }
}
