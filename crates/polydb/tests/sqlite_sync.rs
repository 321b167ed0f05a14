//! Schema synchronization against a real SQLite engine.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column as _, Connection as _, Row as _, SqliteConnection, ValueRef as _};

use polydb::{
    BatchRequest, Column, Connection, ConnectionFactory, ConnectionString, DataType, Database,
    DbType, DriverError, Index, Param, RowSet, SqlValue, Table, TableState,
};

struct SqlxFactory;

#[async_trait]
impl ConnectionFactory for SqlxFactory {
    fn db_type(&self) -> DbType {
        DbType::Sqlite
    }

    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>, DriverError> {
        let cs = ConnectionString::parse(connection_string);
        let path = cs
            .get("Data Source")
            .ok_or_else(|| DriverError::new("missing Data Source"))?;
        let conn = SqliteConnection::connect(&format!("sqlite://{}?mode=rwc", path))
            .await
            .map_err(driver_error)?;
        Ok(Box::new(SqlxConnection { conn }))
    }
}

struct SqlxConnection {
    conn: SqliteConnection,
}

fn driver_error(e: sqlx::Error) -> DriverError {
    DriverError::new(e.to_string())
}

fn bind<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &'q [Param],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for (_, value) in params {
        query = match value {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::F64(v) => query.bind(*v),
            other => query.bind(other.as_i64()),
        };
    }
    query
}

fn value(row: &SqliteRow, i: usize) -> SqlValue {
    match row.try_get_raw(i) {
        Ok(raw) if !raw.is_null() => {}
        _ => return SqlValue::Null,
    }
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return SqlValue::I64(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(i) {
        return SqlValue::F64(v);
    }
    if let Ok(v) = row.try_get::<String, _>(i) {
        return SqlValue::Text(v);
    }
    match row.try_get::<Vec<u8>, _>(i) {
        Ok(v) => SqlValue::Bytes(v),
        Err(_) => SqlValue::Null,
    }
}

#[async_trait]
impl Connection for SqlxConnection {
    async fn execute(&mut self, sql: &str, params: &[Param]) -> Result<u64, DriverError> {
        let result = bind(sqlx::query(sql), params)
            .execute(&mut self.conn)
            .await
            .map_err(driver_error)?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, sql: &str, params: &[Param]) -> Result<RowSet, DriverError> {
        let rows = bind(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await
            .map_err(driver_error)?;
        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let data = rows
            .iter()
            .map(|r| (0..r.len()).map(|i| value(r, i)).collect())
            .collect();
        Ok(RowSet {
            columns,
            rows: data,
        })
    }

    async fn begin(&mut self) -> Result<(), DriverError> {
        self.execute("BEGIN", &[]).await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }
}

fn database(dir: &tempfile::TempDir, migration: &str) -> Database {
    let path = dir.path().join("shop.db");
    let cs = format!(
        "Data Source={};Provider=sqlite;Migration={}",
        path.display(),
        migration
    );
    Database::new("shop", &cs, None)
        .unwrap()
        .with_factory(Arc::new(SqlxFactory))
}

fn stock() -> Table {
    Table::new("Stock")
        .with_column(Column::new("Id", DataType::Int32).identity().primary_key())
        .with_column(Column::new("Sku", DataType::String).length(20).not_null())
        .with_column(Column::new("Qty", DataType::Int32))
        .with_index(Index::new("IU_Stock_Sku", ["Sku"]).unique())
}

async fn seed(db: &Database) {
    let session = db.session().await.unwrap();
    let mut table = stock();
    table.fix();
    let request = BatchRequest::new(table, ["Sku", "Qty"])
        .row(vec!["apple".into(), 5.into()])
        .row(vec!["pear".into(), SqlValue::Null]);
    session.insert(&request).await.unwrap();
}

#[tokio::test]
async fn test_create_then_in_sync() {
    let dir = tempfile::tempdir().unwrap();
    let db = database(&dir, "Full");

    let plan = db.sync_tables(&[stock()]).await.unwrap();
    assert!(plan.errors.is_empty(), "{:?}", plan.errors);
    assert_eq!(plan.tables[0].state, TableState::Missing);

    let metadata = db.create_metadata().await.unwrap();
    assert!(metadata.table_exists("Stock").await.unwrap());

    let again = db.sync_tables(&[stock()]).await.unwrap();
    assert!(again.is_in_sync(), "{:?}", again);
}

#[tokio::test]
async fn test_rebuild_preserves_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = database(&dir, "Full");
    db.sync_tables(&[stock()]).await.unwrap();
    seed(&db).await;

    let mut changed = stock();
    changed.columns[1].length = 10;
    changed.columns[2].nullable = false;
    changed
        .columns
        .push(Column::new("Price", DataType::Decimal).precision(10, 2).not_null());

    let plan = db.sync_tables(&[changed.clone()]).await.unwrap();
    assert!(plan.errors.is_empty(), "{:?}", plan.errors);
    assert_eq!(plan.tables[0].state, TableState::RebuildRequired);

    let session = db.session().await.unwrap();
    let rows = session
        .query("SELECT Id, Sku, Qty, Price FROM Stock ORDER BY Id", &[])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    let values: Vec<(Option<String>, i64)> = rows
        .iter()
        .map(|r| (r.text("Sku"), r.int("Qty")))
        .collect();
    assert_eq!(
        values,
        vec![(Some("apple".to_string()), 5), (Some("pear".to_string()), 0)]
    );
    assert!(rows.iter().all(|r| r.int("Price") == 0));

    let old = session
        .query("SELECT name FROM sqlite_master WHERE name = 'Stock_old'", &[])
        .await
        .unwrap();
    assert!(old.is_empty());

    let again = db.sync_tables(&[changed]).await.unwrap();
    assert!(again.is_in_sync(), "{:?}", again);
}

#[tokio::test]
async fn test_additive_change_alters_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let db = database(&dir, "On");
    db.sync_tables(&[stock()]).await.unwrap();
    seed(&db).await;

    let mut changed = stock();
    changed.columns.push(Column::new("Note", DataType::String).length(50));
    changed.indexes.push(Index::new("IX_Stock_Qty", ["Qty"]));

    let plan = db.sync_tables(&[changed.clone()]).await.unwrap();
    assert_eq!(plan.tables[0].state, TableState::Alter);
    assert_eq!(plan.tables[0].statements.len(), 2);

    let metadata = db.create_metadata().await.unwrap();
    let live = metadata.get_tables(&["Stock".to_string()]).await.unwrap();
    assert!(live[0].column("Note").is_some());
    assert!(live[0].indexes.iter().any(|i| i.name == "IX_Stock_Qty"));

    assert!(db.sync_tables(&[changed]).await.unwrap().is_in_sync());
}

#[tokio::test]
async fn test_dropping_indexed_column_converges() {
    let dir = tempfile::tempdir().unwrap();
    let db = database(&dir, "Full");
    let indexed = stock().with_index(Index::new("IX_Stock_Qty", ["Qty"]));
    db.sync_tables(&[indexed]).await.unwrap();
    seed(&db).await;

    let mut trimmed = stock();
    trimmed.columns.retain(|c| c.name != "Qty");
    let plan = db.sync_tables(&[trimmed.clone()]).await.unwrap();
    assert!(plan.errors.is_empty(), "{:?}", plan.errors);
    assert_eq!(plan.tables[0].state, TableState::Alter);
    assert_eq!(
        plan.tables[0].statements,
        vec!["DROP INDEX IX_Stock_Qty", "ALTER TABLE Stock DROP COLUMN Qty"]
    );

    let metadata = db.create_metadata().await.unwrap();
    let live = metadata.get_tables(&[]).await.unwrap();
    assert!(live[0].column("Qty").is_none());
    assert!(live[0].indexes.iter().all(|i| i.name != "IX_Stock_Qty"));

    let again = db.sync_tables(&[trimmed]).await.unwrap();
    assert!(again.is_in_sync(), "{:?}", again);
}

#[tokio::test]
async fn test_migration_on_reports_destructive_changes() {
    let dir = tempfile::tempdir().unwrap();
    let db = database(&dir, "On");
    db.sync_tables(&[stock()]).await.unwrap();

    let mut narrowed = stock();
    narrowed.columns[2].data_type = DataType::String;
    let plan = db.sync_tables(&[narrowed]).await.unwrap();
    let table = &plan.tables[0];
    assert_eq!(table.state, TableState::RebuildRequired);
    assert!(table.statements.is_empty());
    assert!(!table.destructive.is_empty());

    let metadata = db.create_metadata().await.unwrap();
    let live = metadata.get_tables(&[]).await.unwrap();
    assert_eq!(live[0].column("Qty").map(|c| c.data_type), Some(DataType::Int32));
}

#[tokio::test]
async fn test_readonly_migration_never_executes() {
    let dir = tempfile::tempdir().unwrap();
    let db = database(&dir, "ReadOnly");
    let plan = db.sync_tables(&[stock()]).await.unwrap();
    assert_eq!(plan.tables[0].state, TableState::Missing);

    let metadata = db.create_metadata().await.unwrap();
    assert!(!metadata.table_exists("Stock").await.unwrap());
}

#[tokio::test]
async fn test_upsert_accumulates_on_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let db = database(&dir, "Full");
    db.sync_tables(&[stock()]).await.unwrap();
    seed(&db).await;

    let mut table = stock();
    table.fix();
    let request = BatchRequest::new(table, ["Sku", "Qty"])
        .row(vec!["apple".into(), 3.into()])
        .row(vec!["plum".into(), 1.into()])
        .accumulate(["Qty"]);
    let session = db.session().await.unwrap();
    session.upsert(&request).await.unwrap();

    let rows = session
        .query("SELECT Sku, Qty FROM Stock ORDER BY Sku", &[])
        .await
        .unwrap();
    let values: Vec<(Option<String>, i64)> =
        rows.iter().map(|r| (r.text("Sku"), r.int("Qty"))).collect();
    assert_eq!(
        values,
        vec![
            (Some("apple".to_string()), 8),
            (Some("pear".to_string()), 0),
            (Some("plum".to_string()), 1),
        ]
    );
}
