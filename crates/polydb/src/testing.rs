//! Scripted in-memory connection for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::DbType;
use crate::core::traits::{Connection, ConnectionFactory, Param};
use crate::core::value::RowSet;
use crate::error::DriverError;

#[derive(Default)]
pub struct MockState {
    /// Every statement seen, including BEGIN/COMMIT/ROLLBACK markers.
    pub log: Vec<String>,
    pub connects: usize,
    pub closes: usize,
    pub timeouts: Vec<u64>,
    /// Failures returned by the next execute/query calls, in order.
    pub failures: VecDeque<DriverError>,
    /// One-shot failures for the first statement containing the fragment.
    pub fail_on: Vec<(String, DriverError)>,
    /// Query results matched by substring of the SQL.
    pub results: Vec<(String, RowSet)>,
    /// `get_schema` collections by name.
    pub collections: Vec<(String, RowSet)>,
    pub schema_calls: Vec<(String, Vec<Option<String>>)>,
}

#[derive(Clone)]
pub struct MockFactory {
    pub db_type: DbType,
    pub state: Arc<Mutex<MockState>>,
}

impl MockFactory {
    pub fn new(db_type: DbType) -> Self {
        Self {
            db_type,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn fail_next(&self, error: DriverError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    pub fn fail_on(&self, fragment: &str, error: DriverError) {
        self.state
            .lock()
            .unwrap()
            .fail_on
            .push((fragment.to_string(), error));
    }

    pub fn on_query(&self, fragment: &str, rows: RowSet) {
        self.state
            .lock()
            .unwrap()
            .results
            .push((fragment.to_string(), rows));
    }

    pub fn collection(&self, name: &str, rows: RowSet) {
        self.state
            .lock()
            .unwrap()
            .collections
            .push((name.to_string(), rows));
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    fn db_type(&self) -> DbType {
        self.db_type
    }

    async fn connect(&self, _cs: &str) -> Result<Box<dyn Connection>, DriverError> {
        self.state.lock().unwrap().connects += 1;
        Ok(Box::new(MockConnection {
            state: self.state.clone(),
        }))
    }
}

pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn record(&self, sql: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(sql.to_string());
        if let Some(e) = state.failures.pop_front() {
            return Err(e);
        }
        match state.fail_on.iter().position(|(f, _)| sql.contains(f.as_str())) {
            Some(i) => Err(state.fail_on.remove(i).1),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&mut self, sql: &str, _params: &[Param]) -> Result<u64, DriverError> {
        self.record(sql)?;
        Ok(1)
    }

    async fn query(&mut self, sql: &str, _params: &[Param]) -> Result<RowSet, DriverError> {
        self.record(sql)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .results
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn begin(&mut self) -> Result<(), DriverError> {
        self.state.lock().unwrap().log.push("BEGIN".into());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.state.lock().unwrap().log.push("COMMIT".into());
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.state.lock().unwrap().log.push("ROLLBACK".into());
        Ok(())
    }

    async fn get_schema(
        &mut self,
        collection: &str,
        restrictions: &[Option<String>],
    ) -> Result<Option<RowSet>, DriverError> {
        let mut state = self.state.lock().unwrap();
        state
            .schema_calls
            .push((collection.to_string(), restrictions.to_vec()));
        Ok(state
            .collections
            .iter()
            .find(|(name, _)| name == collection)
            .map(|(_, rows)| rows.clone()))
    }

    fn set_command_timeout(&mut self, seconds: u64) {
        self.state.lock().unwrap().timeouts.push(seconds);
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}
