//! Testing utilities for dialect and installer development.
//!
//! [RecordingConnector] is a [Connector] that records everything sent to it instead of talking
//! to a database. Register it under a dialect's driver identifier to see exactly which SQL an
//! install runs, in which order, and on which database:
//!
//! ```
//! use sqlinstall::driver::{Connector, Drivers};
//! use sqlinstall::testing::{Recorded, RecordingConnector};
//!
//! let recorder = RecordingConnector::new().respond("COUNT(*)", "1");
//! let drivers = Drivers::empty().register("oracle", recorder.clone());
//!
//! let mut conn = drivers.get("oracle").unwrap().connect("Data Source=xe").unwrap();
//! assert_eq!(conn.query_scalar("SELECT COUNT(*) FROM dual").unwrap(), Some("1".into()));
//! assert_eq!(
//!     recorder.log(),
//!     vec![
//!         Recorded::Connect("Data Source=xe".into()),
//!         Recorded::Query("SELECT COUNT(*) FROM dual".into()),
//!     ]
//! );
//! ```

use crate::driver::{Connection, Connector};
use crate::error::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One call observed by a [RecordingConnector].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    /// A connection was opened with this connection string.
    Connect(String),
    ChangeDatabase(String),
    Execute(String),
    Query(String),
}

#[derive(Debug, Default)]
struct Recorder {
    log: Vec<Recorded>,
    fail_on: Vec<String>,
    responses: Vec<(String, Option<String>)>,
}

/// A [Connector] whose connections record SQL instead of running it.
///
/// Clones share the same log, so keep one clone for assertions and register another.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    inner: Arc<Mutex<Recorder>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any statement or query containing `fragment`.
    pub fn fail_on(self, fragment: impl Into<String>) -> Self {
        self.lock().fail_on.push(fragment.into());
        self
    }

    /// Answer queries containing `fragment` with `value`. The first matching response wins.
    pub fn respond(self, fragment: impl Into<String>, value: impl Into<String>) -> Self {
        self.lock()
            .responses
            .push((fragment.into(), Some(value.into())));
        self
    }

    /// Answer queries containing `fragment` with no rows.
    pub fn respond_empty(self, fragment: impl Into<String>) -> Self {
        self.lock().responses.push((fragment.into(), None));
        self
    }

    /// Everything recorded so far, in call order.
    pub fn log(&self) -> Vec<Recorded> {
        self.lock().log.clone()
    }

    /// The SQL passed to [Connection::execute], in call order.
    pub fn executed(&self) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter_map(|entry| match entry {
                Recorded::Execute(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether any executed statement contains `fragment`.
    pub fn executed_containing(&self, fragment: &str) -> bool {
        self.executed().iter().any(|sql| sql.contains(fragment))
    }

    pub fn connections(&self) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|entry| matches!(entry, Recorded::Connect(_)))
            .count()
    }

    pub fn clear(&self) {
        self.lock().log.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for RecordingConnector {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>, Error> {
        self.lock()
            .log
            .push(Recorded::Connect(connection_string.to_string()));
        Ok(Box::new(RecordingConnection {
            recorder: self.clone(),
        }))
    }
}

struct RecordingConnection {
    recorder: RecordingConnector,
}

impl RecordingConnection {
    fn record(&self, entry: Recorded, sql: &str) -> Result<(), Error> {
        let mut recorder = self.recorder.lock();
        recorder.log.push(entry);
        match recorder.fail_on.iter().find(|f| sql.contains(f.as_str())) {
            Some(fragment) => Err(Error::Generic(format!("simulated failure on '{fragment}'"))),
            None => Ok(()),
        }
    }
}

impl Connection for RecordingConnection {
    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.record(Recorded::Execute(sql.to_string()), sql)
    }

    fn query_scalar(&mut self, sql: &str) -> Result<Option<String>, Error> {
        self.record(Recorded::Query(sql.to_string()), sql)?;
        Ok(self
            .recorder
            .lock()
            .responses
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .and_then(|(_, value)| value.clone()))
    }

    fn change_database(&mut self, database: &str) -> Result<(), Error> {
        self.record(Recorded::ChangeDatabase(database.to_string()), "")
    }
}
