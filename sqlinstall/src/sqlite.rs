//! SQLite driver, using the [`rusqlite`](https://crates.io/crates/rusqlite) crate.
//!
//! The connection string is either an ADO-style `Data Source=<path>` string or a bare file path.
//! SQLite has no server and no catalogs, so [change_database](Connection::change_database) does
//! nothing; the file-based dialect client never asks for it anyway.

use crate::driver::{connection_value, Connection, Connector};
use crate::error::Error;
use rusqlite::types::Value;
use rusqlite::OptionalExtension;
use std::path::PathBuf;

/// Connection string keys that name the database file.
pub(crate) const DATA_SOURCE_KEYS: &[&str] = &["Data Source", "DataSource", "Filename"];

/// Opens SQLite database files.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>, Error> {
        let path = data_source(connection_string)?;
        #[cfg(feature = "tracing")]
        tracing::trace!(path = %path.display(), "Opening sqlite database");
        Ok(Box::new(SqliteConnection {
            conn: rusqlite::Connection::open(path)?,
        }))
    }
}

/// The database file named by a connection string.
pub(crate) fn data_source(connection_string: &str) -> Result<PathBuf, Error> {
    if !connection_string.contains('=') && !connection_string.trim().is_empty() {
        return Ok(PathBuf::from(connection_string.trim()));
    }
    connection_value(connection_string, DATA_SOURCE_KEYS)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            Error::Configuration("the connection string has no 'Data Source'".to_string())
        })
}

struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn query_scalar(&mut self, sql: &str) -> Result<Option<String>, Error> {
        let value = self
            .conn
            .query_row(sql, [], |row| row.get::<_, Value>(0))
            .optional()?;
        Ok(match value {
            None | Some(Value::Null) => None,
            Some(Value::Integer(i)) => Some(i.to_string()),
            Some(Value::Real(r)) => Some(r.to_string()),
            Some(Value::Text(text)) => Some(text),
            Some(Value::Blob(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        })
    }

    fn change_database(&mut self, _database: &str) -> Result<(), Error> {
        Ok(())
    }
}
