//! The driver seam: opening connections from a connection string and running SQL on them.
//!
//! Dialect clients never talk to a database library directly. They look up a [Connector] by the
//! profile's invariant identifier in a [Drivers] registry. The built-in drivers cover SQLite,
//! MySQL and PostgreSQL (each behind its cargo feature); any other engine can be plugged in by
//! registering a [Connector] under the identifier its dialect profile names.

use crate::error::Error;
use crate::splitter::split_batches;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// An open database connection. Dropping it closes the connection.
pub trait Connection {
    /// Execute SQL that returns no rows. May contain several statements if the driver allows it.
    fn execute(&mut self, sql: &str) -> Result<(), Error>;

    /// Execute a query and return the first column of the first row as text.
    /// `None` when there are no rows or the value is NULL.
    fn query_scalar(&mut self, sql: &str) -> Result<Option<String>, Error>;

    /// Make `database` the context for subsequent statements on this connection.
    fn change_database(&mut self, database: &str) -> Result<(), Error>;

    /// Execute a script through the server scripting layer, which runs each `GO` batch
    /// separately.
    fn execute_script(&mut self, script: &str) -> Result<(), Error> {
        for batch in split_batches(script) {
            self.execute(&batch)?;
        }
        Ok(())
    }
}

/// Opens [Connection]s for one driver.
pub trait Connector: Send + Sync {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>, Error>;
}

/// Registry of [Connector]s keyed by case-insensitive driver identifier.
#[derive(Clone, Default)]
pub struct Drivers {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl Drivers {
    /// A registry with no drivers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with every driver compiled into this build.
    pub fn builtin() -> Self {
        #[allow(unused_mut)]
        let mut drivers = Self::empty();
        #[cfg(feature = "sqlite")]
        {
            drivers = drivers.register("sqlite", crate::sqlite::SqliteConnector);
        }
        #[cfg(feature = "mysql")]
        {
            drivers = drivers.register("mysql", crate::mysql::MysqlConnector);
        }
        #[cfg(feature = "postgres")]
        {
            drivers = drivers.register("postgres", crate::postgres::PostgresConnector);
        }
        drivers
    }

    /// Register (or replace) the connector for `invariant`.
    pub fn register(mut self, invariant: &str, connector: impl Connector + 'static) -> Self {
        self.connectors
            .insert(invariant.to_lowercase(), Arc::new(connector));
        self
    }

    pub fn get(&self, invariant: &str) -> Result<Arc<dyn Connector>, Error> {
        self.connectors
            .get(&invariant.to_lowercase())
            .cloned()
            .ok_or_else(|| {
                Error::Configuration(format!("no driver is registered for '{invariant}'"))
            })
    }
}

impl fmt::Debug for Drivers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.connectors.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("Drivers").field("connectors", &names).finish()
    }
}

/// Read the value of the first of `keys` present in a `key=value;key=value` connection string.
/// Keys match case-insensitively.
pub fn connection_value(connection_string: &str, keys: &[&str]) -> Option<String> {
    let pairs = connection_pairs(connection_string);
    keys.iter().find_map(|key| {
        pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
    })
}

/// Set the first of `keys` present in the connection string to `value`, or append `keys[0]` if
/// none is present.
pub fn with_connection_value(connection_string: &str, keys: &[&str], value: &str) -> String {
    let mut pairs = connection_pairs(connection_string);
    match pairs
        .iter_mut()
        .find(|(k, _)| keys.iter().any(|key| k.eq_ignore_ascii_case(key)))
    {
        Some(pair) => pair.1 = value.to_string(),
        None => {
            if let Some(key) = keys.first() {
                pairs.push((key.to_string(), value.to_string()));
            }
        }
    }
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn connection_pairs(connection_string: &str) -> Vec<(String, String)> {
    connection_string
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
