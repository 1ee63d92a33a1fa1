//! PostgreSQL driver, using the [`postgres`](https://crates.io/crates/postgres) crate.
//!
//! The connection string is anything [`postgres::Config`] parses: a `postgres://` URL or
//! `host=... user=... dbname=...` pairs. PostgreSQL cannot switch databases on a live
//! connection, so [change_database](Connection::change_database) reconnects with the same
//! settings and a different `dbname`.

use crate::driver::{Connection, Connector};
use crate::error::Error;
use postgres::{Client, Config, NoTls, SimpleQueryMessage};

/// Opens PostgreSQL connections without TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

impl Connector for PostgresConnector {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>, Error> {
        let config = connection_string.parse::<Config>()?;
        let client = config.connect(NoTls)?;
        Ok(Box::new(PostgresConnection { config, client }))
    }
}

struct PostgresConnection {
    config: Config,
    client: Client,
}

impl Connection for PostgresConnection {
    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.client.batch_execute(sql)?;
        Ok(())
    }

    fn query_scalar(&mut self, sql: &str) -> Result<Option<String>, Error> {
        for message in self.client.simple_query(sql)? {
            if let SimpleQueryMessage::Row(row) = message {
                return Ok(row.get(0).map(str::to_string));
            }
        }
        Ok(None)
    }

    fn change_database(&mut self, database: &str) -> Result<(), Error> {
        if self.config.get_dbname() == Some(database) {
            return Ok(());
        }
        let mut config = self.config.clone();
        config.dbname(database);
        self.client = config.connect(NoTls)?;
        self.config = config;
        Ok(())
    }
}
