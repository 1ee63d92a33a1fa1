//! Dialect clients: database-level operations expressed through a dialect profile.
//!
//! Every operation opens its own connection and closes it before returning. Most dialects run
//! their SQL unchanged through the driver ([ClientVariant::Generic]); a few need the connection
//! prepared differently or the script reshaped first, which the other variants cover.

use crate::dialect::{DialectProfile, ScriptKind};
use crate::driver::{with_connection_value, Connection, Connector};
use crate::error::Error;
use crate::splitter::split_statements;
use std::fmt;
use std::sync::Arc;

/// Connection string keys naming the initial catalog of a server scripting connection.
const CATALOG_KEYS: &[&str] = &["Initial Catalog", "Database"];

/// Database-level operations the installer needs from a dialect.
pub trait DatabaseClient {
    /// Whether the target database exists.
    fn check_exists(&self) -> Result<bool, Error>;

    /// The raw version record stored in the target database.
    ///
    /// A failing query means there is no usable record and yields `Ok(None)`. A profile
    /// without a `GetVersion` template is an error.
    fn get_version(&self) -> Result<Option<String>, Error>;

    fn set_version(&self, version: &str, details: &str) -> Result<(), Error>;

    fn create_database(&self) -> Result<(), Error>;

    fn drop_database(&self) -> Result<(), Error>;

    /// Run a script. With `change_database` the script runs inside the target database,
    /// otherwise against the server the connection string points at.
    fn execute(&self, script: &str, change_database: bool) -> Result<(), Error>;

    fn execute_scalar(&self, script: &str, change_database: bool)
        -> Result<Option<String>, Error>;
}

/// How a dialect client prepares connections and scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientVariant {
    /// Switch the connection's database when asked and run scripts as written.
    Generic,
    /// The database is a single file named by the connection string's `Data Source`. There is
    /// nothing to create and no database to switch to.
    FileBased,
    /// Set the connection's default schema with `<statement><DATABASE>` and run scripts one
    /// statement at a time, see [split_statements].
    SessionSchema { statement: &'static str },
    /// Run scripts through the server scripting layer, one `GO` batch at a time.
    ServerScripting { catalog: CatalogSwitch },
}

/// How a [ClientVariant::ServerScripting] client reaches the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSwitch {
    /// Switch databases on the open connection.
    ChangeDatabase,
    /// Connect with the connection string's initial catalog set to the target database.
    ConnectionString,
}

impl ClientVariant {
    /// The variant for a dialect name.
    pub fn for_dialect(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "sqlite" => ClientVariant::FileBased,
            "oracle" => ClientVariant::SessionSchema {
                statement: "ALTER SESSION SET CURRENT_SCHEMA=",
            },
            "db2" => ClientVariant::SessionSchema {
                statement: "SET SCHEMA ",
            },
            "teradata" => ClientVariant::SessionSchema {
                statement: "DATABASE ",
            },
            "sqlserver" => ClientVariant::ServerScripting {
                catalog: CatalogSwitch::ChangeDatabase,
            },
            "azure" => ClientVariant::ServerScripting {
                catalog: CatalogSwitch::ConnectionString,
            },
            _ => ClientVariant::Generic,
        }
    }
}

/// A [DatabaseClient] driven by a [DialectProfile] and a driver [Connector].
#[derive(Clone)]
pub struct DialectClient {
    variant: ClientVariant,
    profile: DialectProfile,
    connector: Arc<dyn Connector>,
    connection_string: String,
    database: String,
}

impl DialectClient {
    /// A client for `database`, with the variant chosen from the profile's dialect name.
    pub fn new(
        profile: DialectProfile,
        connector: Arc<dyn Connector>,
        connection_string: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            variant: ClientVariant::for_dialect(&profile.name),
            profile,
            connector,
            connection_string: connection_string.into(),
            database: database.into(),
        }
    }

    pub fn with_variant(mut self, variant: ClientVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn variant(&self) -> ClientVariant {
        self.variant
    }

    pub fn profile(&self) -> &DialectProfile {
        &self.profile
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Open a connection positioned for a script, per the variant.
    fn open(&self, change_database: bool) -> Result<Box<dyn Connection>, Error> {
        match self.variant {
            ClientVariant::Generic => {
                let mut conn = self.connector.connect(&self.connection_string)?;
                if change_database {
                    conn.change_database(&self.database)?;
                }
                Ok(conn)
            }
            ClientVariant::FileBased => self.connector.connect(&self.connection_string),
            ClientVariant::SessionSchema { statement } => {
                let mut conn = self.connector.connect(&self.connection_string)?;
                if change_database {
                    conn.execute(&format!("{statement}{}", self.database.to_uppercase()))?;
                }
                Ok(conn)
            }
            ClientVariant::ServerScripting { catalog } => match catalog {
                CatalogSwitch::ConnectionString if change_database => {
                    let cs = with_connection_value(
                        &self.connection_string,
                        CATALOG_KEYS,
                        &self.database,
                    );
                    self.connector.connect(&cs)
                }
                CatalogSwitch::ConnectionString => {
                    self.connector.connect(&self.connection_string)
                }
                CatalogSwitch::ChangeDatabase => {
                    let mut conn = self.connector.connect(&self.connection_string)?;
                    if change_database {
                        conn.change_database(&self.database)?;
                    }
                    Ok(conn)
                }
            },
        }
    }

    fn render(&self, kind: ScriptKind, args: &[&str]) -> Result<String, Error> {
        self.profile.render(kind, args)
    }

    /// The raw version record. Driver failures, such as a missing version table, come back as
    /// [Error::VersionQuery].
    fn read_version(&self) -> Result<Option<String>, Error> {
        let sql = self.render(ScriptKind::GetVersion, &[&self.database])?;
        self.execute_scalar(&sql, true)
            .map(|value| value.filter(|v| !v.trim().is_empty()))
            .map_err(|err| Error::VersionQuery(err.to_string()))
    }

    #[cfg(feature = "sqlite")]
    fn database_file(&self) -> Result<std::path::PathBuf, Error> {
        crate::sqlite::data_source(&self.connection_string)
    }

    #[cfg(not(feature = "sqlite"))]
    fn database_file(&self) -> Result<std::path::PathBuf, Error> {
        crate::driver::connection_value(&self.connection_string, &["Data Source", "Filename"])
            .map(std::path::PathBuf::from)
            .ok_or_else(|| {
                Error::Configuration("the connection string has no 'Data Source'".to_string())
            })
    }
}

impl DatabaseClient for DialectClient {
    fn check_exists(&self) -> Result<bool, Error> {
        if self.variant == ClientVariant::FileBased {
            return Ok(self.database_file()?.is_file());
        }
        let sql = self.render(ScriptKind::Exists, &[&self.database])?;
        match self.execute_scalar(&sql, false)? {
            None => Ok(false),
            Some(value) => parse_count(&value).map(|count| count > 0),
        }
    }

    fn get_version(&self) -> Result<Option<String>, Error> {
        match self.read_version() {
            Err(Error::VersionQuery(_message)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(database = %self.database, error = %_message, "No readable version record");
                Ok(None)
            }
            other => other,
        }
    }

    fn set_version(&self, version: &str, details: &str) -> Result<(), Error> {
        let sql = self.render(ScriptKind::SetVersion, &[&self.database, version, details])?;
        self.execute(&sql, true)
    }

    fn create_database(&self) -> Result<(), Error> {
        if self.variant == ClientVariant::FileBased {
            return Ok(());
        }
        let sql = self.render(ScriptKind::Create, &[&self.database])?;
        self.execute(&sql, false)
    }

    fn drop_database(&self) -> Result<(), Error> {
        if self.variant == ClientVariant::FileBased {
            let path = self.database_file()?;
            if path.is_file() {
                std::fs::remove_file(path)?;
            }
            return Ok(());
        }
        let sql = self.render(ScriptKind::Drop, &[&self.database])?;
        self.execute(&sql, false)
    }

    fn execute(&self, script: &str, change_database: bool) -> Result<(), Error> {
        let mut conn = self.open(change_database)?;
        match self.variant {
            ClientVariant::Generic | ClientVariant::FileBased => conn.execute(script),
            ClientVariant::SessionSchema { .. } => {
                for statement in split_statements(script) {
                    conn.execute(&statement)?;
                }
                Ok(())
            }
            ClientVariant::ServerScripting { .. } => conn.execute_script(script),
        }
    }

    fn execute_scalar(
        &self,
        script: &str,
        change_database: bool,
    ) -> Result<Option<String>, Error> {
        self.open(change_database)?.query_scalar(script)
    }
}

impl fmt::Debug for DialectClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectClient")
            .field("variant", &self.variant)
            .field("dialect", &self.profile.name)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Existence checks return a row count, sometimes as a decimal or boolean.
fn parse_count(value: &str) -> Result<i64, Error> {
    let value = value.trim();
    if let Ok(count) = value.parse::<i64>() {
        return Ok(count);
    }
    if let Ok(count) = value.parse::<f64>() {
        return Ok(count as i64);
    }
    match value.to_lowercase().as_str() {
        "true" | "t" => Ok(1),
        "false" | "f" => Ok(0),
        _ => Err(Error::Generic(format!(
            "existence check returned '{value}', expected a count"
        ))),
    }
}
