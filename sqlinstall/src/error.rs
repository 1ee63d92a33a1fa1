use crate::dialect::ScriptKind;
use std::path::PathBuf;

/// Error type for the sqlinstall crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration, script layout, or dialect profile document is unusable.
    /// Raised before anything touches the database.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The dialect profile has no template for the operation that was attempted.
    #[error("the dialect profile has no {0} script")]
    MissingScriptTemplate(ScriptKind),
    /// A single script file failed.
    #[error("error executing {}: {message}", path.display())]
    ScriptExecution { path: PathBuf, message: String },
    #[error("could not read the database version: {0}")]
    VersionQuery(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "sqlite")]
    #[error("{0}")]
    Rusqlite(rusqlite::Error),
    #[cfg(feature = "mysql")]
    #[error("{0}")]
    Mysql(String),
    #[cfg(feature = "postgres")]
    #[error("{0}")]
    Postgres(#[from] postgres::Error),
    #[error("{0}")]
    Generic(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Self::Rusqlite(value)
    }
}

#[cfg(feature = "mysql")]
impl From<mysql::Error> for Error {
    fn from(value: mysql::Error) -> Self {
        Self::Mysql(value.to_string())
    }
}

// Manual PartialEq implementation because io::Error and postgres::Error don't implement PartialEq
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Configuration(a), Self::Configuration(b)) => a == b,
            (Self::MissingScriptTemplate(a), Self::MissingScriptTemplate(b)) => a == b,
            (
                Self::ScriptExecution {
                    path: pa,
                    message: ma,
                },
                Self::ScriptExecution {
                    path: pb,
                    message: mb,
                },
            ) => pa == pb && ma == mb,
            (Self::VersionQuery(a), Self::VersionQuery(b)) => a == b,
            (Self::Io(a), Self::Io(b)) => a.kind() == b.kind() && a.to_string() == b.to_string(),
            #[cfg(feature = "sqlite")]
            (Self::Rusqlite(a), Self::Rusqlite(b)) => a == b,
            #[cfg(feature = "mysql")]
            (Self::Mysql(a), Self::Mysql(b)) => a == b,
            #[cfg(feature = "postgres")]
            (Self::Postgres(a), Self::Postgres(b)) => a.to_string() == b.to_string(),
            (Self::Generic(a), Self::Generic(b)) => a == b,
            _ => false,
        }
    }
}
