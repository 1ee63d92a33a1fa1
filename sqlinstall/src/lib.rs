#![cfg_attr(docsrs, feature(doc_cfg))]
//! `sqlinstall` installs and upgrades SQL databases from folders of plain SQL scripts.
//!
//! A script root holds two folders:
//!
//! ```text
//! db/
//! ├── Install/                     full schema, used when the database is created from scratch
//! │   ├── 001.Table.sql
//! │   └── 001.View.sql
//! └── Upgrade/
//!     ├── v1/001.Table.sql         one folder per version, applied in natural order
//!     ├── v2/001.StoredProcedure.sql
//!     └── v10/001.Table.sql
//! ```
//!
//! Scripts are grouped into file categories by their `.<Category>.sql` suffix, and categories
//! run in a fixed order within each folder. The database records the last applied version, so
//! running again applies only the newer folders.
//!
//! # Concepts
//!
//! - **Version labels** are folder names, ordered naturally (`v2` before `v10`). [RTM] is
//!   reserved and means "nothing applied yet".
//! - **Dialects** describe how to check, create, drop, and version a database on one engine.
//!   Their SQL lives in a JSON profile document; see [dialect].
//! - **Drivers** execute SQL against a connection string; see [driver].
//! - **Progress** is reported as [ProgressEvent]s through a [ProgressQueue], so a caller can
//!   run the install on a worker thread and display progress from its own.
//!
//! # Example
//!
//! ```no_run
//! use sqlinstall::{Installer, MigrationConfig, ProgressKind};
//!
//! let config: MigrationConfig = serde_json::from_str(r#"{
//!     "database": "app",
//!     "connection_string": "Data Source=app.db",
//!     "dialect": { "name": "sqlite" },
//!     "script_root": "db"
//! }"#)?;
//!
//! let handle = Installer::new(config).prepare()?.spawn();
//! loop {
//!     let event = handle.poll();
//!     println!("{:?} {}", event.kind, event.message);
//!     if event.kind == ProgressKind::Exit {
//!         break;
//!     }
//! }
//! let result = handle.join()?;
//! assert!(result.succeeded());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Feature flags
//!
//! - `sqlite` (default): [`SQLite`](sqlite) driver.
//! - `mysql`: [`MySQL`](mysql) driver.
//! - `postgres`: [`PostgreSQL`](postgres) driver.
//! - `tracing` (default): log state transitions with the `tracing` crate.
//! - `testing`: the [RecordingConnector](testing::RecordingConnector) fake driver.

mod core;
pub use core::{
    is_current, is_outstanding, outstanding, resolve_target_version, RunResult, VersionLabel,
    VersionRecord, RTM,
};

mod error;
pub use error::Error;

mod natural;
pub use natural::{natural_compare, sort_paths};

mod config;
pub use config::{
    default_file_categories, DialectSelection, FileCategory, MigrationConfig, Options,
    DEFAULT_INSTALL_PATH, DEFAULT_SCRIPT_EXTENSION, DEFAULT_UPGRADE_PATH,
};

pub mod dialect;
pub use dialect::{DialectProfile, ProfileDocument, ScriptKind};

pub mod splitter;

pub mod driver;

pub mod client;
pub use client::{ClientVariant, DatabaseClient, DialectClient};

mod progress;
pub use progress::{ProgressEvent, ProgressKind, ProgressQueue, DEFAULT_POLL_TIMEOUT};

mod installer;
pub use installer::{InstallHandle, Installer, PreparedInstall};

#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;

#[cfg(feature = "mysql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mysql")))]
pub mod mysql;

#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

#[cfg(all(test, feature = "mysql"))]
pub(crate) mod test_mysql;

#[cfg(all(test, feature = "postgres"))]
pub(crate) mod test_postgres;
