//! The install/upgrade engine.
//!
//! An [Installer] holds a configuration. [Installer::prepare] validates it, looks at the target
//! database and the script folders, and returns a [PreparedInstall] describing what a run would
//! do. [PreparedInstall::run] then applies the scripts, or [PreparedInstall::spawn] does so on a
//! worker thread while the caller polls [ProgressEvent]s.
//!
//! Scripts live under the configured script root:
//!
//! ```text
//! <root>/Install/<any depth>/*.<Category>.sql          applied on a clean install
//! <root>/Upgrade/<version>/<any depth>/*.<Category>.sql applied per outstanding version
//! ```

use crate::client::{DatabaseClient, DialectClient};
use crate::config::{FileCategory, MigrationConfig, Options, ResolvedConfig};
use crate::core::{
    is_current, is_outstanding, resolve_target_version, RunResult, VersionLabel, VersionRecord,
};
use crate::dialect::ProfileDocument;
use crate::driver::Drivers;
use crate::error::Error;
use crate::natural::sort_paths;
use crate::progress::{ProgressEvent, ProgressKind, ProgressQueue};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Builds a [PreparedInstall] from a [MigrationConfig].
///
/// # Example
///
/// ```no_run
/// use sqlinstall::{Installer, MigrationConfig};
///
/// let config: MigrationConfig = serde_json::from_str(r#"{
///     "database": "app",
///     "connection_string": "Data Source=app.db",
///     "dialect": { "name": "sqlite" },
///     "script_root": "db"
/// }"#)?;
///
/// let prepared = Installer::new(config).prepare()?;
/// if !prepared.is_current() {
///     let result = prepared.run();
///     println!("{} scripts run, {} errors", result.scripts_run, result.errors);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Installer {
    config: MigrationConfig,
    drivers: Drivers,
    profiles: Option<ProfileDocument>,
}

impl Installer {
    /// An installer using the built-in drivers and the default profile document.
    pub fn new(config: MigrationConfig) -> Self {
        Self {
            config,
            drivers: Drivers::builtin(),
            profiles: None,
        }
    }

    pub fn with_drivers(mut self, drivers: Drivers) -> Self {
        self.drivers = drivers;
        self
    }

    /// Use `profiles` instead of loading the document beside the executable.
    pub fn with_profiles(mut self, profiles: ProfileDocument) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Validate the configuration and work out what a run would do.
    ///
    /// Only reads from the database: its existence and, for an upgrade, its version record.
    pub fn prepare(self) -> Result<PreparedInstall, Error> {
        validate(&self.config)?;
        let config = self.config.resolve();

        let profiles = match self.profiles {
            Some(profiles) => profiles,
            None => ProfileDocument::load_default()?,
        };
        let profile = profiles.profile(&config.dialect)?;
        let connector = self.drivers.get(&profile.invariant)?;

        // Reserved directory names are a configuration error, caught before touching the server.
        let versions = upgrade_versions(&config.upgrade_dir)?;
        let target = resolve_target_version(&versions)?;

        let client = DialectClient::new(
            profile,
            connector,
            config.connection_string.clone(),
            config.database.clone(),
        );

        #[cfg(feature = "tracing")]
        tracing::debug!(client = ?client, "Checking whether the database exists");

        let exists = client.check_exists()?;
        let clean_install = !exists || config.options.drop;

        let mut current = VersionLabel::rtm();
        let mut upgraded_by = None;
        if exists && !clean_install {
            let record = client.get_version()?.and_then(|raw| VersionRecord::parse(&raw));
            if let Some(record) = record {
                current = record.version;
                upgraded_by = Some(record.details);
            }
        }

        let mut scripts_total = 0;
        for version in &versions {
            if is_outstanding(&current, version, config.options.retry) {
                scripts_total +=
                    count_scripts(&config.upgrade_dir.join(version.as_str()), &config)?;
            }
        }
        if clean_install && config.install_dir.is_dir() {
            scripts_total = count_scripts(&config.install_dir, &config)?;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            database = %config.database,
            exists,
            clean_install,
            current_version = %current,
            target_version = %target,
            scripts_total,
            "Prepared install"
        );

        Ok(PreparedInstall {
            config,
            client,
            exists,
            clean_install,
            current,
            upgraded_by,
            target,
            scripts_total,
            progress: Arc::new(ProgressQueue::new()),
        })
    }
}

fn validate(config: &MigrationConfig) -> Result<(), Error> {
    let missing = |what: &str| Error::Configuration(format!("no {what} is configured"));
    if config.dialect.name.trim().is_empty() {
        return Err(missing("dialect"));
    }
    if config.connection_string.trim().is_empty() {
        return Err(missing("connection string"));
    }
    if config.database.trim().is_empty() {
        return Err(missing("database name"));
    }
    if config.script_root.as_os_str().is_empty() {
        return Err(missing("script directory"));
    }
    if !config.script_root.is_dir() {
        return Err(Error::Configuration(format!(
            "script directory '{}' does not exist",
            config.script_root.display()
        )));
    }
    Ok(())
}

/// An install that has been checked against the database and is ready to run.
#[derive(Debug)]
pub struct PreparedInstall {
    config: ResolvedConfig,
    client: DialectClient,
    exists: bool,
    clean_install: bool,
    current: VersionLabel,
    upgraded_by: Option<String>,
    target: VersionLabel,
    scripts_total: usize,
    progress: Arc<ProgressQueue>,
}

impl PreparedInstall {
    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// Whether the database existed when prepared.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Whether the run starts from an empty database: it is absent or will be dropped.
    pub fn clean_install(&self) -> bool {
        self.clean_install
    }

    /// Whether the recorded version already covers the highest upgrade directory.
    pub fn is_current(&self) -> bool {
        !self.clean_install && is_current(&self.current, &self.target)
    }

    /// The recorded version, or [RTM](crate::RTM) when none was read.
    pub fn current_version(&self) -> &VersionLabel {
        &self.current
    }

    /// Who recorded the current version, and when.
    pub fn upgraded_by(&self) -> Option<&str> {
        self.upgraded_by.as_deref()
    }

    pub fn target_version(&self) -> &VersionLabel {
        &self.target
    }

    /// Scripts a run will attempt.
    pub fn scripts_total(&self) -> usize {
        self.scripts_total
    }

    pub fn options(&self) -> Options {
        self.config.options
    }

    /// The queue this install reports progress on.
    pub fn progress(&self) -> Arc<ProgressQueue> {
        self.progress.clone()
    }

    /// Replace the progress queue, e.g. with one using a shorter poll timeout.
    pub fn with_progress(mut self, progress: ProgressQueue) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    /// Apply the scripts. Never fails: every error is counted in the result and reported as
    /// progress, and the last event pushed is always [ProgressKind::Exit].
    pub fn run(self) -> RunResult {
        let mut run = Run {
            current: self.current.clone(),
            target: self.target.clone(),
            scripts_total: self.scripts_total,
            exists: self.exists,
            clean_install: self.clean_install,
            config: &self.config,
            client: &self.client,
            progress: &self.progress,
            errors: 0,
            scripts_run: 0,
            recorded: None,
        };

        if let Err(abort) = run.apply() {
            let error = match abort {
                Abort::Halted(error) => error,
                Abort::Failed(error) => {
                    run.errors += 1;
                    run.emit(ProgressKind::Detail, format!("Error: {error}"));
                    error
                }
            };
            #[cfg(feature = "tracing")]
            tracing::error!(error = %error, "Install aborted");
            #[cfg(not(feature = "tracing"))]
            let _ = error;
            run.emit(ProgressKind::Complete, "Aborted");
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            errors = run.errors,
            scripts_run = run.scripts_run,
            scripts_total = run.scripts_total,
            "Install finished"
        );
        run.progress.push(ProgressEvent::exit(
            run.errors,
            format!("{} of {} scripts run", run.scripts_run, run.scripts_total),
        ));

        RunResult {
            errors: run.errors,
            scripts_run: run.scripts_run,
            scripts_total: run.scripts_total,
            current_version: run.current,
            target_version: run.target,
            recorded: run.recorded,
        }
    }

    /// [run](Self::run) on a worker thread.
    pub fn spawn(self) -> InstallHandle {
        let progress = self.progress();
        let worker = thread::spawn(move || self.run());
        InstallHandle { progress, worker }
    }
}

/// A run in progress on a worker thread.
#[derive(Debug)]
pub struct InstallHandle {
    progress: Arc<ProgressQueue>,
    worker: JoinHandle<RunResult>,
}

impl InstallHandle {
    /// The next progress event. See [ProgressQueue::poll].
    pub fn poll(&self) -> ProgressEvent {
        self.progress.poll(!self.worker.is_finished())
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the run to finish.
    pub fn join(self) -> Result<RunResult, Error> {
        self.worker
            .join()
            .map_err(|_| Error::Generic("the install worker panicked".to_string()))
    }
}

/// Why a run stopped early.
enum Abort {
    /// A halt-on-error category failed. The script's error is already counted.
    Halted(Error),
    Failed(Error),
}

impl From<Error> for Abort {
    fn from(value: Error) -> Self {
        Abort::Failed(value)
    }
}

struct Run<'a> {
    current: VersionLabel,
    target: VersionLabel,
    scripts_total: usize,
    exists: bool,
    clean_install: bool,
    config: &'a ResolvedConfig,
    client: &'a DialectClient,
    progress: &'a ProgressQueue,
    errors: usize,
    scripts_run: usize,
    recorded: Option<VersionRecord>,
}

impl Run<'_> {
    fn apply(&mut self) -> Result<(), Abort> {
        let options = self.config.options;
        let database = self.config.database.clone();

        if self.clean_install && self.exists {
            #[cfg(feature = "tracing")]
            tracing::info!(database = %database, "Dropping database");
            self.emit(ProgressKind::Start, format!("Dropping database {database}"));
            self.client.drop_database()?;
            self.exists = false;
            if options.verbose {
                self.progress.push(ProgressEvent::progress(50));
            }
            self.emit(ProgressKind::Complete, "Done");
        }

        if self.clean_install && (options.create || options.drop) {
            #[cfg(feature = "tracing")]
            tracing::info!(database = %database, "Creating database");
            self.emit(ProgressKind::Start, format!("Creating database {database}"));
            self.client.create_database()?;
            if options.verbose {
                self.progress.push(ProgressEvent::progress(100));
            }
            self.emit(ProgressKind::Complete, "Done");
        }

        if self.clean_install && self.config.install_dir.is_dir() {
            self.emit(ProgressKind::Start, format!("Installing database {database}"));
            let install_dir = self.config.install_dir.clone();
            self.apply_categories(&install_dir)?;
            self.emit(ProgressKind::Complete, "Done");
            if self.scripts_run == 0 {
                self.warn("no scripts found");
            }
            let target = self.target.clone();
            self.record_version(&target)?;
        } else if self.config.upgrade_dir.is_dir() {
            if self.clean_install {
                self.emit(ProgressKind::Start, format!("Installing database {database}"));
            }
            let mut versions = upgrade_versions(&self.config.upgrade_dir)?;
            versions.sort();
            if versions.is_empty() {
                self.warn("no upgrade versions found");
            } else if self.scripts_total == 0 {
                self.warn("no new scripts");
            }

            for version in versions {
                if !is_outstanding(&self.current, &version, options.retry) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(version = %version, "Skipping version (already applied)");
                    continue;
                }
                #[cfg(feature = "tracing")]
                let _span = tracing::info_span!("upgrade", version = %version).entered();

                self.emit(ProgressKind::Start, format!("Upgrading database to {version}"));
                self.apply_categories(&self.config.upgrade_dir.join(version.as_str()))?;
                self.emit(ProgressKind::Complete, "Done");
                self.record_version(&version)?;
            }
        } else {
            self.warn("upgrade directory not found");
        }
        Ok(())
    }

    fn apply_categories(&mut self, dir: &Path) -> Result<(), Abort> {
        let config = self.config;
        for category in &config.file_categories {
            if category.disabled {
                continue;
            }
            if let Some(description) = category.description.as_deref() {
                self.emit(ProgressKind::Detail, description);
            }
            for path in find_scripts(dir, category, &config.script_extension)? {
                self.apply_script(&path, category)?;
            }
        }
        Ok(())
    }

    fn apply_script(&mut self, path: &Path, category: &FileCategory) -> Result<(), Abort> {
        let verbose = self.config.options.verbose;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if verbose {
            self.emit(ProgressKind::Detail, format!("Executing {file_name}"));
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), category = %category.name, "Executing script");

        let outcome = fs::read_to_string(path)
            .map_err(Error::from)
            .and_then(|script| self.client.execute(&script, !category.is_global));

        let failure = outcome.err().map(|error| {
            self.errors += 1;
            let error = Error::ScriptExecution {
                path: path.to_path_buf(),
                message: error.to_string(),
            };
            #[cfg(feature = "tracing")]
            tracing::error!(error = %error, "Script failed");
            self.emit(ProgressKind::Detail, format!("Error: {error}"));
            error
        });

        self.scripts_run += 1;
        if verbose && self.scripts_total > 0 {
            let percent = (self.scripts_run * 100 + self.scripts_total / 2) / self.scripts_total;
            self.progress.push(ProgressEvent::progress(percent.min(100)));
        }

        match failure {
            Some(error) if category.halt_on_error => Err(Abort::Halted(error)),
            _ => Ok(()),
        }
    }

    fn record_version(&mut self, version: &VersionLabel) -> Result<(), Error> {
        let details = details_stamp();
        self.client.set_version(version.as_str(), &details)?;
        #[cfg(feature = "tracing")]
        tracing::info!(version = %version, details = %details, "Recorded version");
        self.recorded = Some(VersionRecord {
            version: version.clone(),
            details,
        });
        Ok(())
    }

    fn warn(&self, message: &str) {
        #[cfg(feature = "tracing")]
        tracing::warn!(database = %self.config.database, "{message}");
        self.emit(ProgressKind::Detail, format!("Warning: {message}"));
        self.emit(ProgressKind::Complete, "");
    }

    fn emit(&self, kind: ProgressKind, message: impl Into<String>) {
        self.progress.push(ProgressEvent::new(kind, message));
    }
}

/// Labels of the immediate subdirectories of the upgrade directory, unsorted. A missing upgrade
/// directory has no versions.
fn upgrade_versions(upgrade_dir: &Path) -> Result<Vec<VersionLabel>, Error> {
    if !upgrade_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut versions = Vec::new();
    for entry in fs::read_dir(upgrade_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            versions.push(VersionLabel::new(
                entry.file_name().to_string_lossy().into_owned(),
            ));
        }
    }
    Ok(versions)
}

/// Files under `dir`, at any depth, belonging to `category`, in natural order of their paths.
fn find_scripts(dir: &Path, category: &FileCategory, extension: &str) -> Result<Vec<PathBuf>, Error> {
    let mut scripts = Vec::new();
    collect_scripts(dir, category, extension, &mut scripts)?;
    sort_paths(&mut scripts);
    Ok(scripts)
}

fn collect_scripts(
    dir: &Path,
    category: &FileCategory,
    extension: &str,
    scripts: &mut Vec<PathBuf>,
) -> Result<(), Error> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_scripts(&path, category, extension, scripts)?;
        } else if category.matches(&entry.file_name().to_string_lossy(), extension) {
            scripts.push(path);
        }
    }
    Ok(())
}

/// Scripts a run would attempt from `dir` across all enabled categories.
fn count_scripts(dir: &Path, config: &ResolvedConfig) -> Result<usize, Error> {
    let mut total = 0;
    for category in config.file_categories.iter().filter(|c| !c.disabled) {
        total += find_scripts(dir, category, &config.script_extension)?.len();
    }
    Ok(total)
}

/// `<user>/<timestamp>` for the version record.
fn details_stamp() -> String {
    let identity = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    let identity = identity.replace('\\', "/").replace(';', ",");
    format!("{identity}/{}", Local::now().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DialectSelection;
    use crate::testing::RecordingConnector;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn config(root: &TempDir, dialect: &str, connection_string: String) -> MigrationConfig {
        MigrationConfig {
            database: "app".into(),
            connection_string,
            dialect: DialectSelection::named(dialect),
            script_root: root.path().to_path_buf(),
            ..Default::default()
        }
    }

    fn sqlite_config(root: &TempDir) -> MigrationConfig {
        let db = root.path().join("app.db");
        config(root, "sqlite", format!("Data Source={}", db.display()))
    }

    fn drain(progress: &ProgressQueue) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while !progress.is_empty() {
            events.push(progress.poll(false));
        }
        events
    }

    fn prepare(config: MigrationConfig) -> PreparedInstall {
        Installer::new(config)
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap()
    }

    #[cfg(feature = "sqlite")]
    fn query(root: &TempDir, sql: &str) -> Option<String> {
        use crate::driver::Connector;
        let cs = format!("Data Source={}", root.path().join("app.db").display());
        crate::sqlite::SqliteConnector
            .connect(&cs)
            .unwrap()
            .query_scalar(sql)
            .unwrap()
    }

    #[test]
    fn missing_settings_are_configuration_errors() {
        let root = tempfile::tempdir().unwrap();
        let base = sqlite_config(&root);

        let mut no_dialect = base.clone();
        no_dialect.dialect = DialectSelection::default();
        let mut no_database = base.clone();
        no_database.database = " ".into();
        let mut no_connection = base.clone();
        no_connection.connection_string = String::new();
        let mut no_root = base.clone();
        no_root.script_root = root.path().join("missing");

        for config in [no_dialect, no_database, no_connection, no_root] {
            let err = Installer::new(config).prepare().unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{err:?}");
        }
    }

    #[test]
    fn unknown_dialect_or_driver_is_a_configuration_error() {
        let root = tempfile::tempdir().unwrap();
        let unknown = config(&root, "informix", "x".into());
        assert!(matches!(
            Installer::new(unknown).with_profiles(ProfileDocument::builtin()).prepare(),
            Err(Error::Configuration(_))
        ));

        let no_driver = config(&root, "oracle", "x".into());
        let err = Installer::new(no_driver)
            .with_drivers(Drivers::empty())
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap_err();
        assert_eq!(
            err,
            Error::Configuration("no driver is registered for 'oracle'".into())
        );
    }

    #[test]
    fn reserved_upgrade_directory_is_rejected_before_connecting() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/rtm/001.Table.sql", "SELECT 1;");
        let recorder = RecordingConnector::new();
        let err = Installer::new(config(&root, "postgres", "host=db".into()))
            .with_drivers(Drivers::empty().register("postgres", recorder.clone()))
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(recorder.connections(), 0);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn clean_install_runs_install_scripts_and_records_the_target() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Install/tables/002.Table.sql", "CREATE TABLE b (id INTEGER);");
        write(root.path(), "Install/tables/010.Table.sql", "CREATE TABLE c (id INTEGER REFERENCES b(id));");
        write(root.path(), "Install/001.View.sql", "CREATE VIEW v AS SELECT id FROM b;");
        write(root.path(), "Install/notes.txt", "ignored");
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE never (id INTEGER);");
        write(root.path(), "Upgrade/v10/001.Table.sql", "CREATE TABLE never (id INTEGER);");
        write(root.path(), "Upgrade/v2/001.Table.sql", "CREATE TABLE never (id INTEGER);");

        let prepared = prepare(sqlite_config(&root));
        assert!(!prepared.exists());
        assert!(prepared.clean_install());
        assert!(!prepared.is_current());
        assert_eq!(prepared.target_version().as_str(), "v10");
        assert_eq!(prepared.scripts_total(), 3);

        let progress = prepared.progress();
        let result = prepared.run();
        assert_eq!(result.errors, 0);
        assert_eq!(result.scripts_run, 3);
        assert_eq!(result.recorded.as_ref().unwrap().version.as_str(), "v10");

        let events = drain(&progress);
        let messages = events.iter().map(|e| e.message.as_str()).collect::<Vec<_>>();
        let executing = messages
            .iter()
            .filter(|m| m.starts_with("Executing"))
            .copied()
            .collect::<Vec<_>>();
        assert_eq!(
            executing,
            vec!["Executing 002.Table.sql", "Executing 010.Table.sql", "Executing 001.View.sql"]
        );
        assert!(messages.contains(&"Installing database app"));
        let last = events.last().unwrap();
        assert_eq!(last.errors(), Some(0));

        let version = query(&root, "SELECT version FROM _sqlinstall_version_");
        assert_eq!(version.as_deref(), Some("v10"));
        assert_eq!(query(&root, "SELECT COUNT(*) FROM sqlite_master WHERE name = 'never'").as_deref(), Some("0"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn upgrades_apply_outstanding_versions_in_natural_order() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE log (step TEXT);");
        write(root.path(), "Upgrade/v2/001.PostInstall.sql", "INSERT INTO log VALUES ('v2');");
        write(root.path(), "Upgrade/v10/001.PostInstall.sql", "INSERT INTO log VALUES ('v10');");

        let prepared = prepare(sqlite_config(&root));
        assert!(prepared.clean_install());
        assert_eq!(prepared.scripts_total(), 3);
        let result = prepared.run();
        assert_eq!(result.errors, 0);
        assert_eq!(result.scripts_run, 3);
        assert_eq!(
            query(&root, "SELECT group_concat(step, ',') FROM log").as_deref(),
            Some("v2,v10")
        );

        write(root.path(), "Upgrade/v11/001.PostInstall.sql", "INSERT INTO log VALUES ('v11');");
        let prepared = prepare(sqlite_config(&root));
        assert!(prepared.exists());
        assert!(!prepared.clean_install());
        assert_eq!(prepared.current_version().as_str(), "v10");
        assert!(prepared.upgraded_by().is_some());
        assert!(!prepared.is_current());
        assert_eq!(prepared.scripts_total(), 1);

        let result = prepared.run();
        assert_eq!(result.scripts_run, 1);
        assert_eq!(result.current_version.as_str(), "v10");
        assert_eq!(result.recorded.unwrap().version.as_str(), "v11");
        assert_eq!(
            query(&root, "SELECT group_concat(step, ',') FROM log").as_deref(),
            Some("v2,v10,v11")
        );
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn second_run_against_a_current_database_does_nothing() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE t (id INTEGER);");
        write(root.path(), "Upgrade/v2/001.Table.sql", "CREATE TABLE u (id INTEGER);");
        assert_eq!(prepare(sqlite_config(&root)).run().errors, 0);

        let prepared = prepare(sqlite_config(&root));
        assert!(prepared.is_current());
        assert_eq!(prepared.scripts_total(), 0);
        let progress = prepared.progress();
        let result = prepared.run();
        assert_eq!(result.scripts_run, 0);
        assert_eq!(result.errors, 0);
        assert!(result.recorded.is_none());

        let events = drain(&progress);
        assert!(events.iter().all(|e| e.kind != ProgressKind::Progress));
        assert!(events.iter().any(|e| e.message == "Warning: no new scripts"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn retry_reapplies_the_recorded_version() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE IF NOT EXISTS log (step TEXT);");
        write(root.path(), "Upgrade/v2/001.PostInstall.sql", "INSERT INTO log VALUES ('v2');");
        prepare(sqlite_config(&root)).run();

        let mut config = sqlite_config(&root);
        config.options.retry = true;
        let prepared = prepare(config);
        assert_eq!(prepared.scripts_total(), 1);
        assert_eq!(prepared.run().scripts_run, 1);
        assert_eq!(
            query(&root, "SELECT COUNT(*) FROM log").as_deref(),
            Some("2")
        );
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn drop_forces_a_clean_install() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE t (id INTEGER);");
        prepare(sqlite_config(&root)).run();

        let mut config = sqlite_config(&root);
        config.options.drop = true;
        let prepared = prepare(config);
        assert!(prepared.exists());
        assert!(prepared.clean_install());
        assert!(!prepared.is_current());
        assert_eq!(prepared.current_version().as_str(), "RTM");

        let progress = prepared.progress();
        let result = prepared.run();
        assert_eq!(result.errors, 0);
        assert_eq!(result.scripts_run, 1);
        let events = drain(&progress);
        assert_eq!(events[0].message, "Dropping database app");
        assert!(events.contains(&ProgressEvent::progress(50)));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn failing_scripts_are_counted_and_skipped() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE t (id INTEGER);");
        write(root.path(), "Upgrade/v1/002.Table.sql", "CREATE TABL broken;");
        write(root.path(), "Upgrade/v1/003.Table.sql", "CREATE TABLE u (id INTEGER);");

        let prepared = prepare(sqlite_config(&root));
        let progress = prepared.progress();
        let result = prepared.run();
        assert_eq!(result.errors, 1);
        assert_eq!(result.scripts_run, 3);
        assert_eq!(result.recorded.unwrap().version.as_str(), "v1");
        assert_eq!(
            query(&root, "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('t', 'u')").as_deref(),
            Some("2")
        );

        let events = drain(&progress);
        assert!(events
            .iter()
            .any(|e| e.kind == ProgressKind::Detail && e.message.contains("002.Table.sql")));
        assert_eq!(events.last().unwrap().errors(), Some(1));
    }

    #[test]
    fn halt_on_error_stops_the_run_without_recording() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/001.PreInstall.sql", "SELECT fail_here;");
        write(root.path(), "Upgrade/v1/002.PreInstall.sql", "SELECT second;");
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE t (id INT);");

        let recorder = RecordingConnector::new()
            .respond("pg_database", "1")
            .respond_empty("_sqlinstall_version_")
            .fail_on("fail_here");
        let prepared = Installer::new(config(&root, "postgres", "host=db".into()))
            .with_drivers(Drivers::empty().register("postgres", recorder.clone()))
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap();
        assert!(!prepared.clean_install());
        let progress = prepared.progress();
        let result = prepared.run();

        assert_eq!(result.errors, 1);
        assert_eq!(result.scripts_run, 1);
        assert!(result.recorded.is_none());
        assert!(!recorder.executed_containing("second"));
        assert!(!recorder.executed_containing("CREATE TABLE"));
        assert!(!recorder.executed_containing("INSERT INTO _sqlinstall_version_"));

        let exit = drain(&progress).pop().unwrap();
        assert_eq!(exit.errors(), Some(1));
    }

    #[test]
    fn categories_run_in_declared_order_with_scope() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/a.Login.sql", "CREATE LOGIN x;");
        write(root.path(), "Upgrade/v1/b.Table.sql", "CREATE TABLE t (id INT);");
        write(root.path(), "Upgrade/v1/c.Skipped.sql", "SELECT skipped;");

        let recorder = RecordingConnector::new().respond("pg_database", "1");
        let mut config = config(&root, "postgres", "host=db".into());
        config.file_categories = vec![
            FileCategory::new("Table").with_description("Creating tables"),
            FileCategory::new("Login").global(),
            FileCategory::new("Skipped").disabled(),
        ];
        let prepared = Installer::new(config)
            .with_drivers(Drivers::empty().register("postgres", recorder.clone()))
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap();
        assert_eq!(prepared.scripts_total(), 2);
        let progress = prepared.progress();
        recorder.clear();
        let result = prepared.run();
        assert_eq!(result.errors, 0);

        use crate::testing::Recorded;
        let log = recorder.log();
        let table = log
            .iter()
            .position(|r| *r == Recorded::Execute("CREATE TABLE t (id INT);".into()))
            .unwrap();
        let login = log
            .iter()
            .position(|r| *r == Recorded::Execute("CREATE LOGIN x;".into()))
            .unwrap();
        assert!(table < login);
        assert_eq!(log[table - 1], Recorded::ChangeDatabase("app".into()));
        assert!(matches!(log[login - 1], Recorded::Connect(_)));
        assert!(!recorder.executed_containing("skipped"));

        let events = drain(&progress);
        assert!(events.iter().any(|e| e.message == "Creating tables"));
    }

    #[test]
    fn missing_upgrade_directory_is_a_warning() {
        let root = tempfile::tempdir().unwrap();
        let recorder = RecordingConnector::new()
            .respond("pg_database", "1")
            .respond("_sqlinstall_version_", "v1;me/now");
        let prepared = Installer::new(config(&root, "postgres", "host=db".into()))
            .with_drivers(Drivers::empty().register("postgres", recorder))
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap();
        assert!(prepared.is_current());
        assert_eq!(prepared.upgraded_by(), Some("me/now"));

        let progress = prepared.progress();
        let result = prepared.run();
        assert_eq!(result.errors, 0);
        let events = drain(&progress);
        assert!(events
            .iter()
            .any(|e| e.message == "Warning: upgrade directory not found"));
    }

    #[test]
    fn empty_upgrade_directory_is_a_warning() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("Upgrade")).unwrap();
        let recorder = RecordingConnector::new()
            .respond("pg_database", "1")
            .respond("_sqlinstall_version_", "v1;me/now");
        let prepared = Installer::new(config(&root, "postgres", "host=db".into()))
            .with_drivers(Drivers::empty().register("postgres", recorder))
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap();
        assert!(prepared.target_version().is_rtm());

        let progress = prepared.progress();
        let result = prepared.run();
        assert_eq!(result.errors, 0);
        assert_eq!(result.scripts_run, 0);
        assert!(result.recorded.is_none());
        let events = drain(&progress);
        assert!(events
            .iter()
            .any(|e| e.message == "Warning: no upgrade versions found"));
    }

    #[test]
    fn install_directory_without_scripts_is_a_warning() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Install/notes.txt", "not a script");
        let recorder = RecordingConnector::new();
        let prepared = Installer::new(config(&root, "postgres", "host=db".into()))
            .with_drivers(Drivers::empty().register("postgres", recorder.clone()))
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap();
        assert!(prepared.clean_install());
        assert_eq!(prepared.scripts_total(), 0);

        let progress = prepared.progress();
        let result = prepared.run();
        assert_eq!(result.errors, 0);
        assert_eq!(result.scripts_run, 0);
        assert!(!recorder.executed_containing("not a script"));
        let events = drain(&progress);
        assert!(events
            .iter()
            .any(|e| e.message == "Warning: no scripts found"));
        assert!(events
            .iter()
            .all(|e| e.message != "Warning: no upgrade versions found"));
    }

    #[test]
    fn database_failures_abort_the_run_with_one_error() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE t (id INT);");
        let recorder = RecordingConnector::new().fail_on("CREATE DATABASE");
        let prepared = Installer::new(config(&root, "postgres", "host=db".into()))
            .with_drivers(Drivers::empty().register("postgres", recorder.clone()))
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap();
        assert!(prepared.clean_install());

        let progress = prepared.progress();
        let result = prepared.run();
        assert_eq!(result.errors, 1);
        assert_eq!(result.scripts_run, 0);
        assert!(!recorder.executed_containing("CREATE TABLE"));

        let events = drain(&progress);
        assert!(events
            .iter()
            .any(|e| e.kind == ProgressKind::Detail && e.message.starts_with("Error:")));
        assert_eq!(events.last().unwrap().kind, ProgressKind::Exit);
    }

    #[test]
    fn quiet_runs_report_no_percentages() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE t (id INT);");
        let recorder = RecordingConnector::new();
        let mut config = config(&root, "postgres", "host=db".into());
        config.options = Options {
            verbose: false,
            ..Options::default()
        };
        let prepared = Installer::new(config)
            .with_drivers(Drivers::empty().register("postgres", recorder))
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap();
        let progress = prepared.progress();
        prepared.run();
        let events = drain(&progress);
        assert!(events.iter().all(|e| e.kind != ProgressKind::Progress));
        assert!(events.iter().all(|e| !e.message.starts_with("Executing")));
    }

    #[test]
    fn spawned_runs_deliver_events_until_exit() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE t (id INT);");
        write(root.path(), "Upgrade/v2/001.Table.sql", "CREATE TABLE u (id INT);");
        let recorder = RecordingConnector::new();
        let handle = Installer::new(config(&root, "postgres", "host=db".into()))
            .with_drivers(Drivers::empty().register("postgres", recorder))
            .with_profiles(ProfileDocument::builtin())
            .prepare()
            .unwrap()
            .with_progress(ProgressQueue::with_timeout(Duration::from_secs(5)))
            .spawn();

        let mut kinds = Vec::new();
        loop {
            let event = handle.poll();
            kinds.push(event.kind);
            if event.kind == ProgressKind::Exit {
                break;
            }
        }
        let result = handle.join().unwrap();
        assert_eq!(result.errors, 0);
        assert_eq!(result.scripts_run, 2);
        assert_eq!(result.recorded.unwrap().version.as_str(), "v2");
        assert!(kinds.contains(&ProgressKind::Start));
        assert!(kinds.contains(&ProgressKind::Progress));
        assert_eq!(kinds.iter().filter(|k| **k == ProgressKind::Exit).count(), 1);
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn installs_and_upgrades_a_postgres_database() {
        use crate::test_postgres::{database_exists, fresh_database_name, get_test_connection_string};

        let root = tempfile::tempdir().unwrap();
        write(root.path(), "Upgrade/v1/001.Table.sql", "CREATE TABLE t (id INT);");
        write(root.path(), "Upgrade/v2/001.Table.sql", "CREATE TABLE u (id INT);");
        let name = fresh_database_name();
        let mut config = config(&root, "postgres", get_test_connection_string());
        config.database = name.clone();

        let result = prepare(config.clone()).run();
        assert_eq!(result.errors, 0);
        assert_eq!(result.scripts_run, 2);
        assert!(database_exists(&name));

        let prepared = prepare(config);
        assert!(prepared.is_current());
        assert_eq!(prepared.current_version().as_str(), "v2");
        assert_eq!(prepared.scripts_total(), 0);
    }

    #[test]
    fn details_name_the_user_and_time() {
        let details = details_stamp();
        let (identity, timestamp) = details.rsplit_once('/').unwrap();
        assert!(!identity.is_empty());
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert!(!details.contains(';'));
    }
}
