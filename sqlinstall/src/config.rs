//! Install configuration.
//!
//! A [MigrationConfig] is built by the caller (usually by deserializing a JSON document) and
//! handed to an [Installer](crate::Installer). The installer never changes it; defaults for
//! unset fields are resolved into a separate copy during prepare.

use crate::dialect::ScriptKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_INSTALL_PATH: &str = "Install";
pub const DEFAULT_UPGRADE_PATH: &str = "Upgrade";
pub const DEFAULT_SCRIPT_EXTENSION: &str = ".sql";

/// Everything needed to install or upgrade one database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct MigrationConfig {
    /// Name of the target database.
    pub database: String,
    /// Plaintext connection string for the dialect's driver.
    pub connection_string: String,
    pub dialect: DialectSelection,
    /// Directory holding the install and upgrade folders.
    pub script_root: PathBuf,
    /// Defaults to `Install`.
    pub install_path: Option<String>,
    /// Defaults to `Upgrade`.
    pub upgrade_path: Option<String>,
    /// Defaults to `.sql`. A missing leading dot is added.
    pub script_extension: Option<String>,
    /// Applied in this order within every version folder. Defaults to [default_file_categories].
    pub file_categories: Vec<FileCategory>,
    pub options: Options,
}

/// Which dialect to use, plus optional overrides of its profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DialectSelection {
    pub name: String,
    /// Replaces the profile's driver identifier.
    pub invariant: Option<String>,
    /// Replaces individual script templates.
    pub scripts: BTreeMap<ScriptKind, String>,
}

impl DialectSelection {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A named group of scripts, matched by the `*.<name>.<ext>` file suffix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FileCategory {
    pub name: String,
    pub description: Option<String>,
    /// Abort the whole run on the first failing script of this category.
    pub halt_on_error: bool,
    /// Run against the server rather than inside the target database.
    pub is_global: bool,
    pub disabled: bool,
}

impl FileCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn halt_on_error(mut self) -> Self {
        self.halt_on_error = true;
        self
    }

    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Whether `file_name` belongs to this category for scripts ending in `extension`.
    pub(crate) fn matches(&self, file_name: &str, extension: &str) -> bool {
        let suffix = format!(".{}{}", self.name, extension).to_lowercase();
        let file_name = file_name.to_lowercase();
        file_name.len() > suffix.len() && file_name.ends_with(&suffix)
    }
}

/// Behaviour switches for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Options {
    /// Create the database if it does not exist.
    pub create: bool,
    /// Drop the database first if it exists, forcing a clean install.
    pub drop: bool,
    /// Re-apply the scripts of the last recorded version.
    pub retry: bool,
    /// Report every script and percentage progress.
    pub verbose: bool,
    /// Callers should exit non-zero when any script failed.
    pub exit_code_on_error: bool,
    /// Callers should not ask before upgrading.
    pub no_prompt: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create: true,
            drop: false,
            retry: false,
            verbose: true,
            exit_code_on_error: false,
            no_prompt: false,
        }
    }
}

/// The category list used when a configuration names none.
pub fn default_file_categories() -> Vec<FileCategory> {
    vec![
        FileCategory::new("PreInstall").halt_on_error(),
        FileCategory::new("Table"),
        FileCategory::new("UserDefinedFunction"),
        FileCategory::new("View"),
        FileCategory::new("StoredProcedure"),
        FileCategory::new("Trigger"),
        FileCategory::new("PostInstall"),
        FileCategory::new("ForeignKey"),
    ]
}

/// A [MigrationConfig] with every default filled in.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedConfig {
    pub database: String,
    pub connection_string: String,
    pub dialect: DialectSelection,
    pub install_dir: PathBuf,
    pub upgrade_dir: PathBuf,
    pub script_extension: String,
    pub file_categories: Vec<FileCategory>,
    pub options: Options,
}

impl MigrationConfig {
    pub(crate) fn resolve(&self) -> ResolvedConfig {
        let install = non_empty(&self.install_path).unwrap_or(DEFAULT_INSTALL_PATH);
        let upgrade = non_empty(&self.upgrade_path).unwrap_or(DEFAULT_UPGRADE_PATH);
        let script_extension = match non_empty(&self.script_extension) {
            None => DEFAULT_SCRIPT_EXTENSION.to_string(),
            Some(ext) if ext.starts_with('.') => ext.to_string(),
            Some(ext) => format!(".{ext}"),
        };
        let file_categories = if self.file_categories.is_empty() {
            default_file_categories()
        } else {
            self.file_categories.clone()
        };

        ResolvedConfig {
            database: self.database.clone(),
            connection_string: self.connection_string.clone(),
            dialect: self.dialect.clone(),
            install_dir: self.script_root.join(install),
            upgrade_dir: self.script_root.join(upgrade),
            script_extension,
            file_categories,
            options: self.options,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
