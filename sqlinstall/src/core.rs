use crate::error::Error;
use crate::natural::natural_compare;
use std::cmp::Ordering;
use std::fmt;

/// The reserved version label meaning "no migration has ever been applied".
/// It can never be used as the name of an upgrade directory.
pub const RTM: &str = "RTM";

/// Separator between the version label and the details in a stored version record.
pub(crate) const RECORD_SEPARATOR: char = ';';

/// The name of a migration, taken from its upgrade directory.
///
/// Labels are opaque and case-insensitive. Ordering and equality follow [natural_compare], so
/// `v2 < v10` and `v02 == v2`.
#[derive(Clone)]
pub struct VersionLabel(String);

impl VersionLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The reserved "nothing applied yet" label.
    pub fn rtm() -> Self {
        Self(RTM.to_string())
    }

    pub fn is_rtm(&self) -> bool {
        self.0.eq_ignore_ascii_case(RTM)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VersionLabel {
    fn default() -> Self {
        Self::rtm()
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionLabel({:?})", self.0)
    }
}

impl AsRef<str> for VersionLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VersionLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for VersionLabel {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl PartialEq for VersionLabel {
    fn eq(&self, other: &Self) -> bool {
        natural_compare(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for VersionLabel {}

impl PartialOrd for VersionLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_compare(&self.0, &other.0)
    }
}

/// Sort upgrade directory names naturally and pick the highest as the target version.
///
/// An empty listing resolves to [RTM]. A directory named [RTM] (in any case) is a
/// configuration error.
pub fn resolve_target_version<S: AsRef<str>>(directories: &[S]) -> Result<VersionLabel, Error> {
    let mut labels = Vec::with_capacity(directories.len());
    for name in directories {
        let label = VersionLabel::new(name.as_ref());
        if label.is_rtm() {
            return Err(Error::Configuration(format!(
                "'{}' is a reserved version name and cannot be used as an upgrade directory",
                name.as_ref()
            )));
        }
        labels.push(label);
    }
    labels.sort();
    Ok(labels.pop().unwrap_or_default())
}

/// Whether a database recorded at `current` already has everything up to `target`.
///
/// A database with nothing applied is only current when there is nothing to apply either.
pub fn is_current(current: &VersionLabel, target: &VersionLabel) -> bool {
    if current.is_rtm() {
        return target.is_rtm();
    }
    if target.is_rtm() {
        return true;
    }
    current >= target
}

/// Whether the upgrade directory `directory` must be applied to a database recorded at `current`.
///
/// With `retry_last`, the directory matching the recorded version is applied again as well.
pub fn is_outstanding(current: &VersionLabel, directory: &VersionLabel, retry_last: bool) -> bool {
    if current.is_rtm() {
        return true;
    }
    match current.cmp(directory) {
        Ordering::Less => true,
        Ordering::Equal => retry_last,
        Ordering::Greater => false,
    }
}

/// The directories, in application order, that must still be applied.
pub fn outstanding<'a>(
    directories: &'a [VersionLabel],
    current: &VersionLabel,
    retry_last: bool,
) -> Vec<&'a VersionLabel> {
    let mut pending = directories
        .iter()
        .filter(|directory| is_outstanding(current, directory, retry_last))
        .collect::<Vec<_>>();
    pending.sort();
    pending
}

/// A version record as stored in the target database: `<version>;<details>`.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    pub version: VersionLabel,
    /// Who applied the version and when.
    pub details: String,
}

impl VersionRecord {
    /// Parse a stored record. Anything other than exactly two non-empty parts is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts = raw
            .trim()
            .split(RECORD_SEPARATOR)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();
        match parts.as_slice() {
            [version, details] => Some(Self {
                version: VersionLabel::new(*version),
                details: details.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.version, RECORD_SEPARATOR, self.details)
    }
}

/// The outcome of a single install/upgrade run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Failed scripts plus any failure that aborted the run.
    pub errors: usize,
    /// Scripts attempted, whether they succeeded or not.
    pub scripts_run: usize,
    pub scripts_total: usize,
    /// The version recorded in the database before the run.
    pub current_version: VersionLabel,
    /// The highest upgrade directory.
    pub target_version: VersionLabel,
    /// The last version record written during the run, if any.
    pub recorded: Option<VersionRecord>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.errors == 0
    }
}
