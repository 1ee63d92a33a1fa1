//! Dialect profiles: the SQL each dialect uses to check, create, drop, and version a database.
//!
//! Profiles come from a JSON document mapping a dialect name to its driver identifier and
//! script templates:
//!
//! ```json
//! {
//!   "sqlite": {
//!     "invariant": "sqlite",
//!     "scripts": {
//!       "GetVersion": "SELECT version || ';' || details FROM _sqlinstall_version_ LIMIT 1",
//!       "SetVersion": "..."
//!     }
//!   }
//! }
//! ```
//!
//! A document is compiled into the crate. A `dialects.json` placed beside the running
//! executable replaces it.
//!
//! Templates use positional placeholders: `{0}` is the database name, `{1}` the version label
//! and `{2}` the version details. `{{` and `}}` produce literal braces.

use crate::config::DialectSelection;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// File name of the profile document looked up beside the executable.
pub const PROFILE_DOCUMENT_FILE: &str = "dialects.json";

const BUILTIN_PROFILES: &str = include_str!("dialects.json");

/// The operations a dialect profile supplies SQL for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScriptKind {
    Exists,
    Create,
    Drop,
    GetVersion,
    SetVersion,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptKind::Exists => "Exists",
            ScriptKind::Create => "Create",
            ScriptKind::Drop => "Drop",
            ScriptKind::GetVersion => "GetVersion",
            ScriptKind::SetVersion => "SetVersion",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProfileEntry {
    invariant: String,
    #[serde(default)]
    scripts: BTreeMap<ScriptKind, String>,
}

/// A parsed dialect profile document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDocument {
    entries: BTreeMap<String, ProfileEntry>,
}

impl ProfileDocument {
    /// Parse a profile document. Dialect names are matched case-insensitively.
    pub fn parse(document: &str) -> Result<Self, Error> {
        let raw: BTreeMap<String, ProfileEntry> = serde_json::from_str(document)
            .map_err(|e| Error::Configuration(format!("invalid dialect profile document: {e}")))?;

        let mut entries = BTreeMap::new();
        for (name, entry) in raw {
            if entry.invariant.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "dialect '{name}' has no driver invariant"
                )));
            }
            entries.insert(name.to_lowercase(), entry);
        }
        Ok(Self { entries })
    }

    /// The document compiled into the crate.
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_PROFILES).expect("built-in dialect profile document is valid")
    }

    /// Load `dir/dialects.json` if it exists, otherwise the built-in document.
    pub fn load_from_dir(dir: &Path) -> Result<Self, Error> {
        let path = dir.join(PROFILE_DOCUMENT_FILE);
        if path.is_file() {
            #[cfg(feature = "tracing")]
            tracing::debug!(path = %path.display(), "Loading dialect profiles");
            Self::parse(&std::fs::read_to_string(&path)?)
        } else {
            Ok(Self::builtin())
        }
    }

    /// Load the document beside the running executable, falling back to the built-in one.
    pub fn load_default() -> Result<Self, Error> {
        match std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            Some(dir) => Self::load_from_dir(&dir),
            None => Ok(Self::builtin()),
        }
    }

    pub fn dialects(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Build the profile for `selection`, applying its invariant and template overrides.
    pub fn profile(&self, selection: &DialectSelection) -> Result<DialectProfile, Error> {
        let name = selection.name.trim().to_lowercase();
        let entry = self
            .entries
            .get(&name)
            .ok_or_else(|| Error::Configuration(format!("unknown dialect '{}'", selection.name)))?;

        let mut profile = DialectProfile {
            name,
            invariant: entry.invariant.clone(),
            scripts: entry.scripts.clone(),
        };
        if let Some(invariant) = selection.invariant.as_deref().map(str::trim) {
            if !invariant.is_empty() {
                profile.invariant = invariant.to_string();
            }
        }
        for (kind, text) in &selection.scripts {
            profile.scripts.insert(*kind, text.clone());
        }
        Ok(profile)
    }
}

/// The resolved profile for one dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct DialectProfile {
    /// Lowercase dialect name.
    pub name: String,
    /// Identifier of the driver that executes this dialect's SQL.
    pub invariant: String,
    pub scripts: BTreeMap<ScriptKind, String>,
}

impl DialectProfile {
    pub fn has_script(&self, kind: ScriptKind) -> bool {
        self.scripts.contains_key(&kind)
    }

    /// Render the template for `kind` with positional arguments.
    pub fn render(&self, kind: ScriptKind, args: &[&str]) -> Result<String, Error> {
        let template = self
            .scripts
            .get(&kind)
            .ok_or(Error::MissingScriptTemplate(kind))?;
        Ok(render_template(template, args))
    }
}

/// Substitute `{n}` placeholders. Arguments have single quotes doubled. Placeholders without a
/// matching argument are left as written.
pub fn render_template(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    digits.push(d);
                    chars.next();
                }
                let arg = digits
                    .parse::<usize>()
                    .ok()
                    .filter(|_| chars.peek() == Some(&'}'))
                    .and_then(|index| args.get(index));
                match arg {
                    Some(arg) => {
                        chars.next();
                        out.push_str(&arg.replace('\'', "''"));
                    }
                    None => {
                        out.push('{');
                        out.push_str(&digits);
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}
