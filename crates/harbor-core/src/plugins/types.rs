use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ResolveError;

/// Constraint used when an identifier carries no `@version` suffix.
pub const ANY_VERSION: &str = "*";

/// A user supplied plugin reference, `name[@constraint]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginIdentifier {
    pub name: String,
    pub constraint: String,
}

/// One curated entry of the authorized plugin directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedPlugin {
    /// Registry coordinate handed to the package manager.
    pub source: String,
    #[serde(default)]
    pub description: String,
}

/// Curated plugin name -> canonical source. Fetched once per command.
pub type AuthorizedDirectory = BTreeMap<String, AuthorizedPlugin>;

/// Published version -> registry metadata for that version.
pub type VersionMetadataMap = BTreeMap<String, serde_json::Value>;

/// The single concrete install target selected for an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlugin {
    pub canonical_source: String,
    pub selected_version: String,
}

impl ResolvedPlugin {
    /// `source@version`, as passed to the package manager.
    pub fn spec(&self) -> String {
        format!("{}@{}", self.canonical_source, self.selected_version)
    }
}

impl fmt::Display for ResolvedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOperation {
    Install,
    Update,
    Uninstall,
}

impl PluginOperation {
    pub fn verb(&self) -> &'static str {
        match self {
            PluginOperation::Install => "install",
            PluginOperation::Update => "update",
            PluginOperation::Uninstall => "uninstall",
        }
    }

    pub fn needs_version(&self) -> bool {
        !matches!(self, PluginOperation::Uninstall)
    }
}

/// What happened to a single identifier that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginAction {
    Installed(ResolvedPlugin),
    Updated(ResolvedPlugin),
    Removed { package: String },
}

impl fmt::Display for PluginAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginAction::Installed(resolved) => write!(f, "installed {}", resolved),
            PluginAction::Updated(resolved) => write!(f, "updated to {}", resolved),
            PluginAction::Removed { package } => write!(f, "removed {}", package),
        }
    }
}

/// Result for one identifier of a batch.
#[derive(Debug, Clone)]
pub struct PluginOutcome {
    /// The identifier exactly as the user typed it.
    pub identifier: String,
    pub result: Result<PluginAction, ResolveError>,
}

impl PluginOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-identifier outcomes of one batch, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<PluginOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &PluginOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &PluginOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(PluginOutcome::is_success)
    }
}

/// A plugin currently present in the local plugin directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPlugin {
    /// Package name as npm knows it.
    pub name: String,
    /// Package name with the namespace prefix stripped.
    pub display_name: String,
    pub version: String,
}

/// A curated directory entry matching a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub name: String,
    pub source: String,
    pub description: String,
}
