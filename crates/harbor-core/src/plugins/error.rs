//! Plugin resolution error types.
//!
//! Every variant names the plugin or source it concerns so a batch report
//! can print one self-contained line per identifier.

use thiserror::Error;

/// Errors raised while resolving, installing or removing a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The authorized directory could not be fetched. Recovered by the
    /// directory client, which falls back to an empty directory.
    #[error("authorized plugin directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// A concrete version at or above the compatibility boundary was requested.
    #[error(
        "plugin '{plugin}': cannot install version {constraint}, V1 plugins must be below {boundary}"
    )]
    ConstraintViolation {
        plugin: String,
        constraint: String,
        boundary: String,
    },

    /// The registry returned no usable metadata for a source.
    #[error("failed to retrieve plugin versions for '{package}': {message}")]
    MetadataLookup { package: String, message: String },

    /// Every published version was rejected by the compatibility policy.
    #[error(
        "no valid version of '{package}' found in the registry ({rule}). Found plugin versions: [{}]",
        .found.join(", ")
    )]
    NoValidVersion {
        package: String,
        rule: String,
        found: Vec<String>,
    },

    /// The package manager's install or uninstall primitive failed.
    #[error("package manager failed for '{target}': {message}")]
    PackageManager { target: String, message: String },

    /// A search pattern is not a valid regular expression.
    #[error("invalid search pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl ResolveError {
    /// Fatal errors abort the whole batch; everything else is isolated to a
    /// single identifier.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    pub fn metadata_lookup(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MetadataLookup {
            package: package.into(),
            message: message.into(),
        }
    }

    pub fn package_manager(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PackageManager {
            target: target.into(),
            message: message.into(),
        }
    }
}
