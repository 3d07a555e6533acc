//! Name resolution for plugin identifiers
//!
//! Turns `name[@constraint]` input into a parsed identifier and rewrites
//! curated names into their canonical registry source.

use super::types::{AuthorizedDirectory, PluginIdentifier, ANY_VERSION};

/// Conventional npm namespace shared by official plugins.
pub const DEFAULT_NAMESPACE_PREFIX: &str = "containership.plugin.";

impl PluginIdentifier {
    /// Split on the last `@`.
    ///
    /// The suffix is only a constraint when both sides are non-empty, so a
    /// scoped package such as `@scope/pkg` keeps its leading `@`.
    pub fn parse(raw: &str) -> Self {
        match raw.rfind('@') {
            Some(idx) if idx > 0 && idx + 1 < raw.len() => Self {
                name: raw[..idx].to_string(),
                constraint: raw[idx + 1..].to_string(),
            },
            _ => Self {
                name: raw.to_string(),
                constraint: ANY_VERSION.to_string(),
            },
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.constraint == ANY_VERSION
    }

    /// Registry query spec for this identifier's constraint against `source`.
    pub fn query_spec(&self, source: &str) -> String {
        format!("{}@{}", source, self.constraint)
    }
}

/// Canonical source for `name`; unknown names are already canonical.
pub fn resolve_source<'a>(name: &'a str, directory: &'a AuthorizedDirectory) -> &'a str {
    directory
        .get(name)
        .map(|entry| entry.source.as_str())
        .unwrap_or(name)
}

/// Strip the namespace prefix for printing. Never used for resolution.
pub fn display_name<'a>(name: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return name;
    }
    name.strip_prefix(prefix).unwrap_or(name)
}

/// Name of the installed package for a canonical source.
///
/// Git style sources (`https://host/org/repo.git#tag`) install under their
/// final path segment with the `.git` suffix and ref dropped. Plain and
/// scoped npm names are returned unchanged.
pub fn local_package_name(source: &str) -> String {
    if is_registry_name(source) {
        return source.to_string();
    }

    let path = source.split('#').next().unwrap_or(source);
    let tail = path.rsplit('/').next().unwrap_or(path);
    tail.strip_suffix(".git").unwrap_or(tail).to_string()
}

fn is_registry_name(source: &str) -> bool {
    if source.contains(':') {
        return false;
    }
    match source.strip_prefix('@') {
        Some(scoped) => scoped.matches('/').count() == 1,
        None => !source.contains('/'),
    }
}
