//! Compatibility filtering between plugin generations
//!
//! A [`CompatibilityPolicy`] decides which published versions may be
//! installed; [`select_version`] then picks the semver-greatest survivor.

use semver::Version;
use serde_json::Value;

use super::types::{PluginIdentifier, VersionMetadataMap};
use super::ResolveError;

/// First version that belongs to the V2 plugin generation.
pub const DEFAULT_COMPATIBILITY_BOUNDARY: &str = "2.0.0";

/// Package metadata key carrying the plugin generation tag.
pub const DEFAULT_METADATA_KEY: &str = "containership";

/// Generation tag that marks a version as incompatible with this host.
pub const DEFAULT_INCOMPATIBLE_TAG: &str = "v2";

pub trait CompatibilityPolicy: Send + Sync {
    /// Short policy name used in logs.
    fn name(&self) -> &'static str;

    /// Validate the user's constraint before any registry lookup.
    fn check_constraint(&self, _identifier: &PluginIdentifier) -> Result<(), ResolveError> {
        Ok(())
    }

    fn is_compatible(&self, version: &Version, metadata: &Value) -> bool;

    /// Registry fields the policy needs in each version's metadata.
    fn registry_fields(&self) -> Vec<String>;

    /// Human readable rule, shown when nothing qualifies.
    fn rule(&self) -> String;
}

/// Rejects every version at or above a fixed boundary.
#[derive(Debug, Clone)]
pub struct CutoffPolicy {
    boundary: Version,
}

impl CutoffPolicy {
    pub fn new(boundary: Version) -> Self {
        Self { boundary }
    }
}

impl Default for CutoffPolicy {
    fn default() -> Self {
        Self::new(Version::new(2, 0, 0))
    }
}

impl CompatibilityPolicy for CutoffPolicy {
    fn name(&self) -> &'static str {
        "cutoff"
    }

    fn check_constraint(&self, identifier: &PluginIdentifier) -> Result<(), ResolveError> {
        if identifier.is_wildcard() {
            return Ok(());
        }

        // Ranges are left to the filter; only concrete versions are checked here.
        match parse_concrete_version(&identifier.constraint) {
            Some(requested) if requested >= self.boundary => Err(ResolveError::ConstraintViolation {
                plugin: identifier.name.clone(),
                constraint: identifier.constraint.clone(),
                boundary: self.boundary.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn is_compatible(&self, version: &Version, _metadata: &Value) -> bool {
        *version < self.boundary
    }

    fn registry_fields(&self) -> Vec<String> {
        vec!["version".to_string()]
    }

    fn rule(&self) -> String {
        format!("V1 plugins must have versions less than {}", self.boundary)
    }
}

/// Exact version named by a constraint. Leading `=`/`v` and whitespace are
/// ignored the way npm's loose parser does.
fn parse_concrete_version(constraint: &str) -> Option<Version> {
    let trimmed = constraint
        .trim_start_matches(|c: char| c == '=' || c == 'v' || c.is_whitespace())
        .trim_end();
    Version::parse(trimmed).ok()
}

/// Rejects versions whose metadata is tagged with an incompatible generation.
#[derive(Debug, Clone)]
pub struct MetadataTagPolicy {
    key: String,
    incompatible_tags: Vec<String>,
}

impl MetadataTagPolicy {
    pub fn new(key: impl Into<String>, incompatible_tags: Vec<String>) -> Self {
        Self {
            key: key.into(),
            incompatible_tags,
        }
    }

    /// `<key>.plugin.version` from a version's metadata, if present.
    pub fn generation_tag<'a>(&self, metadata: &'a Value) -> Option<&'a str> {
        metadata
            .get(&self.key)?
            .get("plugin")?
            .get("version")?
            .as_str()
    }
}

impl Default for MetadataTagPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_METADATA_KEY,
            vec![DEFAULT_INCOMPATIBLE_TAG.to_string()],
        )
    }
}

impl CompatibilityPolicy for MetadataTagPolicy {
    fn name(&self) -> &'static str {
        "metadata-tag"
    }

    fn is_compatible(&self, _version: &Version, metadata: &Value) -> bool {
        match self.generation_tag(metadata) {
            Some(tag) => !self.incompatible_tags.iter().any(|bad| bad == tag),
            None => true,
        }
    }

    fn registry_fields(&self) -> Vec<String> {
        vec!["version".to_string(), self.key.clone()]
    }

    fn rule(&self) -> String {
        format!(
            "versions tagged {}.plugin.version = {} are not supported",
            self.key,
            self.incompatible_tags.join(" | ")
        )
    }
}

/// Pick the single greatest compatible version out of `versions`.
///
/// Keys that are not valid semver never qualify but are still listed in the
/// `NoValidVersion` diagnostics.
pub fn select_version(
    policy: &dyn CompatibilityPolicy,
    package: &str,
    versions: &VersionMetadataMap,
) -> Result<String, ResolveError> {
    let selected = versions
        .iter()
        .filter_map(|(raw, metadata)| {
            let version = Version::parse(raw).ok()?;
            policy
                .is_compatible(&version, metadata)
                .then_some((version, raw))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b));

    match selected {
        Some((_, raw)) => Ok(raw.clone()),
        None => Err(ResolveError::NoValidVersion {
            package: package.to_string(),
            rule: policy.rule(),
            found: sorted_versions(versions),
        }),
    }
}

/// All keys of `versions`, semver ordered where possible.
fn sorted_versions(versions: &VersionMetadataMap) -> Vec<String> {
    let mut keys: Vec<&String> = versions.keys().collect();
    keys.sort_by(|a, b| match (Version::parse(a), Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
    keys.into_iter().cloned().collect()
}
