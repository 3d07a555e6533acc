//! Harbor configuration
//!
//! Loaded from `~/.containership/harbor.toml`. JSON is accepted as well,
//! and a missing file means defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use semver::Version;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use crate::paths;
use crate::plugins::{
    CompatibilityPolicy, CutoffPolicy, MetadataTagPolicy, DEFAULT_COMPATIBILITY_BOUNDARY,
    DEFAULT_DIRECTORY_TIMEOUT, DEFAULT_DIRECTORY_URL, DEFAULT_INCOMPATIBLE_TAG, DEFAULT_METADATA_KEY,
    DEFAULT_NAMESPACE_PREFIX,
};

/// Environment variable overriding `plugin-location`
pub const PLUGIN_LOCATION_ENV: &str = "HARBOR_PLUGIN_LOCATION";

/// Which compatibility filter decides installable versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Reject versions at or above the boundary.
    #[default]
    Cutoff,
    /// Reject versions tagged with an incompatible generation.
    MetadataTag,
}

impl FromStr for PolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cutoff" => Ok(PolicyKind::Cutoff),
            "metadata-tag" | "tag" => Ok(PolicyKind::MetadataTag),
            other => Err(anyhow!(
                "unknown compatibility policy '{}' (expected 'cutoff' or 'metadata-tag')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CompatibilityConfig {
    pub policy: PolicyKind,
    /// First unsupported version under the cutoff policy.
    pub boundary: String,
    /// Package metadata key holding `plugin.version` under the tag policy.
    pub metadata_key: String,
    pub incompatible_tags: Vec<String>,
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            boundary: DEFAULT_COMPATIBILITY_BOUNDARY.to_string(),
            metadata_key: DEFAULT_METADATA_KEY.to_string(),
            incompatible_tags: vec![DEFAULT_INCOMPATIBLE_TAG.to_string()],
        }
    }
}

impl CompatibilityConfig {
    pub fn build_policy(&self) -> Result<Box<dyn CompatibilityPolicy>> {
        match self.policy {
            PolicyKind::Cutoff => {
                let boundary = Version::parse(self.boundary.trim()).with_context(|| {
                    format!("invalid compatibility boundary '{}'", self.boundary)
                })?;
                Ok(Box::new(CutoffPolicy::new(boundary)))
            }
            PolicyKind::MetadataTag => {
                if self.metadata_key.trim().is_empty() {
                    bail!("metadata-key cannot be empty for the metadata-tag policy");
                }
                Ok(Box::new(MetadataTagPolicy::new(
                    self.metadata_key.trim(),
                    self.incompatible_tags.clone(),
                )))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HarborConfig {
    /// Install root handed to npm as its prefix.
    pub plugin_location: Option<PathBuf>,
    pub directory_url: String,
    pub directory_timeout_secs: u64,
    pub namespace_prefix: String,
    /// Explicit npm binary; looked up on `PATH` when unset.
    pub npm_binary: Option<PathBuf>,
    pub compatibility: CompatibilityConfig,
}

impl Default for HarborConfig {
    fn default() -> Self {
        Self {
            plugin_location: None,
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            directory_timeout_secs: DEFAULT_DIRECTORY_TIMEOUT.as_secs(),
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            npm_binary: None,
            compatibility: CompatibilityConfig::default(),
        }
    }
}

impl HarborConfig {
    /// Load the user config and apply environment overrides.
    pub fn load() -> Result<Self> {
        let config = Self::load_from(&paths::config_file())?;
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(location) = var(PLUGIN_LOCATION_ENV) {
            if !location.trim().is_empty() {
                self.plugin_location = Some(PathBuf::from(location));
            }
        }
        self
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: HarborConfig = parse_toml_or_json(&bytes)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.directory_url)
            .with_context(|| format!("invalid directory-url '{}'", self.directory_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("unsupported directory-url scheme: {}", url.scheme());
        }
        Ok(())
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.plugin_location
            .clone()
            .unwrap_or_else(paths::default_plugins_dir)
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_secs(self.directory_timeout_secs.max(1))
    }
}

fn parse_toml_or_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if let Ok(as_toml) = toml::from_str::<T>(&String::from_utf8_lossy(bytes)) {
        return Ok(as_toml);
    }

    serde_json::from_slice::<T>(bytes).context("content is neither valid TOML nor JSON")
}
