//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::{Path, PathBuf};

/// Name of the per-user configuration directory
pub const CONFIG_DIR_NAME: &str = ".containership";

/// Get the containership config directory (~/.containership)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the harbor config file (~/.containership/harbor.toml)
pub fn config_file() -> PathBuf {
    config_dir().join("harbor.toml")
}

/// Get the default plugin install root (~/.containership/plugins)
pub fn default_plugins_dir() -> PathBuf {
    config_dir().join("plugins")
}

/// Ensure `<root>/node_modules` exists so npm treats `root` as its prefix
pub fn ensure_plugins_dir(root: &Path) -> std::io::Result<PathBuf> {
    let modules = root.join("node_modules");
    std::fs::create_dir_all(&modules)?;
    Ok(modules)
}
