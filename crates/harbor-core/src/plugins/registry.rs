//! Package manager collaborator
//!
//! Version metadata lookup and artifact install/removal are delegated to
//! npm, run against the plugin directory as its prefix.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Output;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use super::types::VersionMetadataMap;
use super::ResolveError;

#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Metadata of every published version matching `spec` (`source@constraint`).
    async fn view(&self, spec: &str, fields: &[String]) -> Result<VersionMetadataMap, ResolveError>;

    async fn install(&self, spec: &str) -> Result<(), ResolveError>;

    async fn uninstall(&self, name: &str) -> Result<(), ResolveError>;

    /// Top-level installed packages, name -> version.
    async fn list(&self) -> Result<BTreeMap<String, String>, ResolveError>;
}

/// Flags applied to every npm invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub unsafe_perm: bool,
    pub force: bool,
    pub loglevel: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            unsafe_perm: true,
            force: true,
            loglevel: "silent".to_string(),
        }
    }
}

/// npm, pinned to a plugin prefix directory.
#[derive(Debug, Clone)]
pub struct NpmPackageManager {
    binary: PathBuf,
    prefix: PathBuf,
    options: LoadOptions,
}

impl NpmPackageManager {
    /// Locate npm and bind it to `prefix`.
    ///
    /// `binary` overrides the `PATH` lookup.
    pub fn load(prefix: PathBuf, options: LoadOptions, binary: Option<PathBuf>) -> Result<Self> {
        let binary = match binary {
            Some(path) => path,
            None => which::which("npm")
                .context("npm not found. Please install Node.js to manage plugins")?,
        };

        if !prefix.is_dir() {
            return Err(anyhow!(
                "plugin directory {} does not exist",
                prefix.display()
            ));
        }

        debug!("Using npm at {:?} with prefix {:?}", binary, prefix);
        Ok(Self {
            binary,
            prefix,
            options,
        })
    }

    fn base_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--prefix".into(), self.prefix.clone().into_os_string()];
        args.push(format!("--loglevel={}", self.options.loglevel).into());
        if self.options.force {
            args.push("--force".into());
        }
        if self.options.unsafe_perm {
            args.push("--unsafe-perm=true".into());
        }
        args
    }

    async fn run(&self, args: &[&str]) -> std::io::Result<Output> {
        debug!("npm {}", args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .args(self.base_args())
            .current_dir(&self.prefix)
            .kill_on_drop(true)
            .output()
            .await
    }
}

#[async_trait]
impl PackageManager for NpmPackageManager {
    async fn view(&self, spec: &str, fields: &[String]) -> Result<VersionMetadataMap, ResolveError> {
        let mut args = vec!["view", spec];
        args.extend(fields.iter().map(String::as_str));
        args.push("--json");

        let output = self
            .run(&args)
            .await
            .map_err(|e| ResolveError::metadata_lookup(spec, e.to_string()))?;

        if !output.status.success() {
            return Err(ResolveError::metadata_lookup(spec, failure_message(&output)));
        }

        parse_view_output(&String::from_utf8_lossy(&output.stdout))
            .map_err(|message| ResolveError::metadata_lookup(spec, message))
    }

    async fn install(&self, spec: &str) -> Result<(), ResolveError> {
        info!("Installing {} into {:?}", spec, self.prefix);
        let output = self
            .run(&["install", spec])
            .await
            .map_err(|e| ResolveError::package_manager(spec, e.to_string()))?;

        if !output.status.success() {
            return Err(ResolveError::package_manager(spec, failure_message(&output)));
        }
        Ok(())
    }

    async fn uninstall(&self, name: &str) -> Result<(), ResolveError> {
        info!("Uninstalling {} from {:?}", name, self.prefix);
        let output = self
            .run(&["uninstall", name])
            .await
            .map_err(|e| ResolveError::package_manager(name, e.to_string()))?;

        if !output.status.success() {
            return Err(ResolveError::package_manager(name, failure_message(&output)));
        }
        Ok(())
    }

    async fn list(&self) -> Result<BTreeMap<String, String>, ResolveError> {
        let output = self
            .run(&["ls", "--json", "--depth=0"])
            .await
            .map_err(|e| ResolveError::package_manager("ls", e.to_string()))?;

        // npm ls exits non-zero for extraneous or missing packages but still
        // prints the tree, so only give up when the output is unusable.
        match parse_ls_output(&String::from_utf8_lossy(&output.stdout)) {
            Ok(installed) => Ok(installed),
            Err(_) if !output.status.success() => Err(ResolveError::package_manager(
                "ls",
                failure_message(&output),
            )),
            Err(message) => Err(ResolveError::package_manager("ls", message)),
        }
    }
}

/// Normalize `npm view --json` output into a version map.
///
/// npm prints a bare value for one match and an array for several; with a
/// single `version` field the values are strings, otherwise objects.
pub fn parse_view_output(stdout: &str) -> std::result::Result<VersionMetadataMap, String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(VersionMetadataMap::new());
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| format!("unparsable npm output: {}", e))?;

    let entries = match value {
        Value::Array(items) => items,
        single => vec![single],
    };

    let mut versions = VersionMetadataMap::new();
    for entry in entries {
        match entry {
            Value::String(version) => {
                versions.insert(version, Value::Null);
            }
            Value::Object(ref fields) => {
                if let Some(error) = fields.get("error") {
                    return Err(error_summary(error));
                }
                let version = fields
                    .get("version")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "npm metadata entry without a version".to_string())?
                    .to_string();
                versions.insert(version, entry);
            }
            other => return Err(format!("unexpected npm output entry: {}", other)),
        }
    }
    Ok(versions)
}

/// Top-level `dependencies` of `npm ls --json` as name -> version.
pub fn parse_ls_output(stdout: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(BTreeMap::new());
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| format!("unparsable npm output: {}", e))?;

    let Some(dependencies) = value.get("dependencies").and_then(Value::as_object) else {
        return Ok(BTreeMap::new());
    };

    Ok(dependencies
        .iter()
        .map(|(name, info)| {
            let version = info
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            (name.clone(), version)
        })
        .collect())
}

fn error_summary(error: &Value) -> String {
    let code = error.get("code").and_then(Value::as_str);
    let summary = error.get("summary").and_then(Value::as_str);
    match (code, summary) {
        (Some(code), Some(summary)) => format!("{}: {}", code, summary),
        (None, Some(summary)) => summary.to_string(),
        (Some(code), None) => code.to_string(),
        (None, None) => error.to_string(),
    }
}

/// Best message for a failed npm run: JSON error on stdout, else stderr.
fn failure_message(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    if let Ok(value) = serde_json::from_str::<Value>(stdout.trim()) {
        if let Some(error) = value.get("error") {
            return error_summary(error);
        }
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("npm exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}
