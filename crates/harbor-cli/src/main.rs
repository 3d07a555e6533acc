//! Harbor - Containership plugin manager
//!
//! Installs, updates and removes Containership plugins published to npm,
//! keeping V1 hosts on V1-compatible plugin versions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use harbor_core::config::{HarborConfig, PolicyKind};

mod output;
mod plugin;

/// Harbor - Containership plugin manager
#[derive(Parser)]
#[command(name = "harbor")]
#[command(about = "Manage Containership plugins", long_about = None)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.containership/harbor.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Plugin install directory
    #[arg(long, global = true, value_name = "DIR")]
    plugin_location: Option<PathBuf>,

    /// Authorized plugin directory URL
    #[arg(long, global = true, value_name = "URL")]
    directory_url: Option<String>,

    /// Compatibility policy: cutoff or metadata-tag
    #[arg(long, global = true)]
    policy: Option<PolicyKind>,

    /// First unsupported plugin version under the cutoff policy
    #[arg(long, global = true, value_name = "VERSION")]
    boundary: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List, search, add, remove and update plugins
    Plugin {
        #[command(subcommand)]
        command: plugin::PluginCommand,
    },
}

impl Cli {
    fn load_config(&self) -> Result<HarborConfig> {
        let mut config = match &self.config {
            Some(path) => HarborConfig::load_from(path)?,
            None => HarborConfig::load()?,
        };

        if let Some(location) = &self.plugin_location {
            config.plugin_location = Some(location.clone());
        }
        if let Some(url) = &self.directory_url {
            config.directory_url = url.clone();
        }
        if let Some(policy) = self.policy {
            config.compatibility.policy = policy;
        }
        if let Some(boundary) = &self.boundary {
            config.compatibility.boundary = boundary.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// `--verbose` raises only harbor's own targets to debug.
fn log_filter(verbose: bool) -> Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    if verbose {
        for directive in ["harbor=debug", "harbor_core=debug"] {
            filter = filter.add_directive(directive.parse()?);
        }
    }
    Ok(filter)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose)?)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.load_config()?;

    match cli.command {
        Commands::Plugin { command } => plugin::run(command, &config).await,
    }
}
