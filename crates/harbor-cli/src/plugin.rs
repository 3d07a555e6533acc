//! `harbor plugin` subcommands

use anyhow::{Context, Result};
use clap::Subcommand;

use harbor_core::config::HarborConfig;
use harbor_core::paths;
use harbor_core::plugins::{
    BatchReport, HttpDirectoryClient, LoadOptions, NpmPackageManager, PluginAction,
    PluginManager, PluginOperation,
};

use crate::output::{print_row, NAME_WIDTH, VERSION_WIDTH};

const DESCRIPTION_WIDTH: usize = 100;

#[derive(Subcommand)]
pub enum PluginCommand {
    /// List installed plugins
    List,

    /// Search the authorized plugin directory
    Search {
        /// Regular expression matched against plugin names
        #[arg(value_name = "PLUGIN")]
        plugin: Option<String>,
    },

    /// Install one or more plugins (NAME or NAME@VERSION)
    Add {
        #[arg(value_name = "PLUGIN", required = true)]
        plugin: Vec<String>,
    },

    /// Uninstall one or more plugins
    Remove {
        #[arg(value_name = "PLUGIN", required = true)]
        plugin: Vec<String>,
    },

    /// Reinstall plugins at their latest compatible version
    Update {
        #[arg(value_name = "PLUGIN", required = true)]
        plugin: Vec<String>,
    },
}

pub async fn run(command: PluginCommand, config: &HarborConfig) -> Result<()> {
    let manager = build_manager(config)?;

    match command {
        PluginCommand::List => list(&manager).await,
        PluginCommand::Search { plugin } => search(&manager, plugin.as_deref()).await,
        PluginCommand::Add { plugin } => {
            println!("Installing plugin(s): {}", plugin.join(", "));
            batch(&manager, PluginOperation::Install, &plugin).await
        }
        PluginCommand::Remove { plugin } => {
            println!("Uninstalling plugin(s): {}", plugin.join(", "));
            batch(&manager, PluginOperation::Uninstall, &plugin).await
        }
        PluginCommand::Update { plugin } => {
            println!("Updating plugin(s): {}", plugin.join(", "));
            batch(&manager, PluginOperation::Update, &plugin).await
        }
    }
}

fn build_manager(config: &HarborConfig) -> Result<PluginManager> {
    let plugins_dir = config.plugins_dir();
    paths::ensure_plugins_dir(&plugins_dir).with_context(|| {
        format!("failed to create plugin directory {}", plugins_dir.display())
    })?;

    let packages =
        NpmPackageManager::load(plugins_dir, LoadOptions::default(), config.npm_binary.clone())?;
    let directory = HttpDirectoryClient::new(reqwest_client()?, config.directory_url.clone())
        .with_timeout(config.directory_timeout());
    let policy = config.compatibility.build_policy()?;

    Ok(
        PluginManager::new(Box::new(directory), Box::new(packages), policy)
            .with_namespace_prefix(config.namespace_prefix.clone()),
    )
}

fn reqwest_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("harbor/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

async fn list(manager: &PluginManager) -> Result<()> {
    let installed = manager.list_installed().await?;

    if installed.is_empty() {
        println!("No plugins installed!");
        return Ok(());
    }

    print_row(&[(NAME_WIDTH, "PLUGIN"), (VERSION_WIDTH, "VERSION")]);
    for plugin in &installed {
        print_row(&[
            (NAME_WIDTH, plugin.display_name.as_str()),
            (VERSION_WIDTH, plugin.version.as_str()),
        ]);
    }
    Ok(())
}

async fn search(manager: &PluginManager, pattern: Option<&str>) -> Result<()> {
    let hits = manager.search(pattern).await?;

    print_row(&[(NAME_WIDTH, "PLUGIN"), (DESCRIPTION_WIDTH, "DESCRIPTION")]);
    for hit in &hits {
        print_row(&[
            (NAME_WIDTH, hit.name.as_str()),
            (DESCRIPTION_WIDTH, hit.description.as_str()),
        ]);
    }
    Ok(())
}

/// Failures of individual plugins are printed but do not fail the command.
async fn batch(
    manager: &PluginManager,
    operation: PluginOperation,
    plugins: &[String],
) -> Result<()> {
    let report = manager.run(operation, plugins).await?;
    print_report(manager, operation, &report);
    Ok(())
}

fn print_report(manager: &PluginManager, operation: PluginOperation, report: &BatchReport) {
    for outcome in &report.outcomes {
        let name = manager.display_name(&outcome.identifier);
        match &outcome.result {
            Ok(PluginAction::Installed(resolved)) => {
                println!("Installed {} ({})", name, resolved)
            }
            Ok(PluginAction::Updated(resolved)) => println!("Updated {} ({})", name, resolved),
            Ok(PluginAction::Removed { package }) => {
                println!("Uninstalled {} ({})", name, package)
            }
            Err(err) => eprintln!("Failed to {} {}: {}", operation.verb(), name, err),
        }
    }
}
