//! Plugin resolution and installation.
//!
//! Maps user supplied identifiers to canonical npm sources through the
//! authorized directory, picks one compatible version per identifier and
//! installs or removes it in the plugin directory.

mod compat;
mod directory;
mod error;
mod manager;
mod registry;
mod resolver;
mod types;

pub use compat::{
    select_version, CompatibilityPolicy, CutoffPolicy, MetadataTagPolicy,
    DEFAULT_COMPATIBILITY_BOUNDARY, DEFAULT_INCOMPATIBLE_TAG, DEFAULT_METADATA_KEY,
};
pub use directory::{
    DirectoryClient, HttpDirectoryClient, StaticDirectory, DEFAULT_DIRECTORY_TIMEOUT,
    DEFAULT_DIRECTORY_URL,
};
pub use error::ResolveError;
pub use manager::PluginManager;
pub use registry::{parse_ls_output, parse_view_output, LoadOptions, NpmPackageManager, PackageManager};
pub use resolver::{display_name, local_package_name, resolve_source, DEFAULT_NAMESPACE_PREFIX};
pub use types::{
    AuthorizedDirectory, AuthorizedPlugin, BatchReport, InstalledPlugin, PluginAction,
    PluginIdentifier, PluginOperation, PluginOutcome, ResolvedPlugin, SearchHit,
    VersionMetadataMap, ANY_VERSION,
};
