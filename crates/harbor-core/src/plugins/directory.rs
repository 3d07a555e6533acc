//! Authorized plugin directory client
//!
//! The directory maps curated plugin names to their canonical registry
//! source. It is optional: when it cannot be fetched every identifier is
//! used verbatim.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::types::AuthorizedDirectory;
use super::ResolveError;

/// Public directory of curated Containership plugins.
pub const DEFAULT_DIRECTORY_URL: &str = "http://plugins.containership.io";

/// Default request timeout for the directory fetch
pub const DEFAULT_DIRECTORY_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetch a fresh snapshot. Never fails; unavailability yields an empty map.
    async fn fetch(&self) -> AuthorizedDirectory;
}

/// Fetches the directory over HTTP.
#[derive(Clone)]
pub struct HttpDirectoryClient {
    http_client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpDirectoryClient {
    pub fn new(http_client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
            timeout: DEFAULT_DIRECTORY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn try_fetch(&self) -> Result<AuthorizedDirectory, ResolveError> {
        let response = self
            .http_client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ResolveError::DirectoryUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::DirectoryUnavailable(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        response
            .json::<AuthorizedDirectory>()
            .await
            .map_err(|e| ResolveError::DirectoryUnavailable(format!("invalid body: {}", e)))
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn fetch(&self) -> AuthorizedDirectory {
        match self.try_fetch().await {
            Ok(directory) => {
                debug!(
                    "Fetched {} authorized plugins from {}",
                    directory.len(),
                    self.url
                );
                directory
            }
            Err(err) => {
                warn!("{}; using plugin names verbatim", err);
                AuthorizedDirectory::new()
            }
        }
    }
}

/// A fixed directory, for offline use.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory(pub AuthorizedDirectory);

#[async_trait]
impl DirectoryClient for StaticDirectory {
    async fn fetch(&self) -> AuthorizedDirectory {
        self.0.clone()
    }
}
