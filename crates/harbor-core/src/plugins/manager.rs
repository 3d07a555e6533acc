use futures::future::join_all;
use regex::Regex;
use tracing::{debug, info, warn};

use super::compat::{select_version, CompatibilityPolicy};
use super::directory::DirectoryClient;
use super::registry::PackageManager;
use super::resolver::{display_name, local_package_name, resolve_source, DEFAULT_NAMESPACE_PREFIX};
use super::{
    AuthorizedDirectory, BatchReport, InstalledPlugin, PluginAction, PluginIdentifier,
    PluginOperation, PluginOutcome, ResolveError, ResolvedPlugin, SearchHit,
};

/// Resolves plugin identifiers and drives the package manager for a batch.
pub struct PluginManager {
    directory: Box<dyn DirectoryClient>,
    packages: Box<dyn PackageManager>,
    policy: Box<dyn CompatibilityPolicy>,
    namespace_prefix: String,
}

impl PluginManager {
    pub fn new(
        directory: Box<dyn DirectoryClient>,
        packages: Box<dyn PackageManager>,
        policy: Box<dyn CompatibilityPolicy>,
    ) -> Self {
        Self {
            directory,
            packages,
            policy,
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
        }
    }

    pub fn with_namespace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_prefix = prefix.into();
        self
    }

    /// Name to show for a package, namespace prefix removed.
    pub fn display_name<'a>(&self, name: &'a str) -> &'a str {
        display_name(name, &self.namespace_prefix)
    }

    pub async fn install(&self, plugins: &[String]) -> Result<BatchReport, ResolveError> {
        self.run(PluginOperation::Install, plugins).await
    }

    pub async fn update(&self, plugins: &[String]) -> Result<BatchReport, ResolveError> {
        self.run(PluginOperation::Update, plugins).await
    }

    pub async fn uninstall(&self, plugins: &[String]) -> Result<BatchReport, ResolveError> {
        self.run(PluginOperation::Uninstall, plugins).await
    }

    /// Run `operation` for every identifier concurrently.
    ///
    /// Only a constraint violation is returned as `Err`; it is detected before
    /// any network or registry call. Every other failure is recorded in the
    /// report against its own identifier.
    pub async fn run(
        &self,
        operation: PluginOperation,
        plugins: &[String],
    ) -> Result<BatchReport, ResolveError> {
        let identifiers: Vec<(String, PluginIdentifier)> = plugins
            .iter()
            .map(|raw| (raw.clone(), PluginIdentifier::parse(raw)))
            .collect();

        if operation.needs_version() {
            for (_, identifier) in &identifiers {
                self.policy.check_constraint(identifier)?;
            }
        }

        let directory = self.directory.fetch().await;
        info!(
            "Running plugin {} for {} identifier(s) ({} curated names known)",
            operation.verb(),
            identifiers.len(),
            directory.len()
        );

        let tasks = identifiers.into_iter().map(|(raw, identifier)| {
            let directory = &directory;
            async move {
                let result = self.process(operation, &identifier, directory).await;
                if let Err(err) = &result {
                    warn!("Plugin {} failed for {}: {}", operation.verb(), raw, err);
                }
                PluginOutcome {
                    identifier: raw,
                    result,
                }
            }
        });

        Ok(BatchReport {
            outcomes: join_all(tasks).await,
        })
    }

    /// Resolve one identifier to its single installable version.
    pub async fn resolve(
        &self,
        identifier: &PluginIdentifier,
        directory: &AuthorizedDirectory,
    ) -> Result<ResolvedPlugin, ResolveError> {
        self.policy.check_constraint(identifier)?;

        let source = resolve_source(&identifier.name, directory);
        let spec = identifier.query_spec(source);
        let versions = self
            .packages
            .view(&spec, &self.policy.registry_fields())
            .await?;
        debug!("{} published version(s) match {}", versions.len(), spec);

        let selected_version = select_version(self.policy.as_ref(), source, &versions)?;
        debug!(
            "Selected {}@{} under {} policy",
            source,
            selected_version,
            self.policy.name()
        );

        Ok(ResolvedPlugin {
            canonical_source: source.to_string(),
            selected_version,
        })
    }

    async fn process(
        &self,
        operation: PluginOperation,
        identifier: &PluginIdentifier,
        directory: &AuthorizedDirectory,
    ) -> Result<PluginAction, ResolveError> {
        match operation {
            PluginOperation::Install | PluginOperation::Update => {
                let resolved = self.resolve(identifier, directory).await?;
                self.packages.install(&resolved.spec()).await?;
                Ok(if operation == PluginOperation::Install {
                    PluginAction::Installed(resolved)
                } else {
                    PluginAction::Updated(resolved)
                })
            }
            PluginOperation::Uninstall => {
                let package = local_package_name(resolve_source(&identifier.name, directory));
                self.packages.uninstall(&package).await?;
                Ok(PluginAction::Removed { package })
            }
        }
    }

    /// Plugins currently installed in the plugin directory, sorted by name.
    pub async fn list_installed(&self) -> Result<Vec<InstalledPlugin>, ResolveError> {
        let installed = self.packages.list().await?;
        Ok(installed
            .into_iter()
            .map(|(name, version)| InstalledPlugin {
                display_name: self.display_name(&name).to_string(),
                name,
                version,
            })
            .collect())
    }

    /// Curated directory entries whose name matches `pattern`, sorted by name.
    pub async fn search(&self, pattern: Option<&str>) -> Result<Vec<SearchHit>, ResolveError> {
        let matcher = pattern
            .map(|p| {
                Regex::new(p).map_err(|e| ResolveError::InvalidPattern {
                    pattern: p.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let directory = self.directory.fetch().await;
        Ok(directory
            .into_iter()
            .filter(|(name, _)| matcher.as_ref().map_or(true, |re| re.is_match(name)))
            .map(|(name, entry)| SearchHit {
                name,
                source: entry.source,
                description: entry.description,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{
        AuthorizedPlugin, CutoffPolicy, MetadataTagPolicy, StaticDirectory, VersionMetadataMap,
    };
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        views: Mutex<Vec<String>>,
        installs: Mutex<Vec<String>>,
        uninstalls: Mutex<Vec<String>>,
        directory_fetches: AtomicUsize,
    }

    struct CountingDirectory {
        entries: AuthorizedDirectory,
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl DirectoryClient for CountingDirectory {
        async fn fetch(&self) -> AuthorizedDirectory {
            self.calls.directory_fetches.fetch_add(1, Ordering::SeqCst);
            self.entries.clone()
        }
    }

    #[derive(Default)]
    struct FakeRegistry {
        /// source -> published versions
        published: HashMap<String, VersionMetadataMap>,
        broken_installs: HashSet<String>,
        installed: BTreeMap<String, String>,
        calls: Arc<Calls>,
    }

    impl FakeRegistry {
        fn publish(mut self, source: &str, versions: &[&str]) -> Self {
            let map = versions
                .iter()
                .map(|v| (v.to_string(), Value::Null))
                .collect();
            self.published.insert(source.to_string(), map);
            self
        }

        fn publish_tagged(mut self, source: &str, versions: &[(&str, &str)]) -> Self {
            let map = versions
                .iter()
                .map(|(v, tag)| {
                    (
                        v.to_string(),
                        json!({ "version": v, "containership": { "plugin": { "version": tag } } }),
                    )
                })
                .collect();
            self.published.insert(source.to_string(), map);
            self
        }
    }

    #[async_trait]
    impl PackageManager for FakeRegistry {
        async fn view(
            &self,
            spec: &str,
            _fields: &[String],
        ) -> Result<VersionMetadataMap, ResolveError> {
            self.calls.views.lock().unwrap().push(spec.to_string());
            let source = spec.rsplit_once('@').map_or(spec, |(source, _)| source);
            self.published
                .get(source)
                .cloned()
                .ok_or_else(|| ResolveError::metadata_lookup(spec, "E404 Not Found"))
        }

        async fn install(&self, spec: &str) -> Result<(), ResolveError> {
            self.calls.installs.lock().unwrap().push(spec.to_string());
            if self.broken_installs.contains(spec) {
                return Err(ResolveError::package_manager(spec, "EACCES"));
            }
            Ok(())
        }

        async fn uninstall(&self, name: &str) -> Result<(), ResolveError> {
            self.calls.uninstalls.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn list(&self) -> Result<BTreeMap<String, String>, ResolveError> {
            Ok(self.installed.clone())
        }
    }

    fn curated() -> AuthorizedDirectory {
        let mut directory = AuthorizedDirectory::new();
        directory.insert(
            "navigator".to_string(),
            AuthorizedPlugin {
                source: "containership.plugin.navigator".to_string(),
                description: "Web interface".to_string(),
            },
        );
        directory.insert(
            "cloud".to_string(),
            AuthorizedPlugin {
                source: "https://github.com/containership/containership.plugin.cloud.git"
                    .to_string(),
                description: "Containership Cloud integration".to_string(),
            },
        );
        directory
    }

    fn manager(registry: FakeRegistry, policy: Box<dyn CompatibilityPolicy>) -> PluginManager {
        let directory = CountingDirectory {
            entries: curated(),
            calls: registry.calls.clone(),
        };
        PluginManager::new(Box::new(directory), Box::new(registry), policy)
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn installs_latest_v1_version_of_curated_plugin() {
        let calls = Arc::new(Calls::default());
        let registry = FakeRegistry {
            calls: calls.clone(),
            ..Default::default()
        }
        .publish("containership.plugin.navigator", &["1.0.0", "1.4.2", "2.0.0"]);

        let report = manager(registry, Box::new(CutoffPolicy::default()))
            .install(&args(&["navigator"]))
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(
            report.outcomes[0].result,
            Ok(PluginAction::Installed(ResolvedPlugin {
                canonical_source: "containership.plugin.navigator".to_string(),
                selected_version: "1.4.2".to_string(),
            }))
        );
        assert_eq!(
            *calls.views.lock().unwrap(),
            vec!["containership.plugin.navigator@*"]
        );
        assert_eq!(
            *calls.installs.lock().unwrap(),
            vec!["containership.plugin.navigator@1.4.2"]
        );
    }

    #[tokio::test]
    async fn constraint_violation_aborts_before_any_registry_call() {
        let calls = Arc::new(Calls::default());
        let registry = FakeRegistry {
            calls: calls.clone(),
            ..Default::default()
        }
        .publish("foo", &["1.5.0"])
        .publish("bar", &["1.0.0"]);

        let err = manager(registry, Box::new(CutoffPolicy::default()))
            .install(&args(&["foo@1.5.0", "bar", "foo@2.1.0"]))
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(
            err,
            ResolveError::ConstraintViolation { ref constraint, ref boundary, .. }
                if constraint == "2.1.0" && boundary == "2.0.0"
        ));
        assert!(calls.views.lock().unwrap().is_empty());
        assert!(calls.installs.lock().unwrap().is_empty());
        assert_eq!(calls.directory_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn loosely_written_versions_violate_the_boundary_too() {
        for raw in ["foo@v2.1.0", "foo@=2.0.0"] {
            let calls = Arc::new(Calls::default());
            let registry = FakeRegistry {
                calls: calls.clone(),
                ..Default::default()
            }
            .publish("foo", &["1.5.0", "2.1.0"]);

            let err = manager(registry, Box::new(CutoffPolicy::default()))
                .install(&args(&["bar", raw]))
                .await
                .unwrap_err();

            assert!(err.is_fatal(), "{raw} should be fatal");
            assert!(calls.views.lock().unwrap().is_empty());
            assert_eq!(calls.directory_fetches.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn update_also_enforces_the_boundary() {
        let registry = FakeRegistry::default().publish("foo", &["1.0.0"]);
        let err = manager(registry, Box::new(CutoffPolicy::default()))
            .update(&args(&["foo@2.0.0"]))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn failing_middle_item_does_not_affect_siblings() {
        let calls = Arc::new(Calls::default());
        let registry = FakeRegistry {
            calls: calls.clone(),
            ..Default::default()
        }
        .publish("alpha", &["1.0.0", "1.2.0"])
        .publish("beta", &["2.0.0", "3.1.0"])
        .publish("gamma", &["0.3.0"]);

        let report = manager(registry, Box::new(CutoffPolicy::default()))
            .install(&args(&["alpha", "beta", "gamma"]))
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcomes[0].identifier, "alpha");
        assert!(report.outcomes[0].is_success());
        assert!(matches!(
            &report.outcomes[1].result,
            Err(ResolveError::NoValidVersion { found, .. }) if found == &vec!["2.0.0", "3.1.0"]
        ));
        assert!(report.outcomes[2].is_success());
        assert_eq!(report.succeeded().count(), 2);
        assert_eq!(report.failed().count(), 1);

        let mut installs = calls.installs.lock().unwrap().clone();
        installs.sort();
        assert_eq!(installs, vec!["alpha@1.2.0", "gamma@0.3.0"]);
    }

    #[tokio::test]
    async fn lookup_and_install_failures_are_isolated() {
        let registry = FakeRegistry {
            broken_installs: HashSet::from(["alpha@1.0.0".to_string()]),
            ..Default::default()
        }
        .publish("alpha", &["1.0.0"])
        .publish("gamma", &["1.1.0"]);

        let report = manager(registry, Box::new(CutoffPolicy::default()))
            .install(&args(&["alpha", "missing", "gamma"]))
            .await
            .unwrap();

        assert!(matches!(
            &report.outcomes[0].result,
            Err(ResolveError::PackageManager { target, .. }) if target == "alpha@1.0.0"
        ));
        assert!(matches!(
            &report.outcomes[1].result,
            Err(ResolveError::MetadataLookup { .. })
        ));
        assert!(report.outcomes[2].is_success());
    }

    #[tokio::test]
    async fn directory_is_fetched_once_per_batch() {
        let calls = Arc::new(Calls::default());
        let registry = FakeRegistry {
            calls: calls.clone(),
            ..Default::default()
        }
        .publish("containership.plugin.navigator", &["1.0.0"])
        .publish("a", &["1.0.0"])
        .publish("b", &["1.0.0"]);

        manager(registry, Box::new(CutoffPolicy::default()))
            .install(&args(&["navigator", "a", "b"]))
            .await
            .unwrap();

        assert_eq!(calls.directory_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn constraint_is_forwarded_to_registry_query() {
        let calls = Arc::new(Calls::default());
        let registry = FakeRegistry {
            calls: calls.clone(),
            ..Default::default()
        }
        .publish("containership.plugin.navigator", &["1.1.0", "1.2.0"]);

        manager(registry, Box::new(CutoffPolicy::default()))
            .install(&args(&["navigator@^1.1.0"]))
            .await
            .unwrap();

        assert_eq!(
            *calls.views.lock().unwrap(),
            vec!["containership.plugin.navigator@^1.1.0"]
        );
    }

    #[tokio::test]
    async fn metadata_tag_policy_skips_v2_tagged_versions() {
        let registry = FakeRegistry::default().publish_tagged(
            "foo",
            &[("1.0.0", "v1"), ("3.0.0", "v1"), ("3.1.0", "v2")],
        );

        let report = manager(registry, Box::new(MetadataTagPolicy::default()))
            .update(&args(&["foo@9.9.9"]))
            .await
            .unwrap();

        assert_eq!(
            report.outcomes[0].result,
            Ok(PluginAction::Updated(ResolvedPlugin {
                canonical_source: "foo".to_string(),
                selected_version: "3.0.0".to_string(),
            }))
        );
    }

    #[tokio::test]
    async fn uninstall_derives_local_package_name() {
        let calls = Arc::new(Calls::default());
        let registry = FakeRegistry {
            calls: calls.clone(),
            ..Default::default()
        };

        let report = manager(registry, Box::new(CutoffPolicy::default()))
            .uninstall(&args(&["cloud", "navigator", "containership.plugin.other"]))
            .await
            .unwrap();

        assert!(report.is_success());
        let mut removed = calls.uninstalls.lock().unwrap().clone();
        removed.sort();
        assert_eq!(
            removed,
            vec![
                "containership.plugin.cloud",
                "containership.plugin.navigator",
                "containership.plugin.other",
            ]
        );
        assert!(calls.views.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn uninstall_ignores_version_boundary() {
        let report = manager(FakeRegistry::default(), Box::new(CutoffPolicy::default()))
            .uninstall(&args(&["foo@2.5.0"]))
            .await
            .unwrap();
        assert_eq!(
            report.outcomes[0].result,
            Ok(PluginAction::Removed {
                package: "foo".to_string()
            })
        );
    }

    #[tokio::test]
    async fn unavailable_directory_falls_back_to_verbatim_names() {
        let calls = Arc::new(Calls::default());
        let registry = FakeRegistry {
            calls: calls.clone(),
            ..Default::default()
        }
        .publish("navigator", &["1.0.0"]);

        let manager = PluginManager::new(
            Box::new(StaticDirectory::default()),
            Box::new(registry),
            Box::new(CutoffPolicy::default()),
        );
        let report = manager.install(&args(&["navigator"])).await.unwrap();

        assert!(report.is_success());
        assert_eq!(*calls.installs.lock().unwrap(), vec!["navigator@1.0.0"]);
    }

    #[tokio::test]
    async fn lists_installed_plugins_with_display_names() {
        let registry = FakeRegistry {
            installed: BTreeMap::from([
                ("containership.plugin.navigator".to_string(), "1.4.2".to_string()),
                ("left-pad".to_string(), "1.3.0".to_string()),
            ]),
            ..Default::default()
        };

        let installed = manager(registry, Box::new(CutoffPolicy::default()))
            .list_installed()
            .await
            .unwrap();

        assert_eq!(installed.len(), 2);
        assert_eq!(installed[0].display_name, "navigator");
        assert_eq!(installed[0].version, "1.4.2");
        assert_eq!(installed[1].display_name, "left-pad");
    }

    #[tokio::test]
    async fn search_filters_by_pattern() {
        let manager = manager(FakeRegistry::default(), Box::new(CutoffPolicy::default()));

        let all = manager.search(None).await.unwrap();
        assert_eq!(
            all.iter().map(|hit| hit.name.as_str()).collect::<Vec<_>>(),
            vec!["cloud", "navigator"]
        );

        let hits = manager.search(Some("^nav")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].description, "Web interface");

        let err = manager.search(Some("(")).await.unwrap_err();
        assert!(matches!(err, ResolveError::InvalidPattern { .. }));
    }
}
