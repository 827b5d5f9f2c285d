//! Boot profiles: declarative module/feature lists loaded from YAML and the
//! process environment.
//!
//! A profile names features; the [`FeatureCatalog`] is the explicit,
//! configuration-time registry that resolves those names to loader
//! instances. Names the catalog cannot resolve stay as name-only entries
//! and are skipped by the host with a debug event.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::config::{LogLevel, ModuleConfiguration, ModuleList, MutableBootConfiguration};
use crate::contracts::FeatureLoader;

/// Environment variable prefix for profile overrides
/// (e.g. `HOSTKIT_LOG_LEVEL=debug`, `HOSTKIT_CLUSTER__NAME=west`).
pub const ENV_PREFIX: &str = "HOSTKIT_";

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("failed to load boot profile")]
    Profile(#[from] figment::Error),

    #[error("invalid stop_timeout '{value}'")]
    InvalidStopTimeout {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
}

/// Explicit registry of feature loaders available to this process.
///
/// Modules ship their loaders as plain values; the process entry point
/// registers them here once, and boot profiles reference them by feature
/// name. This replaces any runtime scanning of binaries.
#[derive(Default)]
pub struct FeatureCatalog {
    loaders: HashMap<String, Arc<dyn FeatureLoader>>,
}

impl FeatureCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader under its feature name. A later registration with
    /// the same name replaces the earlier one.
    pub fn register(&mut self, loader: Arc<dyn FeatureLoader>) {
        self.loaders.insert(loader.name().to_owned(), loader);
    }

    #[must_use]
    pub fn get(&self, feature_name: &str) -> Option<Arc<dyn FeatureLoader>> {
        self.loaders.get(feature_name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl std::fmt::Debug for FeatureCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.loaders.keys().collect();
        names.sort();
        f.debug_struct("FeatureCatalog")
            .field("features", &names)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Profile types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterProfile {
    pub name: String,
    #[serde(default)]
    pub partition: Option<String>,
}

/// One module entry in a boot profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleProfile {
    pub module: String,
    #[serde(default)]
    pub location: Option<PathBuf>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Declarative description of a microservice boot.
///
/// An empty microservice name is not a profile error; boot-configuration
/// validation owns that check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootProfile {
    #[serde(default)]
    pub microservice_name: String,
    #[serde(default)]
    pub precompiled: bool,
    #[serde(default)]
    pub batch_job: bool,
    #[serde(default)]
    pub cluster: Option<ClusterProfile>,
    #[serde(default)]
    pub log_level: LogLevel,
    /// Bound on graceful teardown, in humantime notation (e.g. `"45s"`).
    #[serde(default)]
    pub stop_timeout: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub framework_modules: Vec<ModuleProfile>,
    #[serde(default)]
    pub application_modules: Vec<ModuleProfile>,
    #[serde(default)]
    pub customization_modules: Vec<ModuleProfile>,
}

impl BootProfile {
    /// Load a profile from an optional YAML file, with `HOSTKIT_*`
    /// environment variables layered on top.
    ///
    /// # Errors
    /// Returns [`BootstrapError::Profile`] when the file or environment
    /// cannot be parsed into a valid profile.
    pub fn load(config_file: Option<&Path>) -> Result<Self, BootstrapError> {
        let mut figment = Figment::new();
        if let Some(path) = config_file {
            figment = figment.merge(Yaml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn from_figment(figment: Figment) -> Result<Self, BootstrapError> {
        Ok(figment.extract()?)
    }

    /// Translate the profile into a mutable boot configuration, resolving
    /// feature names through the catalog.
    ///
    /// # Errors
    /// Returns [`BootstrapError::InvalidStopTimeout`] when `stop_timeout`
    /// is not a valid humantime duration.
    pub fn into_boot_configuration(
        self,
        catalog: &FeatureCatalog,
    ) -> Result<MutableBootConfiguration, BootstrapError> {
        let mut config = MutableBootConfiguration::new(self.microservice_name);
        config.is_precompiled_mode = self.precompiled;
        config.is_batch_job_mode = self.batch_job;
        config.log_level = self.log_level;
        if let Some(value) = self.stop_timeout {
            config.stop_timeout = humantime::parse_duration(&value)
                .map_err(|source| BootstrapError::InvalidStopTimeout { value, source })?;
        }
        if let Some(cluster) = self.cluster {
            config.cluster_name = Some(cluster.name);
            config.cluster_partition = cluster.partition;
        }
        for (name, value) in self.env {
            config.set_environment_variable(name, value);
        }

        let lists = [
            (ModuleList::Framework, self.framework_modules),
            (ModuleList::Application, self.application_modules),
            (ModuleList::Customization, self.customization_modules),
        ];
        for (list, modules) in lists {
            for module_profile in modules {
                let mut module = ModuleConfiguration::new(&module_profile.module);
                if let Some(location) = module_profile.location {
                    module = module.with_location(location);
                }
                config.add_module(list, module);
                for feature_name in module_profile.features {
                    match catalog.get(&feature_name) {
                        Some(loader) => config.add_feature_loaders(
                            list,
                            &module_profile.module,
                            [loader],
                        ),
                        None => {
                            config.add_features(list, &module_profile.module, [feature_name]);
                        }
                    }
                }
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ComponentRegistry, ComponentRegistryBuilder};

    struct MetricsFeature;

    impl FeatureLoader for MetricsFeature {
        fn name(&self) -> &str {
            "metrics"
        }

        fn contribute_config_sections(
            &self,
            _new_components: &mut ComponentRegistryBuilder,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        fn contribute_configuration(&self, _existing: &ComponentRegistry) -> anyhow::Result<()> {
            Ok(())
        }

        fn contribute_components(
            &self,
            _existing: &ComponentRegistry,
            _new_components: &mut ComponentRegistryBuilder,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    const PROFILE_YAML: &str = r#"
microservice_name: orders
log_level: debug
cluster:
  name: west
  partition: "7"
env:
  ORDERS_DB: postgres://localhost/orders
application_modules:
  - module: billing
    features: [metrics, invoices]
"#;

    fn parse(yaml: &str) -> BootProfile {
        BootProfile::from_figment(Figment::new().merge(Yaml::string(yaml))).unwrap()
    }

    #[test]
    fn parses_yaml_profile() {
        let profile = parse(PROFILE_YAML);
        assert_eq!(profile.microservice_name, "orders");
        assert_eq!(profile.log_level, LogLevel::Debug);
        assert_eq!(profile.cluster.as_ref().unwrap().name, "west");
        assert_eq!(profile.application_modules.len(), 1);
        assert_eq!(
            profile.application_modules[0].features,
            ["metrics", "invoices"]
        );
    }

    #[test]
    fn unknown_profile_fields_are_rejected() {
        let result =
            BootProfile::from_figment(Figment::new().merge(Yaml::string(
                "microservice_name: orders\nunknown_field: true\n",
            )));
        assert!(result.is_err());
    }

    #[test]
    fn catalog_resolves_feature_names_to_loaders() {
        let mut catalog = FeatureCatalog::new();
        catalog.register(Arc::new(MetricsFeature));

        let profile = parse(PROFILE_YAML);
        let config = profile.into_boot_configuration(&catalog).unwrap();

        let billing = &config.modules(ModuleList::Application)[0];
        assert_eq!(billing.module_name(), "billing");

        let features = billing.features();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].feature_name(), "metrics");
        assert!(features[0].loader().is_some());
        // Unresolved names stay as name-only entries.
        assert_eq!(features[1].feature_name(), "invoices");
        assert!(features[1].loader().is_none());
    }

    #[test]
    fn loads_profile_from_a_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.yaml");
        std::fs::write(&path, "microservice_name: filed\nlog_level: warning\n").unwrap();

        let profile = BootProfile::load(Some(&path)).unwrap();
        assert_eq!(profile.microservice_name, "filed");
        assert_eq!(profile.log_level, LogLevel::Warning);
    }

    #[test]
    fn missing_profile_file_defaults_to_empty_values() {
        let profile = BootProfile::load(None).unwrap();
        assert!(profile.microservice_name.is_empty());
        assert_eq!(profile.log_level, LogLevel::Info);
    }

    #[test]
    fn stop_timeout_is_parsed_as_humantime() {
        let profile = parse("microservice_name: orders\nstop_timeout: 45s\n");
        let config = profile
            .into_boot_configuration(&FeatureCatalog::new())
            .unwrap();
        assert_eq!(config.stop_timeout, std::time::Duration::from_secs(45));

        let profile = parse("microservice_name: orders\nstop_timeout: not-a-duration\n");
        let err = profile
            .into_boot_configuration(&FeatureCatalog::new())
            .unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidStopTimeout { .. }));
    }

    #[test]
    fn profile_scalars_carry_into_configuration() {
        let profile = parse(PROFILE_YAML);
        let config = profile
            .into_boot_configuration(&FeatureCatalog::new())
            .unwrap()
            .freeze()
            .unwrap();

        assert_eq!(config.microservice_name(), "orders");
        assert!(config.is_debug_mode());
        assert!(config.is_clustered_mode());
        assert_eq!(config.cluster_partition(), Some("7"));
        assert_eq!(
            config.environment_variables().get("ORDERS_DB").unwrap(),
            "postgres://localhost/orders"
        );
    }
}
