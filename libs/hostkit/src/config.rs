//! Boot configuration: which modules and features participate in a boot.
//!
//! A [`MutableBootConfiguration`] is assembled by the process entry point,
//! validated exactly once, and frozen into an immutable [`BootConfiguration`]
//! the host consumes. Validation auto-repairs a missing kernel-module entry
//! and a missing module-location map; name collisions and a misplaced kernel
//! module are hard errors.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::contracts::FeatureLoader;
use crate::error::BootConfigError;
use crate::registry::ComponentRegistryBuilder;

/// Default bound on graceful teardown (Deactivate→Unload) in daemon mode.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default name of the mandatory, always-first framework module.
///
/// The kernel module identity is a plain configuration value threaded through
/// the boot configuration; override it with
/// [`MutableBootConfiguration::set_kernel_module_name`] when embedding the
/// host under a different kernel.
pub const KERNEL_MODULE_NAME: &str = "hostkit-kernel";

/// Severity threshold for the host's structured log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Verbose,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    #[must_use]
    pub fn is_debug(self) -> bool {
        self == Self::Debug
    }
}

// ---------------------------------------------------------------------------
// Module location map
// ---------------------------------------------------------------------------

/// Maps a module name to a loadable binary location.
///
/// Explicit entries win; otherwise the scan directories are probed for a
/// conventionally-named library file. The default map holds only the
/// process's base directory.
#[derive(Debug, Clone, Default)]
pub struct ModuleLocationMap {
    entries: BTreeMap<String, PathBuf>,
    directories: Vec<PathBuf>,
}

impl ModuleLocationMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A map scanning the directory of the running executable, falling back
    /// to the current working directory when the executable path is unknown.
    #[must_use]
    pub fn default_for_process() -> Self {
        let base = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut map = Self::new();
        map.add_directory(base);
        map
    }

    pub fn add_entry(&mut self, module_name: impl Into<String>, location: impl Into<PathBuf>) {
        self.entries.insert(module_name.into(), location.into());
    }

    pub fn add_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directories.push(directory.into());
    }

    #[must_use]
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Resolve a module name to a binary location, if one is known.
    #[must_use]
    pub fn resolve(&self, module_name: &str) -> Option<PathBuf> {
        if let Some(location) = self.entries.get(module_name) {
            return Some(location.clone());
        }
        for dir in &self.directories {
            for candidate in [
                format!("lib{module_name}.so"),
                format!("{module_name}.dll"),
                format!("lib{module_name}.dylib"),
            ] {
                let path = dir.join(candidate);
                if path.exists() {
                    return Some(path);
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Features and modules
// ---------------------------------------------------------------------------

/// One feature listed under a module: a name, and optionally the loader
/// instance that provides it.
///
/// Entries without a loader instance come from name-only boot profiles; the
/// host skips them with a debug event, since loader discovery is an explicit
/// configuration-time concern.
#[derive(Clone)]
pub struct FeatureConfiguration {
    feature_name: String,
    loader: Option<Arc<dyn FeatureLoader>>,
}

impl FeatureConfiguration {
    #[must_use]
    pub fn named(feature_name: impl Into<String>) -> Self {
        Self {
            feature_name: feature_name.into(),
            loader: None,
        }
    }

    #[must_use]
    pub fn with_loader(loader: Arc<dyn FeatureLoader>) -> Self {
        Self {
            feature_name: loader.name().to_owned(),
            loader: Some(loader),
        }
    }

    #[must_use]
    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }

    #[must_use]
    pub fn loader(&self) -> Option<&Arc<dyn FeatureLoader>> {
        self.loader.as_ref()
    }

    #[must_use]
    pub fn loader_type_name(&self) -> Option<&'static str> {
        self.loader.as_ref().map(|l| l.type_name())
    }
}

impl std::fmt::Debug for FeatureConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureConfiguration")
            .field("feature_name", &self.feature_name)
            .field("loader_type", &self.loader_type_name())
            .finish()
    }
}

/// A named unit of deployable code contributing one or more features.
#[derive(Debug, Clone)]
pub struct ModuleConfiguration {
    module_name: String,
    location: Option<PathBuf>,
    features: Vec<FeatureConfiguration>,
}

impl ModuleConfiguration {
    #[must_use]
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            location: None,
            features: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    #[must_use]
    pub fn features(&self) -> &[FeatureConfiguration] {
        &self.features
    }

    /// Add a feature entry unless an entry with the same name (or, for
    /// loader-backed entries, the same loader type) already exists.
    pub fn add_feature(&mut self, feature: FeatureConfiguration) {
        let duplicate = self.features.iter().any(|existing| {
            existing.feature_name() == feature.feature_name()
                || (feature.loader_type_name().is_some()
                    && existing.loader_type_name() == feature.loader_type_name())
        });
        if !duplicate {
            self.features.push(feature);
        }
    }
}

/// Selects one of the three module lists of a boot configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleList {
    Framework,
    Application,
    Customization,
}

// ---------------------------------------------------------------------------
// Boot component registrations
// ---------------------------------------------------------------------------

type BootRegistration = Box<dyn Fn(&mut ComponentRegistryBuilder) + Send + Sync>;

/// Component registrations supplied by the process entry point, applied
/// before any feature loader contributes (first thing in the Configuring
/// phase).
#[derive(Default)]
pub struct BootComponentRegistrations {
    registrations: Vec<BootRegistration>,
}

impl BootComponentRegistrations {
    pub fn register<F>(&mut self, registration: F)
    where
        F: Fn(&mut ComponentRegistryBuilder) + Send + Sync + 'static,
    {
        self.registrations.push(Box::new(registration));
    }

    pub fn contribute(&self, builder: &mut ComponentRegistryBuilder) {
        for registration in &self.registrations {
            registration(builder);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl std::fmt::Debug for BootComponentRegistrations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootComponentRegistrations")
            .field("count", &self.registrations.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Mutable boot configuration
// ---------------------------------------------------------------------------

/// Mutable builder for the boot configuration.
///
/// Call [`MutableBootConfiguration::validate`] (directly, or through
/// [`MutableBootConfiguration::freeze`]) exactly once before handing the
/// configuration to the host.
#[derive(Debug)]
pub struct MutableBootConfiguration {
    pub microservice_name: String,
    pub is_precompiled_mode: bool,
    pub is_batch_job_mode: bool,
    pub cluster_name: Option<String>,
    pub cluster_partition: Option<String>,
    pub log_level: LogLevel,
    pub stop_timeout: Duration,
    kernel_module_name: String,
    module_location_map: Option<ModuleLocationMap>,
    framework_modules: Vec<ModuleConfiguration>,
    application_modules: Vec<ModuleConfiguration>,
    customization_modules: Vec<ModuleConfiguration>,
    environment_variables: BTreeMap<String, String>,
    boot_components: BootComponentRegistrations,
}

impl MutableBootConfiguration {
    #[must_use]
    pub fn new(microservice_name: impl Into<String>) -> Self {
        Self {
            microservice_name: microservice_name.into(),
            is_precompiled_mode: false,
            is_batch_job_mode: false,
            cluster_name: None,
            cluster_partition: None,
            log_level: LogLevel::Info,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            kernel_module_name: KERNEL_MODULE_NAME.to_owned(),
            module_location_map: None,
            framework_modules: Vec::new(),
            application_modules: Vec::new(),
            customization_modules: Vec::new(),
            environment_variables: BTreeMap::new(),
            boot_components: BootComponentRegistrations::default(),
        }
    }

    /// Override the kernel-module identity for this process.
    pub fn set_kernel_module_name(&mut self, name: impl Into<String>) {
        self.kernel_module_name = name.into();
    }

    #[must_use]
    pub fn kernel_module_name(&self) -> &str {
        &self.kernel_module_name
    }

    pub fn set_module_location_map(&mut self, map: ModuleLocationMap) {
        self.module_location_map = Some(map);
    }

    pub fn set_environment_variable(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.environment_variables.insert(name.into(), value.into());
    }

    pub fn register_boot_component<F>(&mut self, registration: F)
    where
        F: Fn(&mut ComponentRegistryBuilder) + Send + Sync + 'static,
    {
        self.boot_components.register(registration);
    }

    #[must_use]
    pub fn modules(&self, list: ModuleList) -> &[ModuleConfiguration] {
        match list {
            ModuleList::Framework => &self.framework_modules,
            ModuleList::Application => &self.application_modules,
            ModuleList::Customization => &self.customization_modules,
        }
    }

    fn modules_mut(&mut self, list: ModuleList) -> &mut Vec<ModuleConfiguration> {
        match list {
            ModuleList::Framework => &mut self.framework_modules,
            ModuleList::Application => &mut self.application_modules,
            ModuleList::Customization => &mut self.customization_modules,
        }
    }

    /// Add a fully-described module entry unless one with the same name is
    /// already listed.
    pub fn add_module(&mut self, list: ModuleList, module: ModuleConfiguration) {
        let modules = self.modules_mut(list);
        if !modules
            .iter()
            .any(|m| m.module_name() == module.module_name())
        {
            modules.push(module);
        }
    }

    /// Idempotently ensure a module entry exists, then idempotently add
    /// name-only feature entries to it.
    pub fn add_features<I, S>(&mut self, list: ModuleList, module_name: &str, feature_names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let module = Self::module_entry(self.modules_mut(list), module_name);
        for feature_name in feature_names {
            module.add_feature(FeatureConfiguration::named(feature_name));
        }
    }

    /// Idempotently ensure a module entry exists, then idempotently add
    /// loader-backed feature entries (deduplicated by feature name or by
    /// loader type identity).
    pub fn add_feature_loaders<I>(&mut self, list: ModuleList, module_name: &str, loaders: I)
    where
        I: IntoIterator<Item = Arc<dyn FeatureLoader>>,
    {
        let module = Self::module_entry(self.modules_mut(list), module_name);
        for loader in loaders {
            module.add_feature(FeatureConfiguration::with_loader(loader));
        }
    }

    fn module_entry<'a>(
        modules: &'a mut Vec<ModuleConfiguration>,
        module_name: &str,
    ) -> &'a mut ModuleConfiguration {
        let index = match modules.iter().position(|m| m.module_name() == module_name) {
            Some(index) => index,
            None => {
                modules.push(ModuleConfiguration::new(module_name));
                modules.len() - 1
            }
        };
        &mut modules[index]
    }

    /// Validate the configuration, auto-repairing a missing kernel-module
    /// entry and a missing module-location map.
    ///
    /// # Errors
    /// - [`BootConfigError::MicroserviceNameNotSpecified`] when the name is
    ///   empty (checked first; no list is modified in that case).
    /// - [`BootConfigError::KernelModuleItemInvalidLocation`] when a
    ///   kernel-module entry exists in the framework list but is not first.
    /// - [`BootConfigError::ModuleListedMultipleTimes`] when two modules in
    ///   any combination of the three lists share a name (exact,
    ///   case-sensitive comparison).
    pub fn validate(&mut self) -> Result<(), BootConfigError> {
        if self.microservice_name.is_empty() {
            return Err(BootConfigError::MicroserviceNameNotSpecified);
        }

        self.validate_kernel_module()?;
        self.validate_unique_module_names()?;

        if self.module_location_map.is_none() {
            self.module_location_map = Some(ModuleLocationMap::default_for_process());
        }
        Ok(())
    }

    fn validate_kernel_module(&mut self) -> Result<(), BootConfigError> {
        let kernel = self.kernel_module_name.clone();
        if self.framework_modules.is_empty() {
            self.framework_modules.push(ModuleConfiguration::new(&kernel));
        } else if self.framework_modules[0].module_name() != kernel {
            if self
                .framework_modules
                .iter()
                .any(|m| m.module_name() == kernel)
            {
                return Err(BootConfigError::kernel_module_invalid_location(kernel));
            }
            self.framework_modules
                .insert(0, ModuleConfiguration::new(&kernel));
        }
        Ok(())
    }

    fn validate_unique_module_names(&self) -> Result<(), BootConfigError> {
        let mut unique = HashSet::new();
        let all_listed = self
            .framework_modules
            .iter()
            .chain(&self.application_modules)
            .chain(&self.customization_modules);

        for module in all_listed {
            if !unique.insert(module.module_name()) {
                return Err(BootConfigError::module_listed_multiple_times(
                    module.module_name(),
                ));
            }
        }
        Ok(())
    }

    /// Validate and convert into the immutable form the host consumes.
    ///
    /// # Errors
    /// Propagates any [`BootConfigError`] from
    /// [`MutableBootConfiguration::validate`].
    pub fn freeze(mut self) -> Result<BootConfiguration, BootConfigError> {
        self.validate()?;
        Ok(BootConfiguration {
            microservice_name: self.microservice_name,
            is_precompiled_mode: self.is_precompiled_mode,
            is_batch_job_mode: self.is_batch_job_mode,
            cluster_name: self.cluster_name,
            cluster_partition: self.cluster_partition,
            log_level: self.log_level,
            stop_timeout: self.stop_timeout,
            kernel_module_name: self.kernel_module_name,
            module_location_map: self.module_location_map.unwrap_or_default(),
            framework_modules: self.framework_modules,
            application_modules: self.application_modules,
            customization_modules: self.customization_modules,
            environment_variables: self.environment_variables,
            boot_components: self.boot_components,
        })
    }
}

// ---------------------------------------------------------------------------
// Immutable boot configuration
// ---------------------------------------------------------------------------

/// Immutable-after-validation boot configuration consumed by the host.
#[derive(Debug)]
pub struct BootConfiguration {
    microservice_name: String,
    is_precompiled_mode: bool,
    is_batch_job_mode: bool,
    cluster_name: Option<String>,
    cluster_partition: Option<String>,
    log_level: LogLevel,
    stop_timeout: Duration,
    kernel_module_name: String,
    module_location_map: ModuleLocationMap,
    framework_modules: Vec<ModuleConfiguration>,
    application_modules: Vec<ModuleConfiguration>,
    customization_modules: Vec<ModuleConfiguration>,
    environment_variables: BTreeMap<String, String>,
    boot_components: BootComponentRegistrations,
}

impl BootConfiguration {
    #[must_use]
    pub fn microservice_name(&self) -> &str {
        &self.microservice_name
    }

    #[must_use]
    pub fn is_precompiled_mode(&self) -> bool {
        self.is_precompiled_mode
    }

    #[must_use]
    pub fn is_batch_job_mode(&self) -> bool {
        self.is_batch_job_mode
    }

    #[must_use]
    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    #[must_use]
    pub fn cluster_partition(&self) -> Option<&str> {
        self.cluster_partition.as_deref()
    }

    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    #[must_use]
    pub fn is_debug_mode(&self) -> bool {
        self.log_level.is_debug()
    }

    /// Presence of a cluster name implies clustered mode.
    #[must_use]
    pub fn is_clustered_mode(&self) -> bool {
        self.cluster_name.as_deref().is_some_and(|name| !name.is_empty())
    }

    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    #[must_use]
    pub fn kernel_module_name(&self) -> &str {
        &self.kernel_module_name
    }

    #[must_use]
    pub fn module_location_map(&self) -> &ModuleLocationMap {
        &self.module_location_map
    }

    #[must_use]
    pub fn framework_modules(&self) -> &[ModuleConfiguration] {
        &self.framework_modules
    }

    #[must_use]
    pub fn application_modules(&self) -> &[ModuleConfiguration] {
        &self.application_modules
    }

    #[must_use]
    pub fn customization_modules(&self) -> &[ModuleConfiguration] {
        &self.customization_modules
    }

    /// All modules in contribution order: framework, then application, then
    /// customization, each list in its declared order.
    pub fn all_modules(&self) -> impl Iterator<Item = &ModuleConfiguration> {
        self.framework_modules
            .iter()
            .chain(&self.application_modules)
            .chain(&self.customization_modules)
    }

    #[must_use]
    pub fn environment_variables(&self) -> &BTreeMap<String, String> {
        &self.environment_variables
    }

    #[must_use]
    pub fn boot_components(&self) -> &BootComponentRegistrations {
        &self.boot_components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_inserts_kernel_module_when_framework_list_is_empty() {
        let mut config = MutableBootConfiguration::new("my-service");
        config.validate().unwrap();

        let frameworks = config.modules(ModuleList::Framework);
        assert_eq!(frameworks.len(), 1);
        assert_eq!(frameworks[0].module_name(), KERNEL_MODULE_NAME);
    }

    #[test]
    fn validate_inserts_kernel_module_before_other_framework_modules() {
        let mut config = MutableBootConfiguration::new("my-service");
        config.add_features(ModuleList::Framework, "http-stack", ["router"]);
        config.validate().unwrap();

        let frameworks = config.modules(ModuleList::Framework);
        assert_eq!(frameworks[0].module_name(), KERNEL_MODULE_NAME);
        assert_eq!(frameworks[1].module_name(), "http-stack");
    }

    #[test]
    fn validate_rejects_misplaced_kernel_module() {
        let mut config = MutableBootConfiguration::new("my-service");
        config.add_features(ModuleList::Framework, "http-stack", ["router"]);
        config.add_features(ModuleList::Framework, KERNEL_MODULE_NAME, ["kernel"]);

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            BootConfigError::KernelModuleItemInvalidLocation { .. }
        ));
    }

    #[test]
    fn validate_rejects_empty_microservice_name_without_touching_modules() {
        let mut config = MutableBootConfiguration::new("");
        config.add_features(ModuleList::Application, "billing", ["invoices"]);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, BootConfigError::MicroserviceNameNotSpecified));
        // Auto-repair must not have run: framework list untouched.
        assert!(config.modules(ModuleList::Framework).is_empty());
        assert_eq!(config.modules(ModuleList::Application).len(), 1);
    }

    #[test]
    fn validate_rejects_duplicate_module_names_across_lists() {
        let mut config = MutableBootConfiguration::new("my-service");
        config.add_features(ModuleList::Application, "billing", ["invoices"]);
        config.add_features(ModuleList::Customization, "billing", ["branding"]);

        let err = config.validate().unwrap_err();
        match err {
            BootConfigError::ModuleListedMultipleTimes { module_name } => {
                assert_eq!(module_name, "billing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn module_name_comparison_is_case_sensitive() {
        let mut config = MutableBootConfiguration::new("my-service");
        config.add_features(ModuleList::Application, "Billing", ["invoices"]);
        config.add_features(ModuleList::Customization, "billing", ["branding"]);

        config.validate().unwrap();
    }

    #[test]
    fn add_features_is_idempotent_per_feature_name() {
        let mut config = MutableBootConfiguration::new("my-service");
        config.add_features(ModuleList::Application, "billing", ["invoices"]);
        config.add_features(ModuleList::Application, "billing", ["invoices", "tax"]);

        let modules = config.modules(ModuleList::Application);
        assert_eq!(modules.len(), 1);
        let names: Vec<_> = modules[0]
            .features()
            .iter()
            .map(FeatureConfiguration::feature_name)
            .collect();
        assert_eq!(names, ["invoices", "tax"]);
    }

    #[test]
    fn clustered_mode_follows_cluster_name() {
        let mut config = MutableBootConfiguration::new("my-service");
        config.cluster_name = Some("west".to_owned());
        let frozen = config.freeze().unwrap();
        assert!(frozen.is_clustered_mode());

        let standalone = MutableBootConfiguration::new("my-service")
            .freeze()
            .unwrap();
        assert!(!standalone.is_clustered_mode());
    }

    #[test]
    fn debug_mode_follows_log_level() {
        let mut config = MutableBootConfiguration::new("my-service");
        config.log_level = LogLevel::Debug;
        assert!(config.freeze().unwrap().is_debug_mode());
    }

    #[test]
    fn location_map_prefers_explicit_entries() {
        let mut map = ModuleLocationMap::new();
        map.add_entry("billing", "/opt/modules/libbilling.so");
        assert_eq!(
            map.resolve("billing").unwrap(),
            PathBuf::from("/opt/modules/libbilling.so")
        );
        assert!(map.resolve("unknown").is_none());
    }
}
