//! Boot configuration behavior observed through the host.

use std::sync::Arc;

use hostkit::{
    ComponentRegistry, ComponentRegistryBuilder, FeatureLoader, KERNEL_MODULE_NAME,
    MicroserviceHost, ModuleList, MutableBootConfiguration, RegistryError,
};

struct NamedLoader {
    feature: &'static str,
}

impl FeatureLoader for NamedLoader {
    fn name(&self) -> &str {
        self.feature
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

struct OtherLoader;

impl FeatureLoader for OtherLoader {
    fn name(&self) -> &str {
        "telemetry"
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

#[test]
fn loaders_are_deduplicated_by_type_identity() {
    let mut config = MutableBootConfiguration::new("dedup-test");
    config.add_feature_loaders(
        ModuleList::Application,
        "metrics-mod",
        [
            Arc::new(NamedLoader { feature: "metrics" }) as Arc<dyn FeatureLoader>,
            // Same concrete type under a different feature name: dropped.
            Arc::new(NamedLoader {
                feature: "metrics-extra",
            }) as Arc<dyn FeatureLoader>,
        ],
    );
    assert_eq!(config.modules(ModuleList::Application)[0].features().len(), 1);
}

#[test]
fn loaders_are_deduplicated_by_feature_name() {
    let mut config = MutableBootConfiguration::new("dedup-test");
    config.add_features(ModuleList::Application, "telemetry-mod", ["telemetry"]);
    config.add_feature_loaders(
        ModuleList::Application,
        "telemetry-mod",
        [Arc::new(OtherLoader) as Arc<dyn FeatureLoader>],
    );

    let features = config.modules(ModuleList::Application)[0].features();
    assert_eq!(features.len(), 1);
    // The earlier name-only entry wins; the loader-backed duplicate is dropped.
    assert!(features[0].loader().is_none());
}

#[test]
fn frozen_configuration_lists_kernel_module_first() {
    let mut config = MutableBootConfiguration::new("kernel-test");
    config.add_features(ModuleList::Framework, "http-stack", ["router"]);
    let frozen = config.freeze().unwrap();

    let names: Vec<_> = frozen
        .framework_modules()
        .iter()
        .map(|m| m.module_name())
        .collect();
    assert_eq!(names, [KERNEL_MODULE_NAME, "http-stack"]);
}

#[test]
fn environment_variables_are_exposed_read_only() {
    let mut config = MutableBootConfiguration::new("env-test");
    config.set_environment_variable("REGION", "eu-west-1");
    let frozen = config.freeze().unwrap();

    assert_eq!(
        frozen.environment_variables().get("REGION").unwrap(),
        "eu-west-1"
    );
}

#[tokio::test]
async fn registry_is_sealed_after_the_loading_phase() {
    let config = MutableBootConfiguration::new("seal-test");
    let host = MicroserviceHost::new(config.freeze().unwrap());

    host.configure().await.unwrap();
    host.compile().await.unwrap();

    let registry = host.components();
    assert!(!registry.is_sealed());

    host.load().await.unwrap();
    assert!(registry.is_sealed());

    let mut builder = ComponentRegistryBuilder::new();
    builder.register_value(1_u8);
    assert!(matches!(
        registry.apply(builder).unwrap_err(),
        RegistryError::Sealed
    ));
}
