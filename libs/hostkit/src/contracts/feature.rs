//! Feature contribution protocol.
//!
//! A feature loader is the boot-time face of a feature: it contributes
//! configuration and components to the shared registry across six ordered
//! steps. The host drives the steps breadth-first: every loader completes
//! step N before any loader sees step N+1.

use crate::registry::{ComponentRegistry, ComponentRegistryBuilder};

/// The six feature-contribution steps, in their fixed invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContributionPhase {
    ConfigSections,
    Configuration,
    Components,
    AdapterComponents,
    CompileComponents,
    CompiledComponents,
}

impl ContributionPhase {
    /// All six steps in invocation order.
    pub const ALL: [Self; 6] = [
        Self::ConfigSections,
        Self::Configuration,
        Self::Components,
        Self::AdapterComponents,
        Self::CompileComponents,
        Self::CompiledComponents,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigSections => "contribute_config_sections",
            Self::Configuration => "contribute_configuration",
            Self::Components => "contribute_components",
            Self::AdapterComponents => "contribute_adapter_components",
            Self::CompileComponents => "compile_components",
            Self::CompiledComponents => "contribute_compiled_components",
        }
    }
}

impl std::fmt::Display for ContributionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boot-time contributor of configuration and components for one feature.
///
/// The first three steps are the minimal required capability; the remaining
/// three default to no-ops. Loaders are invoked strictly sequentially and
/// must not assume any other loader has run within the same step.
///
/// Any error returned from a step fails the whole contribution phase; the
/// host wraps it with the loader's type name and the step it failed in.
pub trait FeatureLoader: Send + Sync {
    /// Feature name this loader provides. Unique within a module.
    fn name(&self) -> &str;

    /// Type name of the concrete loader, used for diagnostics and for
    /// loader-identity deduplication in the boot configuration.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Step 1: register configuration-section components.
    ///
    /// # Errors
    /// Any error fails the Configuring phase.
    fn contribute_config_sections(
        &self,
        new_components: &mut ComponentRegistryBuilder,
    ) -> anyhow::Result<()>;

    /// Step 2: populate configuration values from the built sections.
    ///
    /// # Errors
    /// Any error fails the Configuring phase.
    fn contribute_configuration(&self, existing: &ComponentRegistry) -> anyhow::Result<()>;

    /// Step 3: register the feature's components.
    ///
    /// # Errors
    /// Any error fails the Compiling phase.
    fn contribute_components(
        &self,
        existing: &ComponentRegistry,
        new_components: &mut ComponentRegistryBuilder,
    ) -> anyhow::Result<()>;

    /// Step 4: register adapter components bridging to other features.
    ///
    /// # Errors
    /// Any error fails the Compiling phase.
    fn contribute_adapter_components(
        &self,
        existing: &ComponentRegistry,
        new_components: &mut ComponentRegistryBuilder,
    ) -> anyhow::Result<()> {
        let _ = (existing, new_components);
        Ok(())
    }

    /// Step 5: perform component compilation work. Skipped entirely when the
    /// boot configuration is in precompiled mode.
    ///
    /// # Errors
    /// Any error fails the Compiling phase.
    fn compile_components(&self, existing: &ComponentRegistry) -> anyhow::Result<()> {
        let _ = existing;
        Ok(())
    }

    /// Step 6: register components produced by compilation.
    ///
    /// # Errors
    /// Any error fails the Loading phase.
    fn contribute_compiled_components(
        &self,
        existing: &ComponentRegistry,
        new_components: &mut ComponentRegistryBuilder,
    ) -> anyhow::Result<()> {
        let _ = (existing, new_components);
        Ok(())
    }

    /// Optional phase-extension capability. A loader that also wants to
    /// observe step boundaries returns `Some(self)`.
    fn phase_extension(&self) -> Option<&dyn FeatureLoaderPhaseExtension> {
        None
    }
}

/// Observer of contribution-step boundaries.
///
/// Before each of the six steps (and after the sixth) the host invokes the
/// matching hook on every registered extension, regardless of which loader
/// is being processed. Hooks observe only; they alter the outcome solely by
/// returning an error, which fails the enclosing phase.
pub trait FeatureLoaderPhaseExtension: Send + Sync {
    /// # Errors
    /// Any error fails the Configuring phase.
    fn before_contribute_config_sections(
        &self,
        components: &ComponentRegistry,
    ) -> anyhow::Result<()> {
        let _ = components;
        Ok(())
    }

    /// # Errors
    /// Any error fails the Configuring phase.
    fn before_contribute_configuration(&self, components: &ComponentRegistry) -> anyhow::Result<()> {
        let _ = components;
        Ok(())
    }

    /// # Errors
    /// Any error fails the Compiling phase.
    fn before_contribute_components(&self, components: &ComponentRegistry) -> anyhow::Result<()> {
        let _ = components;
        Ok(())
    }

    /// # Errors
    /// Any error fails the Compiling phase.
    fn before_contribute_adapter_components(
        &self,
        components: &ComponentRegistry,
    ) -> anyhow::Result<()> {
        let _ = components;
        Ok(())
    }

    /// # Errors
    /// Any error fails the Compiling phase.
    fn before_compile_components(&self, components: &ComponentRegistry) -> anyhow::Result<()> {
        let _ = components;
        Ok(())
    }

    /// # Errors
    /// Any error fails the Loading phase.
    fn before_contribute_compiled_components(
        &self,
        components: &ComponentRegistry,
    ) -> anyhow::Result<()> {
        let _ = components;
        Ok(())
    }

    /// Invoked once after every loader has finished the sixth step.
    ///
    /// # Errors
    /// Any error fails the Loading phase.
    fn after_contribute_compiled_components(
        &self,
        components: &ComponentRegistry,
    ) -> anyhow::Result<()> {
        let _ = components;
        Ok(())
    }
}
