use crate::contracts::ContributionPhase;
use crate::machine::{MicroserviceState, MicroserviceTrigger};

/// Errors raised while validating a boot configuration, before any phase runs.
///
/// These are fatal to startup and never retried.
#[derive(Debug, thiserror::Error)]
pub enum BootConfigError {
    #[error("microservice name is not specified")]
    MicroserviceNameNotSpecified,

    #[error("kernel module '{module_name}' is listed but is not the first framework module")]
    KernelModuleItemInvalidLocation { module_name: String },

    #[error("module '{module_name}' is listed multiple times")]
    ModuleListedMultipleTimes { module_name: String },
}

impl BootConfigError {
    #[must_use]
    pub fn kernel_module_invalid_location(module_name: impl Into<String>) -> Self {
        Self::KernelModuleItemInvalidLocation {
            module_name: module_name.into(),
        }
    }

    #[must_use]
    pub fn module_listed_multiple_times(module_name: impl Into<String>) -> Self {
        Self::ModuleListedMultipleTimes {
            module_name: module_name.into(),
        }
    }
}

/// Errors from the component registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no component registered for type {type_name}")]
    NotRegistered { type_name: &'static str },

    #[error("component registry is sealed; registrations are only accepted during boot")]
    Sealed,
}

/// Error returned when a trigger is fired in a state that does not accept it.
///
/// Attempting to drive a terminal machine (including `Faulted`) is reported
/// explicitly rather than silently executing a phase.
#[derive(Debug, thiserror::Error)]
#[error("trigger '{trigger}' is not valid in state '{state}'")]
pub struct InvalidTriggerError {
    pub state: MicroserviceState,
    pub trigger: MicroserviceTrigger,
}

/// Errors raised by the microservice host while driving the lifecycle.
///
/// All wrapped failures propagate to the state machine as a `Failed` trigger,
/// driving it to the terminal `Faulted` state; there is no retry.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    BootConfig(#[from] BootConfigError),

    #[error("feature loader '{loader}' failed during {phase}")]
    FeatureLoaderFailed {
        loader: String,
        phase: ContributionPhase,
        #[source]
        source: anyhow::Error,
    },

    #[error("phase extension of feature loader '{loader}' failed around {phase}")]
    PhaseExtensionFailed {
        loader: String,
        phase: ContributionPhase,
        #[source]
        source: anyhow::Error,
    },

    #[error("lifecycle component '{component}' failed in {method}")]
    LifecycleComponentFailed {
        component: String,
        method: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("batch job failed")]
    BatchJobFailed {
        #[source]
        source: anyhow::Error,
    },

    #[error("shutdown did not complete within {}", humantime::format_duration(*timeout))]
    ShutdownTimedOut { timeout: std::time::Duration },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    InvalidTrigger(#[from] InvalidTriggerError),

    #[error("microservice host is faulted")]
    Faulted,
}

impl HostError {
    #[must_use]
    pub fn feature_loader_failed(
        loader: impl Into<String>,
        phase: ContributionPhase,
        source: anyhow::Error,
    ) -> Self {
        Self::FeatureLoaderFailed {
            loader: loader.into(),
            phase,
            source,
        }
    }

    #[must_use]
    pub fn phase_extension_failed(
        loader: impl Into<String>,
        phase: ContributionPhase,
        source: anyhow::Error,
    ) -> Self {
        Self::PhaseExtensionFailed {
            loader: loader.into(),
            phase,
            source,
        }
    }

    #[must_use]
    pub fn lifecycle_component_failed(
        component: impl Into<String>,
        method: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self::LifecycleComponentFailed {
            component: component.into(),
            method,
            source,
        }
    }
}
