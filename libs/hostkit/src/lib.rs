//! Hostkit: a modular microservice host.
//!
//! A process boots by assembling a [`config::MutableBootConfiguration`]
//! (which modules and features participate), freezing it, and handing it to
//! a [`host::MicroserviceHost`]. The host wires every feature loader's
//! contributions into a shared [`registry::ComponentRegistry`] and drives
//! the component graph through a strict lifecycle
//! (configure → compile → load → activate → deactivate → unload), fanning
//! out microservice-wide transitions to every registered
//! [`contracts::LifecycleComponent`].

// === PUBLIC API ===
pub use config::{
    BootConfiguration, BootComponentRegistrations, FeatureConfiguration, KERNEL_MODULE_NAME,
    LogLevel, ModuleConfiguration, ModuleList, ModuleLocationMap, MutableBootConfiguration,
};
pub use contracts::{
    BatchJob, BatchJobOutcome, ContributionPhase, FeatureLoader, FeatureLoaderPhaseExtension,
    LifecycleComponent, LifecycleTransition,
};
pub use error::{BootConfigError, HostError, InvalidTriggerError, RegistryError};
pub use host::MicroserviceHost;
pub use machine::{MicroserviceState, MicroserviceStateMachine, MicroserviceTrigger, PhaseActions};
pub use registry::{ComponentRegistry, ComponentRegistryBuilder};

// === MODULES ===
pub mod bootstrap;
pub mod config;
pub mod contracts;
pub mod error;
pub mod host;
pub mod machine;
pub mod registry;

// Re-exported for downstream loaders that spawn cancellable work.
pub use tokio_util::sync::CancellationToken;
