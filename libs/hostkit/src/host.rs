//! Microservice host: composes the boot configuration, the contribution
//! pipeline, the component registry, and the lifecycle state machine.
//!
//! The host owns a validated [`BootConfiguration`], builds the ordered
//! feature-loader list from it, and supplies the phase actions the state
//! machine executes. Contribution fan-out within a phase is strictly
//! sequential (the builder is not thread-safe); lifecycle fan-out within a
//! pass is sequential in registry-resolution order.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BootConfiguration;
use crate::contracts::{
    BatchJob, BatchJobOutcome, ContributionPhase, FeatureLoader, LifecycleComponent,
    LifecycleTransition,
};
use crate::error::HostError;
use crate::machine::{
    MicroserviceState, MicroserviceStateMachine, MicroserviceTrigger, PhaseActions,
};
use crate::registry::{ComponentRegistry, ComponentRegistryBuilder};

struct LoaderEntry {
    module_name: String,
    loader: Arc<dyn FeatureLoader>,
}

/// Lifecycle fan-out passes, in delivery order.
#[derive(Debug, Clone, Copy)]
enum Pass {
    Announce,
    Work,
    Done,
}

// ---------------------------------------------------------------------------
// Host internals shared with the phase actions
// ---------------------------------------------------------------------------

struct HostInner {
    boot_config: BootConfiguration,
    registry: Arc<ComponentRegistry>,
    loaders: Vec<LoaderEntry>,
    lifecycle_components: OnceLock<Vec<Arc<dyn LifecycleComponent>>>,
    last_error: parking_lot::Mutex<Option<HostError>>,
    stop: CancellationToken,
}

impl HostInner {
    // -- contribution pipeline ---------------------------------------------

    fn run_before_hooks(&self, phase: ContributionPhase) -> Result<(), HostError> {
        for entry in &self.loaders {
            if let Some(extension) = entry.loader.phase_extension() {
                debug!(
                    loader = entry.loader.type_name(),
                    step = %phase,
                    "running phase-extension before hook"
                );
                let result = match phase {
                    ContributionPhase::ConfigSections => {
                        extension.before_contribute_config_sections(&self.registry)
                    }
                    ContributionPhase::Configuration => {
                        extension.before_contribute_configuration(&self.registry)
                    }
                    ContributionPhase::Components => {
                        extension.before_contribute_components(&self.registry)
                    }
                    ContributionPhase::AdapterComponents => {
                        extension.before_contribute_adapter_components(&self.registry)
                    }
                    ContributionPhase::CompileComponents => {
                        extension.before_compile_components(&self.registry)
                    }
                    ContributionPhase::CompiledComponents => {
                        extension.before_contribute_compiled_components(&self.registry)
                    }
                };
                result.map_err(|e| {
                    HostError::phase_extension_failed(entry.loader.type_name(), phase, e)
                })?;
            }
        }
        Ok(())
    }

    fn run_after_hooks(&self) -> Result<(), HostError> {
        for entry in &self.loaders {
            if let Some(extension) = entry.loader.phase_extension() {
                debug!(
                    loader = entry.loader.type_name(),
                    "running phase-extension after hook"
                );
                extension
                    .after_contribute_compiled_components(&self.registry)
                    .map_err(|e| {
                        HostError::phase_extension_failed(
                            entry.loader.type_name(),
                            ContributionPhase::CompiledComponents,
                            e,
                        )
                    })?;
            }
        }
        Ok(())
    }

    /// Run one contribution step breadth-first across all loaders, then merge
    /// the collected registrations into the registry.
    fn run_contribution_step(&self, phase: ContributionPhase) -> Result<(), HostError> {
        info!(step = %phase, loaders = self.loaders.len(), "running contribution step");
        self.run_before_hooks(phase)?;

        if phase == ContributionPhase::CompileComponents && self.boot_config.is_precompiled_mode() {
            info!("precompiled mode: component compilation skipped");
            return Ok(());
        }

        let mut builder = ComponentRegistryBuilder::new();
        for entry in &self.loaders {
            debug!(
                loader = entry.loader.type_name(),
                feature = entry.loader.name(),
                module = entry.module_name,
                step = %phase,
                "invoking feature loader"
            );
            let result = match phase {
                ContributionPhase::ConfigSections => {
                    entry.loader.contribute_config_sections(&mut builder)
                }
                ContributionPhase::Configuration => {
                    entry.loader.contribute_configuration(&self.registry)
                }
                ContributionPhase::Components => entry
                    .loader
                    .contribute_components(&self.registry, &mut builder),
                ContributionPhase::AdapterComponents => entry
                    .loader
                    .contribute_adapter_components(&self.registry, &mut builder),
                ContributionPhase::CompileComponents => {
                    entry.loader.compile_components(&self.registry)
                }
                ContributionPhase::CompiledComponents => entry
                    .loader
                    .contribute_compiled_components(&self.registry, &mut builder),
            };
            result.map_err(|e| {
                HostError::feature_loader_failed(entry.loader.type_name(), phase, e)
            })?;
        }

        if !builder.is_empty() {
            let count = self.registry.apply(builder)?;
            debug!(count, step = %phase, "merged contributed components");
        }
        Ok(())
    }

    // -- phase bodies ------------------------------------------------------

    fn configure(&self) -> Result<(), HostError> {
        if !self.boot_config.boot_components().is_empty() {
            let mut builder = ComponentRegistryBuilder::new();
            self.boot_config.boot_components().contribute(&mut builder);
            let count = self.registry.apply(builder)?;
            debug!(count, "applied boot component registrations");
        }
        self.run_contribution_step(ContributionPhase::ConfigSections)?;
        self.run_contribution_step(ContributionPhase::Configuration)?;
        Ok(())
    }

    fn compile(&self) -> Result<(), HostError> {
        self.run_contribution_step(ContributionPhase::Components)?;
        self.run_contribution_step(ContributionPhase::AdapterComponents)?;
        self.run_contribution_step(ContributionPhase::CompileComponents)?;
        Ok(())
    }

    async fn load(&self) -> Result<(), HostError> {
        self.run_contribution_step(ContributionPhase::CompiledComponents)?;
        self.run_after_hooks()?;
        self.registry.seal();
        self.discover_lifecycle_components();
        self.fan_out(LifecycleTransition::Load).await
    }

    fn discover_lifecycle_components(&self) {
        let components = self.registry.get_all::<dyn LifecycleComponent>();
        if components.is_empty() {
            warn!("no lifecycle components discovered; lifecycle transitions are no-ops");
        } else {
            for component in &components {
                debug!(component = component.name(), "discovered lifecycle component");
            }
            info!(count = components.len(), "lifecycle components discovered");
        }
        // Captured once, after the container finished building.
        let _ = self.lifecycle_components.set(components);
    }

    // -- lifecycle fan-out -------------------------------------------------

    /// Deliver one transition in three passes over all components. Teardown
    /// transitions visit components in reverse registration order.
    async fn fan_out(&self, transition: LifecycleTransition) -> Result<(), HostError> {
        let Some(components) = self.lifecycle_components.get() else {
            return Ok(());
        };
        if components.is_empty() {
            debug!(transition = %transition, "no lifecycle components; transition is a no-op");
            return Ok(());
        }

        let ordered: Vec<&Arc<dyn LifecycleComponent>> = if transition.is_teardown() {
            components.iter().rev().collect()
        } else {
            components.iter().collect()
        };

        let method_names = transition.method_names();
        for pass in [Pass::Announce, Pass::Work, Pass::Done] {
            let method = method_names[pass as usize];
            for component in &ordered {
                debug!(
                    component = component.name(),
                    method, "invoking lifecycle component"
                );
                invoke_lifecycle(component.as_ref(), transition, pass)
                    .await
                    .map_err(|e| {
                        HostError::lifecycle_component_failed(component.name(), method, e)
                    })?;
            }
        }
        Ok(())
    }

    // -- outcome plumbing --------------------------------------------------

    fn settle(&self, phase: &'static str, result: Result<(), HostError>) -> MicroserviceTrigger {
        match result {
            Ok(()) => {
                info!(phase, "phase completed");
                MicroserviceTrigger::Ok
            }
            Err(err) => {
                error!(phase, error = %err, "phase failed");
                *self.last_error.lock() = Some(err);
                MicroserviceTrigger::Failed
            }
        }
    }

    fn take_last_error(&self) -> HostError {
        self.last_error.lock().take().unwrap_or(HostError::Faulted)
    }
}

async fn invoke_lifecycle(
    component: &dyn LifecycleComponent,
    transition: LifecycleTransition,
    pass: Pass,
) -> anyhow::Result<()> {
    use LifecycleTransition as T;
    match (transition, pass) {
        (T::Load, Pass::Announce) => component.microservice_loading().await,
        (T::Load, Pass::Work) => component.load().await,
        (T::Load, Pass::Done) => component.microservice_loaded().await,
        (T::Activate, Pass::Announce) => component.microservice_activating().await,
        (T::Activate, Pass::Work) => component.activate().await,
        (T::Activate, Pass::Done) => component.microservice_activated().await,
        (T::Deactivate, Pass::Announce) => component.microservice_maybe_deactivating().await,
        (T::Deactivate, Pass::Work) => component.may_deactivate().await,
        (T::Deactivate, Pass::Done) => component.microservice_maybe_deactivated().await,
        (T::Unload, Pass::Announce) => component.microservice_maybe_unloading().await,
        (T::Unload, Pass::Work) => component.may_unload().await,
        (T::Unload, Pass::Done) => component.microservice_maybe_unloaded().await,
    }
}

// ---------------------------------------------------------------------------
// Phase actions adapter
// ---------------------------------------------------------------------------

struct HostPhaseActions {
    inner: Arc<HostInner>,
}

#[async_trait]
impl PhaseActions for HostPhaseActions {
    async fn on_configuring(&self) -> MicroserviceTrigger {
        let result = self.inner.configure();
        self.inner.settle("configure", result)
    }

    async fn on_compiling(&self) -> MicroserviceTrigger {
        let result = self.inner.compile();
        self.inner.settle("compile", result)
    }

    async fn on_loading(&self) -> MicroserviceTrigger {
        let result = self.inner.load().await;
        self.inner.settle("load", result)
    }

    async fn on_activating(&self) -> MicroserviceTrigger {
        let result = self.inner.fan_out(LifecycleTransition::Activate).await;
        self.inner.settle("activate", result)
    }

    async fn on_deactivating(&self) -> MicroserviceTrigger {
        let result = self.inner.fan_out(LifecycleTransition::Deactivate).await;
        self.inner.settle("deactivate", result)
    }

    async fn on_unloading(&self) -> MicroserviceTrigger {
        let result = self.inner.fan_out(LifecycleTransition::Unload).await;
        self.inner.settle("unload", result)
    }

    fn on_unloaded(&self) {
        info!(
            microservice = self.inner.boot_config.microservice_name(),
            "microservice unloaded"
        );
    }

    fn on_faulted(&self) {
        error!(
            microservice = self.inner.boot_config.microservice_name(),
            "microservice faulted"
        );
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// Drives a microservice process through its lifecycle.
///
/// Construct with a frozen [`BootConfiguration`], then either call the
/// phase methods one at a time, or use [`MicroserviceHost::run_as_daemon`] /
/// [`MicroserviceHost::run_as_batch_job`].
pub struct MicroserviceHost {
    inner: Arc<HostInner>,
    machine: Mutex<MicroserviceStateMachine<HostPhaseActions>>,
}

impl MicroserviceHost {
    #[must_use]
    pub fn new(boot_config: BootConfiguration) -> Self {
        let mut loaders = Vec::new();
        for module in boot_config.all_modules() {
            for feature in module.features() {
                match feature.loader() {
                    Some(loader) => {
                        debug!(
                            module = module.module_name(),
                            feature = feature.feature_name(),
                            loader = loader.type_name(),
                            "using feature loader"
                        );
                        loaders.push(LoaderEntry {
                            module_name: module.module_name().to_owned(),
                            loader: Arc::clone(loader),
                        });
                    }
                    None => {
                        debug!(
                            module = module.module_name(),
                            feature = feature.feature_name(),
                            "feature has no loader instance attached; skipping"
                        );
                    }
                }
            }
        }

        info!(
            microservice = boot_config.microservice_name(),
            loaders = loaders.len(),
            "constructed microservice host"
        );

        let inner = Arc::new(HostInner {
            boot_config,
            registry: Arc::new(ComponentRegistry::new()),
            loaders,
            lifecycle_components: OnceLock::new(),
            last_error: parking_lot::Mutex::new(None),
            stop: CancellationToken::new(),
        });
        let machine = MicroserviceStateMachine::new(HostPhaseActions {
            inner: Arc::clone(&inner),
        });
        Self {
            inner,
            machine: Mutex::new(machine),
        }
    }

    #[must_use]
    pub fn boot_config(&self) -> &BootConfiguration {
        &self.inner.boot_config
    }

    /// The shared component registry (sealed after the Loading phase).
    #[must_use]
    pub fn components(&self) -> Arc<ComponentRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub async fn state(&self) -> MicroserviceState {
        self.machine.lock().await.state()
    }

    // -- single-phase drivers ----------------------------------------------

    /// Drive one phase forward.
    ///
    /// # Errors
    /// Returns the wrapped phase failure when the phase faulted, or an
    /// invalid-trigger error when the machine does not accept the trigger.
    async fn advance(&self, trigger: MicroserviceTrigger) -> Result<MicroserviceState, HostError> {
        let mut machine = self.machine.lock().await;
        let state = machine.fire(trigger).await?;
        if state == MicroserviceState::Faulted {
            return Err(self.inner.take_last_error());
        }
        Ok(state)
    }

    /// # Errors
    /// Returns the wrapped phase failure, or an invalid-trigger error when
    /// the machine does not accept the trigger in its current state.
    pub async fn configure(&self) -> Result<MicroserviceState, HostError> {
        self.advance(MicroserviceTrigger::Configure).await
    }

    /// # Errors
    /// Same contract as [`MicroserviceHost::configure`].
    pub async fn compile(&self) -> Result<MicroserviceState, HostError> {
        self.advance(MicroserviceTrigger::Compile).await
    }

    /// # Errors
    /// Same contract as [`MicroserviceHost::configure`].
    pub async fn load(&self) -> Result<MicroserviceState, HostError> {
        self.advance(MicroserviceTrigger::Load).await
    }

    /// # Errors
    /// Same contract as [`MicroserviceHost::configure`].
    pub async fn activate(&self) -> Result<MicroserviceState, HostError> {
        self.advance(MicroserviceTrigger::Activate).await
    }

    /// # Errors
    /// Same contract as [`MicroserviceHost::configure`].
    pub async fn deactivate(&self) -> Result<MicroserviceState, HostError> {
        self.advance(MicroserviceTrigger::Deactivate).await
    }

    /// # Errors
    /// Same contract as [`MicroserviceHost::configure`].
    pub async fn unload(&self) -> Result<MicroserviceState, HostError> {
        self.advance(MicroserviceTrigger::Unload).await
    }

    // -- process entry points ----------------------------------------------

    /// Drive Configure→Compile→Load→Activate, stopping at the first failure.
    ///
    /// # Errors
    /// Returns the first phase failure; the machine is `Faulted` and accepts
    /// no further triggers.
    pub async fn start(&self) -> Result<(), HostError> {
        info!(
            microservice = self.inner.boot_config.microservice_name(),
            "starting microservice"
        );
        for trigger in [
            MicroserviceTrigger::Configure,
            MicroserviceTrigger::Compile,
            MicroserviceTrigger::Load,
            MicroserviceTrigger::Activate,
        ] {
            self.advance(trigger).await?;
        }
        info!(
            microservice = self.inner.boot_config.microservice_name(),
            "microservice activated"
        );
        Ok(())
    }

    /// Signal daemon shutdown. Idempotent: a second stop while the first is
    /// being processed is a no-op.
    pub fn stop(&self) {
        self.inner.stop.cancel();
    }

    /// Start, block until [`MicroserviceHost::stop`] or an OS interrupt,
    /// then drive Deactivate→Unload.
    ///
    /// # Errors
    /// Returns the first phase failure from startup or teardown.
    pub async fn run_as_daemon(&self) -> Result<(), HostError> {
        self.start().await?;
        info!("running in daemon mode");

        tokio::select! {
            () = self.inner.stop.cancelled() => {
                info!("stop requested");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
            }
        }

        info!("stopping daemon");
        let timeout = self.inner.boot_config.stop_timeout();
        match tokio::time::timeout(timeout, self.shutdown()).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    timeout = %humantime::format_duration(timeout),
                    "graceful teardown did not complete within the stop timeout"
                );
                Err(HostError::ShutdownTimedOut { timeout })
            }
        }
    }

    /// Start, run one batch job with a cancellation token derived from the
    /// host's stop token, then tear down.
    ///
    /// Cancellation is a distinct, non-fault outcome; any other job error
    /// faults the machine and surfaces as
    /// [`HostError::BatchJobFailed`].
    ///
    /// # Errors
    /// Returns startup/teardown phase failures or the wrapped job error.
    pub async fn run_as_batch_job<F, Fut>(&self, job: F) -> Result<BatchJobOutcome, HostError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<BatchJobOutcome>> + Send,
    {
        self.start().await?;
        info!("running in batch job mode");

        let cancel = self.inner.stop.child_token();
        match job(cancel).await {
            Ok(BatchJobOutcome::Completed) => {
                info!("batch job completed");
                self.shutdown().await?;
                Ok(BatchJobOutcome::Completed)
            }
            Ok(BatchJobOutcome::Canceled) => {
                warn!("batch job canceled");
                self.shutdown().await?;
                Ok(BatchJobOutcome::Canceled)
            }
            Err(source) => {
                let err = HostError::BatchJobFailed { source };
                error!(error = %err, "batch job failed");
                self.machine.lock().await.fault();
                Err(err)
            }
        }
    }

    /// Run the batch job registered in the component registry under
    /// `dyn BatchJob`. When no job was registered, the run completes
    /// immediately with a warning.
    ///
    /// # Errors
    /// See [`MicroserviceHost::run_as_batch_job`].
    pub async fn run_registered_batch_job(&self) -> Result<BatchJobOutcome, HostError> {
        let registry = Arc::clone(&self.inner.registry);
        self.run_as_batch_job(move |cancel| async move {
            match registry.get::<dyn BatchJob>() {
                Ok(job) => {
                    info!(job = job.name(), "running registered batch job");
                    job.run(cancel).await
                }
                Err(_) => {
                    warn!("no batch job registered; nothing to run");
                    Ok(BatchJobOutcome::Completed)
                }
            }
        })
        .await
    }

    async fn shutdown(&self) -> Result<(), HostError> {
        self.advance(MicroserviceTrigger::Deactivate).await?;
        self.advance(MicroserviceTrigger::Unload).await?;
        Ok(())
    }
}

impl std::fmt::Debug for MicroserviceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicroserviceHost")
            .field(
                "microservice",
                &self.inner.boot_config.microservice_name(),
            )
            .field("loaders", &self.inner.loaders.len())
            .finish()
    }
}
