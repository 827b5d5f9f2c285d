//! Lifecycle component protocol.
//!
//! Components registered under `dyn LifecycleComponent` during the boot
//! phases are notified of microservice-wide transitions. Each transition is
//! delivered in three passes over all components: an announce pass, a work
//! pass, and an announced-done pass — never interleaved, so a component can
//! defer expensive work until every peer has acknowledged the pending
//! transition.
//!
//! The `may_deactivate`/`may_unload` pair are unconditional notifications;
//! there is no veto mechanism.

use async_trait::async_trait;

/// The four microservice-wide transitions fanned out to lifecycle components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleTransition {
    Load,
    Activate,
    Deactivate,
    Unload,
}

impl LifecycleTransition {
    /// Method names for the announce / work / announced-done passes.
    #[must_use]
    pub fn method_names(self) -> [&'static str; 3] {
        match self {
            Self::Load => ["microservice_loading", "load", "microservice_loaded"],
            Self::Activate => [
                "microservice_activating",
                "activate",
                "microservice_activated",
            ],
            Self::Deactivate => [
                "microservice_maybe_deactivating",
                "may_deactivate",
                "microservice_maybe_deactivated",
            ],
            Self::Unload => [
                "microservice_maybe_unloading",
                "may_unload",
                "microservice_maybe_unloaded",
            ],
        }
    }

    /// Teardown transitions visit components in reverse registration order.
    #[must_use]
    pub fn is_teardown(self) -> bool {
        matches!(self, Self::Deactivate | Self::Unload)
    }
}

impl std::fmt::Display for LifecycleTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Load => "load",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Unload => "unload",
        };
        f.write_str(name)
    }
}

/// A component participating in microservice-wide start/stop notifications.
///
/// All methods default to no-ops; a component implements only the
/// transitions it cares about. Errors from any method fail the enclosing
/// lifecycle phase — announce and announced-done callbacks are expected not
/// to fail under correct implementations, but are wrapped the same way when
/// they do.
#[async_trait]
pub trait LifecycleComponent: Send + Sync {
    /// Component name used in diagnostics.
    fn name(&self) -> &str;

    /// Announce: the microservice is about to load.
    ///
    /// # Errors
    /// Any error fails the Loading phase.
    async fn microservice_loading(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Work: load this component.
    ///
    /// # Errors
    /// Any error fails the Loading phase.
    async fn load(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Announced-done: every component has loaded.
    ///
    /// # Errors
    /// Any error fails the Loading phase.
    async fn microservice_loaded(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    /// Any error fails the Activating phase.
    async fn microservice_activating(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    /// Any error fails the Activating phase.
    async fn activate(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    /// Any error fails the Activating phase.
    async fn microservice_activated(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    /// Any error fails the Deactivating phase.
    async fn microservice_maybe_deactivating(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    /// Any error fails the Deactivating phase.
    async fn may_deactivate(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    /// Any error fails the Deactivating phase.
    async fn microservice_maybe_deactivated(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    /// Any error fails the Unloading phase.
    async fn microservice_maybe_unloading(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    /// Any error fails the Unloading phase.
    async fn may_unload(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    /// Any error fails the Unloading phase.
    async fn microservice_maybe_unloaded(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
