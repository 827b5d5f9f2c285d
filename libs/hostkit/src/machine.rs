//! Microservice lifecycle state machine.
//!
//! States are the lifecycle phases; transitions are driven by external
//! triggers and by the outcome of the phase action executed on entering an
//! action state. The machine never chains phases on its own — callers move
//! it forward one phase at a time.

use async_trait::async_trait;
use tracing::debug;

use crate::error::InvalidTriggerError;

/// Current phase of the microservice lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroserviceState {
    New,
    Configuring,
    Configured,
    Compiling,
    Compiled,
    Loading,
    Loaded,
    Activating,
    Activated,
    Deactivating,
    Deactivated,
    Unloading,
    Unloaded,
    Faulted,
}

impl MicroserviceState {
    /// `Unloaded` and `Faulted` accept no further triggers.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Unloaded | Self::Faulted)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Configuring => "configuring",
            Self::Configured => "configured",
            Self::Compiling => "compiling",
            Self::Compiled => "compiled",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Deactivating => "deactivating",
            Self::Deactivated => "deactivated",
            Self::Unloading => "unloading",
            Self::Unloaded => "unloaded",
            Self::Faulted => "faulted",
        }
    }
}

impl std::fmt::Display for MicroserviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Triggers accepted by the machine.
///
/// `Ok` and `Failed` are phase outcomes returned by phase actions; the
/// remaining triggers are external commands. Firing an outcome trigger
/// externally is rejected as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroserviceTrigger {
    Ok,
    Failed,
    Configure,
    Compile,
    Load,
    Activate,
    Deactivate,
    Unload,
}

impl MicroserviceTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Configure => "configure",
            Self::Compile => "compile",
            Self::Load => "load",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Unload => "unload",
        }
    }
}

impl std::fmt::Display for MicroserviceTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase actions supplied by the host.
///
/// Entering an action state executes exactly one of these callbacks; the
/// returned trigger decides whether the machine advances or faults.
#[async_trait]
pub trait PhaseActions: Send + Sync {
    async fn on_configuring(&self) -> MicroserviceTrigger;
    async fn on_compiling(&self) -> MicroserviceTrigger;
    async fn on_loading(&self) -> MicroserviceTrigger;
    async fn on_activating(&self) -> MicroserviceTrigger;
    async fn on_deactivating(&self) -> MicroserviceTrigger;
    async fn on_unloading(&self) -> MicroserviceTrigger;

    /// Notification: the machine reached `Unloaded`.
    fn on_unloaded(&self) {}

    /// Notification: the machine reached `Faulted`.
    fn on_faulted(&self) {}
}

/// Deterministic, single-threaded lifecycle machine.
pub struct MicroserviceStateMachine<A> {
    state: MicroserviceState,
    actions: A,
}

impl<A: PhaseActions> MicroserviceStateMachine<A> {
    #[must_use]
    pub fn new(actions: A) -> Self {
        Self {
            state: MicroserviceState::New,
            actions,
        }
    }

    #[must_use]
    pub fn state(&self) -> MicroserviceState {
        self.state
    }

    #[must_use]
    pub fn actions(&self) -> &A {
        &self.actions
    }

    /// Fire an external trigger.
    ///
    /// On acceptance, enters the matching action state, runs its phase
    /// action, and settles in either the completed state or `Faulted`.
    /// Returns the settled state.
    ///
    /// # Errors
    /// Returns [`InvalidTriggerError`] when the current state does not
    /// accept the trigger — including any trigger fired after a terminal
    /// state was reached. No phase action runs in that case.
    pub async fn fire(
        &mut self,
        trigger: MicroserviceTrigger,
    ) -> Result<MicroserviceState, InvalidTriggerError> {
        use MicroserviceState as S;
        use MicroserviceTrigger as T;

        let (action_state, completed_state) = match (self.state, trigger) {
            (S::New, T::Configure) => (S::Configuring, S::Configured),
            (S::Configured, T::Compile) => (S::Compiling, S::Compiled),
            (S::Compiled, T::Load) => (S::Loading, S::Loaded),
            (S::Loaded, T::Activate) => (S::Activating, S::Activated),
            (S::Activated, T::Deactivate) => (S::Deactivating, S::Deactivated),
            (S::Deactivated, T::Unload) => (S::Unloading, S::Unloaded),
            (state, trigger) => return Err(InvalidTriggerError { state, trigger }),
        };

        self.enter(action_state);

        let outcome = match action_state {
            S::Configuring => self.actions.on_configuring().await,
            S::Compiling => self.actions.on_compiling().await,
            S::Loading => self.actions.on_loading().await,
            S::Activating => self.actions.on_activating().await,
            S::Deactivating => self.actions.on_deactivating().await,
            _ => self.actions.on_unloading().await,
        };

        if outcome == T::Ok {
            self.enter(completed_state);
            if completed_state == S::Unloaded {
                self.actions.on_unloaded();
            }
        } else {
            self.enter(S::Faulted);
            self.actions.on_faulted();
        }
        Ok(self.state)
    }

    /// Force the machine into `Faulted` from outside a phase (e.g. a batch
    /// job body failing between phases). No-op on terminal states.
    pub fn fault(&mut self) {
        if !self.state.is_terminal() {
            self.enter(MicroserviceState::Faulted);
            self.actions.on_faulted();
        }
    }

    fn enter(&mut self, state: MicroserviceState) {
        self.state = state;
        debug!(state = %state, "entered state");
    }
}
