//! Batch-job entry point contract.
//!
//! In batch-job mode the host runs one designated job after reaching
//! `Activated`. A feature registers the job under `dyn BatchJob` during the
//! component-building phases; the host resolves it from the registry.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Outcome of a batch-job body.
///
/// Cancellation is an explicit return value, not a thrown signal: a job that
/// observes its cancellation token returns `Canceled`, which the host
/// reports as a distinct non-fault outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchJobOutcome {
    Completed,
    Canceled,
}

/// The single designated entry point executed in batch-job mode.
#[async_trait]
pub trait BatchJob: Send + Sync {
    /// Job name used in diagnostics.
    fn name(&self) -> &str;

    /// Run the job to completion or cooperative cancellation.
    ///
    /// The token is canceled when the host's stop signal fires; a job that
    /// honors it returns `Canceled` instead of erroring.
    ///
    /// # Errors
    /// Any error faults the host and surfaces as a batch-job failure.
    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<BatchJobOutcome>;
}
