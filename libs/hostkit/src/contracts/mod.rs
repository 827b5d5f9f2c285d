//! Capability contracts implemented by externally-supplied types.
//!
//! The host only calls through these traits; it never implements them.

pub mod batch;
pub mod feature;
pub mod lifecycle;

pub use batch::{BatchJob, BatchJobOutcome};
pub use feature::{ContributionPhase, FeatureLoader, FeatureLoaderPhaseExtension};
pub use lifecycle::{LifecycleComponent, LifecycleTransition};
