//! Reconciliation subsystem.
//!
//! # Data Flow
//! ```text
//! apply(snapshot, comparison)
//!     → validate: parse both documents, check the watermark
//!     → lock (one attempt at a time)
//!     → SnapshotDiffer::diff
//!     → full:        location databases, blocking features, certificate list
//!       incremental: blocking features, certificate list delta
//!     → await certificates (if HTTPS delivery services changed; cancellable)
//!     → RegistryBuilder::build_full | RegistryBuilder::patch
//!     → publish: swap registry, notify observers, clear location caches
//!     → advance watermark
//! ```
//!
//! # Design Decisions
//! - Explicit state per reconciler instance, no process-wide statics
//! - Rejections are values (`ReconcileError`), folded into `Ok(false)` at the
//!   `apply` boundary except for malformed input
//! - Request-routing readers never take the reconcile lock

pub mod certificates;
pub mod features;
pub mod publish;
pub mod reconciler;
pub mod state;

use thiserror::Error;

use crate::registry::BuildError;
use crate::snapshot::SnapshotError;

pub use certificates::{auto_confirm, CertificateHandoff};
pub use features::FeatureFlags;
pub use publish::RegistryHandle;
pub use reconciler::{ConfigReconciler, ReconcilePath};
pub use state::ReconciliationState;

/// Why a reconciliation attempt did not publish.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Nothing to apply.
    #[error("snapshot text is empty")]
    Empty,

    /// A document could not be parsed or lacks a mandatory section.
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] SnapshotError),

    /// The snapshot is not newer than the one already applied.
    #[error("snapshot {timestamp} is not newer than applied snapshot {watermark}")]
    Stale { timestamp: u64, watermark: u64 },

    /// A newer snapshot cancelled the wait for certificates.
    #[error("certificate wait aborted by cancellation")]
    CertificateWaitAborted,

    /// The diff and the live registry disagree.
    #[error("internal consistency fault: {0}")]
    InternalConsistency(String),

    /// The snapshot could not be turned into a registry.
    #[error("registry build failed: {0}")]
    Build(BuildError),
}

impl From<BuildError> for ReconcileError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::InternalConsistency { .. } => ReconcileError::InternalConsistency(err.to_string()),
            other => ReconcileError::Build(other),
        }
    }
}

impl ReconcileError {
    /// Label used for the `outcome` metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            ReconcileError::Empty => "empty",
            ReconcileError::Malformed(_) => "malformed",
            ReconcileError::Stale { .. } => "stale",
            ReconcileError::CertificateWaitAborted => "cancelled",
            ReconcileError::InternalConsistency(_) => "internal_consistency",
            ReconcileError::Build(_) => "build_failed",
        }
    }
}
