//! Edge Router Library
//!
//! Configuration reconciliation core of a CDN traffic router: turns a
//! stream of routing snapshots into an atomically published, read-only
//! registry of delivery services, caches and cache locations.

pub mod config;
pub mod external;
pub mod lifecycle;
pub mod observability;
pub mod reconcile;
pub mod registry;
pub mod routing;
pub mod snapshot;

pub use config::schema::RouterConfig;
pub use lifecycle::Shutdown;
pub use reconcile::{ConfigReconciler, ReconcileError};
pub use registry::CacheRegistry;
pub use snapshot::{DiffResult, Snapshot, SnapshotDiffer};
