//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!
//! Snapshot file:
//!     watcher.rs detects change
//!     → reads snapshot text
//!     → mpsc channel to the reconcile driver
//!
//! Applied snapshot (applied.rs):
//!     persisted after each publish → comparison document for the next attempt
//! ```
//!
//! # Design Decisions
//! - Process settings are immutable once loaded; snapshots carry everything that changes
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod applied;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use applied::AppliedSnapshot;
pub use loader::{load_config, ConfigError};
pub use schema::{CertificateConfig, ObservabilityConfig, RouterConfig, SnapshotSourceConfig};
pub use watcher::SnapshotWatcher;
