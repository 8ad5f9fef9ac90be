//! Snapshot documents and the diff engine.
//!
//! # Data Flow
//! ```text
//! snapshot text ──► Snapshot::parse ──┐
//!                                      ├──► SnapshotDiffer::diff ──► DiffResult
//! previous text ──► Snapshot::parse ──┘        │
//!                                              ├─ load_all: rebuild everything
//!                                              └─ created / updated / deleted
//!                                                 mapping_changed / deleted_caches
//! ```
//!
//! # Design Decisions
//! - Snapshots are parsed once into `serde_json::Value` trees and never mutated
//! - Change detection is structural: object key order is ignored, array order is not
//! - Anything outside delivery-service definitions and cache mappings forces a full reload

pub mod diff;
pub mod document;
pub mod json;

pub use diff::{DiffResult, SnapshotDiffer};
pub use document::{Snapshot, SnapshotError};

pub const DELIVERY_SERVICES_KEY: &str = "deliveryServices";
pub const CONTENT_SERVERS_KEY: &str = "contentServers";
pub const CONFIG_KEY: &str = "config";
pub const STATS_KEY: &str = "stats";
pub const EDGE_LOCATIONS_KEY: &str = "edgeLocations";
pub const MONITORS_KEY: &str = "monitors";
pub const CONTENT_ROUTERS_KEY: &str = "contentRouters";

/// Marker inside `config` announcing that the document supports incremental diffs.
pub const DS_SNAPSHOTS_KEY: &str = "deliveryservice.snapshots";

/// Key of `stats` that carries the snapshot timestamp.
pub const DATE_KEY: &str = "date";
