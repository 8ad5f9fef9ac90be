//! Configuration schema definitions.
//!
//! This module defines the settings of the router process itself. The
//! routing configuration arrives separately, as snapshots.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Where snapshots come from.
    pub snapshot: SnapshotSourceConfig,

    /// Certificate wait behaviour.
    pub certificates: CertificateConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Snapshot source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnapshotSourceConfig {
    /// Snapshot file to watch.
    pub path: PathBuf,

    /// Where the last applied snapshot is persisted, used as the comparison
    /// document after a restart. Unset disables persistence.
    pub previous_path: Option<PathBuf>,

    /// File watcher poll interval in seconds.
    pub poll_interval_secs: u64,
}

impl Default for SnapshotSourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("snapshot.json"),
            previous_path: None,
            poll_interval_secs: 2,
        }
    }
}

/// Certificate wait configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// How often a parked publish re-checks for certificates, in milliseconds.
    pub wait_poll_ms: u64,

    /// Confirm certificates immediately when no provisioner is attached.
    pub auto_confirm: bool,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            wait_poll_ms: 1000,
            auto_confirm: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
