//! Seams to the subsystems the reconciler drives but does not own.
//!
//! # Data Flow
//! ```text
//! ConfigReconciler
//!     → NetworkUpdater (geo-IP, coverage zones, anonymous IP, regional geo)
//!     → CertificatePublisher (delivery services needing HTTPS certificates)
//!     → StatTracker (per-delivery-service alias tracks)
//!     → RegistryObserver (DNS zones, after publish)
//!     → LocationCache (lazy location lookups, cleared after publish)
//! ```
//!
//! # Design Decisions
//! - Plain synchronous traits: every call only records intent or flips a
//!   flag on the collaborator side; none of them may block the reconciler
//! - `Collaborators::default()` wires log-only implementations so the
//!   binary runs standalone

pub mod logging;
pub mod stats;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::{CacheRegistry, DeliveryServiceRecord};
use crate::snapshot::DiffResult;

pub use logging::{LoggingCertificatePublisher, LoggingUpdater};
pub use stats::InMemoryStatTracker;

/// A poller keeping a network-location database current.
pub trait NetworkUpdater: Send + Sync {
    /// Point the poller at `url` and (re)start it. A zero interval keeps
    /// the updater's own default period.
    fn set_polling_source(&self, url: &str, interval: Duration);

    /// Stop polling; the loaded database stays in use.
    fn stop(&self);

    /// Cancel any scheduled poll.
    fn cancel(&self);
}

/// Supplies HTTPS certificates for delivery services.
pub trait CertificatePublisher: Send + Sync {
    fn set_delivery_services(&self, delivery_services: &[Arc<DeliveryServiceRecord>]);

    fn set_polling_interval(&self, interval: Duration);

    fn restart_polling(&self);
}

/// Tracks request statistics per delivery-service alias.
pub trait StatTracker: Send + Sync {
    /// Replace every track: delivery-service id → aliases.
    fn initialize(&self, aliases: &BTreeMap<String, Vec<String>>);

    fn save_tracks(&self, delivery_service_id: &str, aliases: &[String]);

    fn remove_tracks(&self, delivery_service_id: &str, aliases: &[String]);
}

/// Notified after a registry has been published.
pub trait RegistryObserver: Send + Sync {
    fn registry_published(&self, registry: &Arc<CacheRegistry>, diff: &DiffResult);
}

/// A cache of client-network → location associations that refer to cache objects.
pub trait LocationCache: Send + Sync {
    fn clear_locations(&self);
}

/// The network-location updaters, one per feature.
#[derive(Clone)]
pub struct Updaters {
    pub geolocation: Arc<dyn NetworkUpdater>,
    pub coverage_zone: Arc<dyn NetworkUpdater>,
    pub deep_coverage_zone: Arc<dyn NetworkUpdater>,
    pub regional_geo: Arc<dyn NetworkUpdater>,
    /// Anonymous-IP database.
    pub anonymous_ip: Arc<dyn NetworkUpdater>,
    /// Anonymous-IP blocking policy.
    pub anonymous_ip_policy: Arc<dyn NetworkUpdater>,
}

impl Default for Updaters {
    fn default() -> Self {
        Self {
            geolocation: Arc::new(LoggingUpdater::new("geolocation")),
            coverage_zone: Arc::new(LoggingUpdater::new("coverage_zone")),
            deep_coverage_zone: Arc::new(LoggingUpdater::new("deep_coverage_zone")),
            regional_geo: Arc::new(LoggingUpdater::new("regional_geo")),
            anonymous_ip: Arc::new(LoggingUpdater::new("anonymous_ip")),
            anonymous_ip_policy: Arc::new(LoggingUpdater::new("anonymous_ip_policy")),
        }
    }
}

/// Everything a reconciler talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub updaters: Updaters,
    pub certificates: Arc<dyn CertificatePublisher>,
    pub stats: Arc<dyn StatTracker>,
    pub observers: Vec<Arc<dyn RegistryObserver>>,
    pub location_caches: Vec<Arc<dyn LocationCache>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            updaters: Updaters::default(),
            certificates: Arc::new(LoggingCertificatePublisher),
            stats: Arc::new(InMemoryStatTracker::new()),
            observers: Vec::new(),
            location_caches: Vec::new(),
        }
    }
}
