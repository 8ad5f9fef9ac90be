//! The live routing table.
//!
//! # Data Flow
//! ```text
//! Snapshot ──► RegistryBuilder::build_full ─────────────┐
//!                                                       ├──► CacheRegistry ──► RegistryHandle (publish)
//! CacheRegistry + DiffResult ──► RegistryBuilder::patch ┘
//! ```
//!
//! # Design Decisions
//! - A registry is a value: once published nobody mutates it
//! - Records sit behind `Arc`, so a patch copies maps of pointers and only
//!   re-allocates the records it actually changes (copy-on-write)
//! - Lookups are read-only and lock-free

pub mod builder;
pub mod cache;
pub mod delivery_service;
pub mod geo_redirect;
pub mod location;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;

use crate::routing::{MatcherSet, RouteRequest};

pub use builder::{BuildError, RegistryBuilder};
pub use cache::{CacheRecord, DeliveryServiceReference};
pub use delivery_service::{DeliveryServiceRecord, GeoRedirect, GeoRedirectKind, Protocol};
pub use location::{CacheLocation, Geolocation, LocalizationMethod};

/// Delivery services, caches and locations of one applied snapshot.
#[derive(Debug, Clone, Default)]
pub struct CacheRegistry {
    pub(crate) delivery_services: HashMap<String, Arc<DeliveryServiceRecord>>,
    pub(crate) http_matchers: MatcherSet,
    pub(crate) dns_matchers: MatcherSet,
    pub(crate) caches: HashMap<String, Arc<CacheRecord>>,
    pub(crate) locations: HashMap<String, Arc<CacheLocation>>,
    pub(crate) config: Arc<Value>,
    pub(crate) stats: Arc<Value>,
    pub(crate) content_routers: Arc<Value>,
    /// `fqdn:port` of every ONLINE monitor.
    pub(crate) online_monitors: Vec<String>,
    pub(crate) request_headers: BTreeSet<String>,
    pub(crate) ecs_enabled: bool,
    pub(crate) snapshot_timestamp: u64,
}

impl CacheRegistry {
    pub fn delivery_service(&self, id: &str) -> Option<&Arc<DeliveryServiceRecord>> {
        self.delivery_services.get(id)
    }

    pub fn delivery_services(&self) -> impl Iterator<Item = &Arc<DeliveryServiceRecord>> {
        self.delivery_services.values()
    }

    pub fn delivery_service_count(&self) -> usize {
        self.delivery_services.len()
    }

    pub fn http_matchers(&self) -> &MatcherSet {
        &self.http_matchers
    }

    pub fn dns_matchers(&self) -> &MatcherSet {
        &self.dns_matchers
    }

    /// First HTTP delivery service matching the request.
    pub fn find_http_delivery_service(&self, req: &RouteRequest) -> Option<&Arc<DeliveryServiceRecord>> {
        self.http_matchers
            .first_match(req)
            .and_then(|id| self.delivery_services.get(id))
    }

    /// First DNS delivery service matching a query name.
    pub fn find_dns_delivery_service(&self, name: &str) -> Option<&Arc<DeliveryServiceRecord>> {
        self.dns_matchers
            .first_match(&RouteRequest::for_name(name))
            .and_then(|id| self.delivery_services.get(id))
    }

    pub fn cache(&self, id: &str) -> Option<&Arc<CacheRecord>> {
        self.caches.get(id)
    }

    pub fn caches(&self) -> impl Iterator<Item = &Arc<CacheRecord>> {
        self.caches.values()
    }

    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    pub fn location(&self, id: &str) -> Option<&Arc<CacheLocation>> {
        self.locations.get(id)
    }

    pub fn locations(&self) -> impl Iterator<Item = &Arc<CacheLocation>> {
        self.locations.values()
    }

    /// Caches placed in a location.
    pub fn caches_at(&self, location_id: &str) -> Vec<&Arc<CacheRecord>> {
        self.locations
            .get(location_id)
            .map(|loc| loc.cache_ids.iter().filter_map(|id| self.caches.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn stats(&self) -> &Value {
        &self.stats
    }

    pub fn content_routers(&self) -> &Value {
        &self.content_routers
    }

    pub fn online_monitors(&self) -> &[String] {
        &self.online_monitors
    }

    pub fn request_headers(&self) -> &BTreeSet<String> {
        &self.request_headers
    }

    pub fn ecs_enabled(&self) -> bool {
        self.ecs_enabled
    }

    /// Timestamp of the snapshot this registry was built from.
    pub fn snapshot_timestamp(&self) -> u64 {
        self.snapshot_timestamp
    }
}
