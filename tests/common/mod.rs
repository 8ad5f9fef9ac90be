//! Shared snapshot fixtures and recording collaborators for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Map, Value};

use edge_router::external::{
    CertificatePublisher, Collaborators, InMemoryStatTracker, LocationCache, NetworkUpdater,
    RegistryObserver, Updaters,
};
use edge_router::registry::{CacheRegistry, DeliveryServiceRecord};
use edge_router::snapshot::DiffResult;

pub const DOMAIN: &str = "cdn.example.net";
pub const CACHES: usize = 6;

pub fn ds_id(i: usize) -> String {
    format!("ds-{:02}", i)
}

pub fn delivery_service(i: usize) -> Value {
    json!({
        "matchsets": [{
            "protocol": "HTTP",
            "matchlist": [{"match-type": "HOST", "regex": format!(r".*\.{}\..*", ds_id(i))}]
        }],
        "domains": [format!("{}.{}", ds_id(i), DOMAIN)]
    })
}

/// Aliases a cache advertises for one delivery service.
pub fn reference(ds: &str) -> Value {
    json!([format!("edge.{}.{}", ds, DOMAIN)])
}

/// A snapshot with `n` HTTP delivery services spread over six caches in two
/// locations; cache `k` serves every delivery service `i` with `i % 6 == k`.
pub fn snapshot_value(timestamp: u64, n: usize) -> Value {
    let mut delivery_services = Map::new();
    for i in 0..n {
        delivery_services.insert(ds_id(i), delivery_service(i));
    }

    let mut content_servers = Map::new();
    for k in 0..CACHES {
        let mut refs = Map::new();
        for i in (k..n).step_by(CACHES) {
            refs.insert(ds_id(i), reference(&ds_id(i)));
        }
        content_servers.insert(
            format!("cache-{:02}", k),
            json!({
                "locationId": if k % 2 == 0 { "east" } else { "west" },
                "fqdn": format!("cache-{:02}.{}", k, DOMAIN),
                "port": 80,
                "ip": format!("10.0.0.{}", k + 1),
                "deliveryServices": refs
            }),
        );
    }

    json!({
        "stats": {"date": timestamp, "tm_version": "7.0"},
        "config": {
            "deliveryservice.snapshots": "true",
            "domain_name": DOMAIN,
            "coveragezone.polling.url": "http://cz.example.net/czf.json",
            "geolocation.polling.url": "http://geo.example.net/db.mmdb",
            "regional_geoblock.polling.url": "http://rgb.example.net/rgb.json",
            "anonymousip.policy.configuration": "http://anon.example.net/policy.json",
            "anonymousip.polling.url": "http://anon.example.net/db.mmdb",
            "certificates.polling.interval": "300"
        },
        "monitors": {"tm-01": {"fqdn": format!("tm-01.{}", DOMAIN), "port": 80, "status": "ONLINE"}},
        "edgeLocations": {
            "east": {"latitude": 40.7, "longitude": -74.0},
            "west": {"latitude": 37.8, "longitude": -122.4}
        },
        "contentRouters": {"tr-01": {"fqdn": format!("tr-01.{}", DOMAIN), "port": 80}},
        "deliveryServices": delivery_services,
        "contentServers": content_servers
    })
}

pub fn cache_id(k: usize) -> String {
    format!("cache-{:02}", k)
}

pub fn text(value: &Value) -> String {
    value.to_string()
}

/// Records every published registry.
#[derive(Default)]
pub struct RecordingObserver {
    published: Mutex<Vec<(u64, bool)>>,
}

impl RecordingObserver {
    /// `(snapshot timestamp, load_all)` per publish.
    pub fn published(&self) -> Vec<(u64, bool)> {
        self.published.lock().unwrap().clone()
    }
}

impl RegistryObserver for RecordingObserver {
    fn registry_published(&self, registry: &Arc<CacheRegistry>, diff: &DiffResult) {
        self.published
            .lock()
            .unwrap()
            .push((registry.snapshot_timestamp(), diff.load_all));
    }
}

#[derive(Default)]
pub struct RecordingLocationCache {
    clears: Mutex<usize>,
}

impl RecordingLocationCache {
    pub fn clears(&self) -> usize {
        *self.clears.lock().unwrap()
    }
}

impl LocationCache for RecordingLocationCache {
    fn clear_locations(&self) {
        *self.clears.lock().unwrap() += 1;
    }
}

/// Remembers the last delivery-service list handed to the publisher.
#[derive(Default)]
pub struct RecordingCertificates {
    ids: Mutex<Vec<String>>,
    intervals: Mutex<Vec<Duration>>,
}

impl RecordingCertificates {
    pub fn ids(&self) -> Vec<String> {
        let mut ids = self.ids.lock().unwrap().clone();
        ids.sort();
        ids
    }

    /// Every polling interval handed over, in order.
    pub fn intervals(&self) -> Vec<Duration> {
        self.intervals.lock().unwrap().clone()
    }
}

impl CertificatePublisher for RecordingCertificates {
    fn set_delivery_services(&self, delivery_services: &[Arc<DeliveryServiceRecord>]) {
        *self.ids.lock().unwrap() = delivery_services.iter().map(|ds| ds.id.clone()).collect();
    }

    fn set_polling_interval(&self, interval: Duration) {
        self.intervals.lock().unwrap().push(interval);
    }

    fn restart_polling(&self) {}
}

/// Records updater commands as `set <url>`, `stop` or `cancel`.
#[derive(Default)]
pub struct RecordingUpdater {
    calls: Mutex<Vec<String>>,
}

impl RecordingUpdater {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl NetworkUpdater for RecordingUpdater {
    fn set_polling_source(&self, url: &str, _interval: Duration) {
        self.calls.lock().unwrap().push(format!("set {}", url));
    }

    fn stop(&self) {
        self.calls.lock().unwrap().push("stop".to_string());
    }

    fn cancel(&self) {
        self.calls.lock().unwrap().push("cancel".to_string());
    }
}

pub struct Harness {
    pub collaborators: Collaborators,
    pub regional_geo: Arc<RecordingUpdater>,
    pub anonymous_ip: Arc<RecordingUpdater>,
    pub observer: Arc<RecordingObserver>,
    pub location_cache: Arc<RecordingLocationCache>,
    pub certificates: Arc<RecordingCertificates>,
    pub stats: Arc<InMemoryStatTracker>,
}

pub fn harness() -> Harness {
    let observer = Arc::new(RecordingObserver::default());
    let location_cache = Arc::new(RecordingLocationCache::default());
    let certificates = Arc::new(RecordingCertificates::default());
    let stats = Arc::new(InMemoryStatTracker::new());
    let regional_geo = Arc::new(RecordingUpdater::default());
    let anonymous_ip = Arc::new(RecordingUpdater::default());

    let collaborators = Collaborators {
        updaters: Updaters {
            regional_geo: regional_geo.clone(),
            anonymous_ip: anonymous_ip.clone(),
            ..Updaters::default()
        },
        certificates: certificates.clone(),
        stats: stats.clone(),
        observers: vec![observer.clone()],
        location_caches: vec![location_cache.clone()],
        ..Collaborators::default()
    };

    Harness {
        collaborators,
        regional_geo,
        anonymous_ip,
        observer,
        location_cache,
        certificates,
        stats,
    }
}
