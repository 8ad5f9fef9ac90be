//! Registry construction.
//!
//! # Responsibilities
//! - Build a complete registry from a snapshot
//! - Patch a published registry with a diff, without touching it
//! - Keep the stats tracker in step with the delivery-service references
//!
//! # Design Decisions
//! - Per-entry problems (bad location, unaddressable cache, bad matchset) are
//!   logged and skipped; only problems that make the whole table incoherent fail
//! - Stats tracker calls happen after the registry is complete, so a failed
//!   build or patch leaves the tracker untouched

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::cache::CacheRecord;
use super::delivery_service::{DeliveryServiceRecord, Protocol};
use super::geo_redirect;
use super::location::CacheLocation;
use super::CacheRegistry;
use crate::external::StatTracker;
use crate::routing::MatcherSet;
use crate::snapshot::json::{as_text, opt_bool, opt_str, opt_u64};
use crate::snapshot::{
    DiffResult, Snapshot, SnapshotError, CONTENT_ROUTERS_KEY, EDGE_LOCATIONS_KEY, MONITORS_KEY,
    STATS_KEY,
};

/// Errors that make a registry unusable.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Nothing could tell this router about cache health.
    #[error("snapshot lists no ONLINE monitors")]
    NoOnlineMonitors,

    /// A live cache references a delivery service that is neither in the
    /// registry nor being deleted. The diff and the registry disagree.
    #[error("cache '{cache}' references delivery service '{delivery_service}', which is neither live nor deleted")]
    InternalConsistency {
        cache: String,
        delivery_service: String,
    },

    /// A section has a shape the builder cannot use.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

enum StatSignal {
    Save(String, Vec<String>),
    Remove(String, Vec<String>),
}

/// Builds and patches [`CacheRegistry`] values.
#[derive(Clone)]
pub struct RegistryBuilder {
    stats: Arc<dyn StatTracker>,
}

impl RegistryBuilder {
    pub fn new(stats: Arc<dyn StatTracker>) -> Self {
        Self { stats }
    }

    /// Parse every section of `snapshot` into a fresh registry.
    pub fn build_full(&self, snapshot: &Snapshot) -> Result<CacheRegistry, BuildError> {
        let online_monitors = parse_monitors(snapshot.section(MONITORS_KEY))?;
        let domain_name = snapshot.domain_name();

        let mut locations = parse_locations(snapshot.section(EDGE_LOCATIONS_KEY))?;

        let mut caches = HashMap::new();
        let mut aliases: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (id, json) in snapshot.content_servers() {
            let Some(cache) = CacheRecord::from_json(id, json, domain_name) else {
                continue;
            };
            let Some(location) = locations.get_mut(&cache.location_id) else {
                debug!(cache = %id, location = %cache.location_id, "Cache location unknown, dropping cache");
                continue;
            };
            location.cache_ids.insert(id.clone());

            for reference in &cache.references {
                let tracked = aliases.entry(reference.delivery_service_id.clone()).or_default();
                for alias in &reference.aliases {
                    if !tracked.contains(alias) {
                        tracked.push(alias.clone());
                    }
                }
            }
            caches.insert(id.clone(), Arc::new(cache));
        }

        let mut http_matchers = MatcherSet::new();
        let mut dns_matchers = MatcherSet::new();
        let mut delivery_services = HashMap::new();
        for (id, json) in snapshot.delivery_services() {
            let ds = DeliveryServiceRecord::from_json(id, json);
            insert_matchers(&ds, &mut http_matchers, &mut dns_matchers);
            delivery_services.insert(id.clone(), ds);
        }

        let delivery_services = delivery_services
            .into_iter()
            .map(|(id, mut ds)| {
                ds.geo_redirect = geo_redirect::classify(&ds, &http_matchers);
                (id, Arc::new(ds))
            })
            .collect();

        let config = snapshot.config();
        let registry = CacheRegistry {
            delivery_services,
            http_matchers,
            dns_matchers,
            caches,
            locations: locations.into_iter().map(|(id, loc)| (id, Arc::new(loc))).collect(),
            config: Arc::new(config.clone()),
            stats: Arc::new(snapshot.section(STATS_KEY).cloned().unwrap_or(Value::Null)),
            content_routers: Arc::new(snapshot.section(CONTENT_ROUTERS_KEY).cloned().unwrap_or(Value::Null)),
            online_monitors,
            request_headers: parse_request_headers(config),
            ecs_enabled: opt_bool(config, "ecsEnable").unwrap_or(false),
            snapshot_timestamp: snapshot.timestamp(),
        };

        self.stats.initialize(&aliases);

        info!(
            snapshot_ts = registry.snapshot_timestamp,
            delivery_services = registry.delivery_services.len(),
            caches = registry.caches.len(),
            locations = registry.locations.len(),
            "Registry built"
        );
        Ok(registry)
    }

    /// Apply an incremental diff on top of `current`, returning a new registry.
    ///
    /// `current` is never modified; shared records are copied before they change.
    pub fn patch(
        &self,
        current: &CacheRegistry,
        snapshot: &Snapshot,
        diff: &DiffResult,
    ) -> Result<CacheRegistry, BuildError> {
        let mut next = current.clone();
        next.snapshot_timestamp = snapshot.timestamp();
        next.stats = Arc::new(snapshot.section(STATS_KEY).cloned().unwrap_or(Value::Null));
        next.config = Arc::new(snapshot.config().clone());

        for id in diff.deleted.keys() {
            next.http_matchers.remove_delivery_service(id);
            next.dns_matchers.remove_delivery_service(id);
            if next.delivery_services.remove(id).is_some() {
                debug!(delivery_service = %id, "Delivery service removed");
            }
        }

        for ds in diff.changed_delivery_services() {
            next.http_matchers.remove_delivery_service(&ds.id);
            next.dns_matchers.remove_delivery_service(&ds.id);
            insert_matchers(ds, &mut next.http_matchers, &mut next.dns_matchers);
            next.delivery_services.insert(ds.id.clone(), Arc::new(ds.clone()));
        }

        // A new or changed matcher can change where any redirect URL lands.
        let http_matchers = &next.http_matchers;
        for ds in next.delivery_services.values_mut() {
            let geo = geo_redirect::classify(ds, http_matchers);
            if ds.geo_redirect != geo {
                Arc::make_mut(ds).geo_redirect = geo;
            }
        }

        for id in &diff.deleted_caches {
            if let Some(cache) = next.caches.remove(id) {
                if let Some(location) = next.locations.get_mut(&cache.location_id) {
                    Arc::make_mut(location).cache_ids.remove(id);
                }
                debug!(cache = %id, "Cache removed");
            }
        }

        let signals = apply_mapping_changes(&mut next, diff)?;

        for signal in signals {
            match signal {
                StatSignal::Save(ds, aliases) => self.stats.save_tracks(&ds, &aliases),
                StatSignal::Remove(ds, aliases) => self.stats.remove_tracks(&ds, &aliases),
            }
        }

        info!(
            snapshot_ts = next.snapshot_timestamp,
            delivery_services = next.delivery_services.len(),
            caches = next.caches.len(),
            "Registry patched"
        );
        Ok(next)
    }
}

fn insert_matchers(ds: &DeliveryServiceRecord, http: &mut MatcherSet, dns: &mut MatcherSet) {
    for matcher in ds.matchers(Protocol::Http) {
        http.insert(matcher.clone());
    }
    for matcher in ds.matchers(Protocol::Dns) {
        dns.insert(matcher.clone());
    }
}

/// Replace reference lists of live caches, collecting the stats signals the
/// change implies. Caches unknown to the registry are skipped.
fn apply_mapping_changes(next: &mut CacheRegistry, diff: &DiffResult) -> Result<Vec<StatSignal>, BuildError> {
    let mut signals = Vec::new();

    for (id, patch) in &diff.mapping_changed {
        let Some(cache) = next.caches.get_mut(id) else {
            warn!(cache = %id, "Mapping change for unknown cache, ignoring");
            continue;
        };

        for reference in &cache.references {
            let ds = &reference.delivery_service_id;
            if next.delivery_services.contains_key(ds) {
                continue;
            }
            if !diff.deleted.contains_key(ds) {
                error!(cache = %id, delivery_service = %ds, "Reference to unknown delivery service");
                return Err(BuildError::InternalConsistency {
                    cache: id.clone(),
                    delivery_service: ds.clone(),
                });
            }
            signals.push(StatSignal::Remove(ds.clone(), reference.aliases.clone()));
        }

        for reference in &patch.references {
            if next.delivery_services.contains_key(&reference.delivery_service_id) {
                signals.push(StatSignal::Save(
                    reference.delivery_service_id.clone(),
                    reference.aliases.clone(),
                ));
            }
        }

        Arc::make_mut(cache).references = patch.references.clone();
        debug!(cache = %id, references = patch.references.len(), "Cache mapping replaced");
    }

    Ok(signals)
}

fn parse_monitors(monitors: Option<&Value>) -> Result<Vec<String>, BuildError> {
    let online: Vec<String> = monitors
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|map| map.values())
        .filter(|monitor| opt_str(monitor, "status") == Some("ONLINE"))
        .filter_map(|monitor| {
            let fqdn = opt_str(monitor, "fqdn")?;
            Some(format!("{}:{}", fqdn, opt_u64(monitor, "port").unwrap_or(80)))
        })
        .collect();

    if online.is_empty() {
        error!("No ONLINE monitors in snapshot");
        return Err(BuildError::NoOnlineMonitors);
    }
    Ok(online)
}

fn parse_locations(section: Option<&Value>) -> Result<HashMap<String, CacheLocation>, BuildError> {
    let map = match section {
        None => return Ok(HashMap::new()),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(SnapshotError::InvalidField {
                field: EDGE_LOCATIONS_KEY.to_string(),
                reason: "expected an object of locations".to_string(),
            }
            .into())
        }
    };

    Ok(map
        .iter()
        .filter_map(|(id, json)| CacheLocation::from_json(id, json).map(|loc| (id.clone(), loc)))
        .collect())
}

fn parse_request_headers(config: &Value) -> BTreeSet<String> {
    config
        .get("requestHeaders")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|header| !header.is_null())
        .map(as_text)
        .collect()
}
