//! Snapshot diff engine.
//!
//! # Responsibilities
//! - Decide whether a snapshot can be applied incrementally or needs a full reload
//! - Partition delivery-service ids into created / updated / deleted
//! - Find caches whose delivery-service mappings changed, and caches that vanished
//!
//! # Design Decisions
//! - Pure: no I/O, no registry access, same inputs always give the same result
//! - Result maps are ordered so logs and downstream iteration are reproducible

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::registry::cache::{parse_references, CacheRecord};
use crate::registry::delivery_service::DeliveryServiceRecord;
use crate::snapshot::document::Snapshot;
use crate::snapshot::json::{json_eq, json_eq_except, subtree_eq};
use crate::snapshot::{
    CONFIG_KEY, CONTENT_ROUTERS_KEY, CONTENT_SERVERS_KEY, DATE_KEY, DELIVERY_SERVICES_KEY, DS_SNAPSHOTS_KEY,
    EDGE_LOCATIONS_KEY, MONITORS_KEY, STATS_KEY,
};

/// Why a diff fell back to a full reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// No previously-applied snapshot to compare against.
    NoBaseline,
    /// The new snapshot lacks the incremental-update marker.
    NoVersionMarker,
    /// A section outside delivery services and cache mappings changed.
    SectionChanged(&'static str),
}

impl fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadReason::NoBaseline => write!(f, "no baseline snapshot"),
            ReloadReason::NoVersionMarker => write!(f, "snapshot does not support incremental updates"),
            ReloadReason::SectionChanged(section) => write!(f, "section '{}' changed", section),
        }
    }
}

/// Outcome of comparing two snapshots.
///
/// A delivery-service id appears in at most one of `created`, `updated` and
/// `deleted`. When `load_all` is set only `created` is populated (with every
/// delivery service of the new snapshot) and the caller rebuilds from scratch.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub load_all: bool,
    pub reload_reason: Option<ReloadReason>,
    pub created: BTreeMap<String, DeliveryServiceRecord>,
    pub updated: BTreeMap<String, DeliveryServiceRecord>,
    pub deleted: BTreeMap<String, DeliveryServiceRecord>,
    /// Cache id → patch record carrying only the new reference list.
    pub mapping_changed: BTreeMap<String, CacheRecord>,
    pub deleted_caches: BTreeSet<String>,
}

impl DiffResult {
    /// True when applying this diff would change nothing.
    pub fn is_empty(&self) -> bool {
        !self.load_all
            && self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.mapping_changed.is_empty()
            && self.deleted_caches.is_empty()
    }

    /// Created and updated records, created first.
    pub fn changed_delivery_services(&self) -> impl Iterator<Item = &DeliveryServiceRecord> + Clone {
        self.created.values().chain(self.updated.values())
    }
}

/// Computes [`DiffResult`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotDiffer;

impl SnapshotDiffer {
    pub fn new() -> Self {
        Self
    }

    /// Compare `new` against the previously applied snapshot, if any.
    pub fn diff(&self, new: &Snapshot, previous: Option<&Snapshot>) -> DiffResult {
        let Some(previous) = previous else {
            return full_reload(new, ReloadReason::NoBaseline);
        };
        if !new.supports_incremental() {
            return full_reload(new, ReloadReason::NoVersionMarker);
        }
        if let Some(reason) = forced_reload(new, previous) {
            return full_reload(new, reason);
        }

        let mut result = DiffResult::default();
        diff_delivery_services(new, previous, &mut result);
        diff_cache_mappings(new, previous, &mut result);

        info!(
            snapshot_ts = new.timestamp(),
            created = result.created.len(),
            updated = result.updated.len(),
            deleted = result.deleted.len(),
            mapping_changed = result.mapping_changed.len(),
            deleted_caches = result.deleted_caches.len(),
            "Snapshot diff computed"
        );
        result
    }
}

/// Every delivery service is new relative to nothing.
fn full_reload(new: &Snapshot, reason: ReloadReason) -> DiffResult {
    info!(snapshot_ts = new.timestamp(), %reason, "Full reload required");

    let created = new
        .delivery_services()
        .iter()
        .map(|(id, ds)| (id.clone(), DeliveryServiceRecord::from_json(id, ds)))
        .collect();

    DiffResult {
        load_all: true,
        reload_reason: Some(reason),
        created,
        ..DiffResult::default()
    }
}

/// Sections whose change cannot be patched and forces a full reload.
fn forced_reload(new: &Snapshot, previous: &Snapshot) -> Option<ReloadReason> {
    let checks: [(&'static str, Option<&str>); 5] = [
        (CONFIG_KEY, Some(DS_SNAPSHOTS_KEY)),
        (CONTENT_ROUTERS_KEY, None),
        (MONITORS_KEY, None),
        (STATS_KEY, Some(DATE_KEY)),
        (EDGE_LOCATIONS_KEY, None),
    ];

    for (section, except) in checks {
        if !subtree_eq(new.sections(), previous.sections(), section, except) {
            return Some(ReloadReason::SectionChanged(section));
        }
    }

    if !content_servers_eq(new.content_servers(), previous.content_servers()) {
        return Some(ReloadReason::SectionChanged(CONTENT_SERVERS_KEY));
    }

    None
}

/// Cache sets are equal when they have the same ids and every cache is equal
/// once its delivery-service mappings are ignored.
fn content_servers_eq(new: &Map<String, Value>, previous: &Map<String, Value>) -> bool {
    if new.len() != previous.len() {
        return false;
    }

    new.iter().all(|(id, cache)| {
        previous
            .get(id)
            .is_some_and(|old| json_eq_except(cache, old, Some(DELIVERY_SERVICES_KEY)))
    })
}

fn diff_delivery_services(new: &Snapshot, previous: &Snapshot, result: &mut DiffResult) {
    let current = new.delivery_services();

    for (id, old) in previous.delivery_services() {
        match current.get(id) {
            None => {
                debug!(delivery_service = %id, "Delivery service deleted");
                result.deleted.insert(id.clone(), DeliveryServiceRecord::from_json(id, old));
            }
            Some(ds) if !json_eq(ds, old) => {
                debug!(delivery_service = %id, "Delivery service updated");
                result.updated.insert(id.clone(), DeliveryServiceRecord::from_json(id, ds));
            }
            Some(_) => {}
        }
    }

    for (id, ds) in current {
        if !previous.delivery_services().contains_key(id) {
            debug!(delivery_service = %id, "Delivery service created");
            result.created.insert(id.clone(), DeliveryServiceRecord::from_json(id, ds));
        }
    }
}

fn diff_cache_mappings(new: &Snapshot, previous: &Snapshot, result: &mut DiffResult) {
    let domain_name = new.domain_name();

    for (id, cache) in new.content_servers() {
        let refs = cache.get(DELIVERY_SERVICES_KEY);
        let old_refs = previous
            .content_servers()
            .get(id)
            .map(|old| old.get(DELIVERY_SERVICES_KEY));

        let changed = match (old_refs, refs) {
            (None, _) => true,
            (Some(Some(old)), Some(new)) => !json_eq(new, old),
            (Some(None), Some(_)) => true,
            (Some(old), None) => old.is_some(),
        };

        if changed {
            debug!(cache = %id, "Cache mapping changed");
            let references = refs
                .map(|refs| parse_references(refs, domain_name))
                .unwrap_or_default();
            result
                .mapping_changed
                .insert(id.clone(), CacheRecord::mapping_patch(id, references));
        }
    }

    for id in previous.content_servers().keys() {
        if !new.content_servers().contains_key(id) {
            result.deleted_caches.insert(id.clone());
        }
    }
}
