//! In-memory stats tracker.

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use tracing::debug;

use super::StatTracker;

/// Keeps the set of tracked aliases per delivery service.
///
/// Safe to read from request threads while the reconciler updates it.
#[derive(Debug, Default)]
pub struct InMemoryStatTracker {
    tracks: DashMap<String, BTreeSet<String>>,
}

impl InMemoryStatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracked aliases of a delivery service, sorted.
    pub fn aliases(&self, delivery_service_id: &str) -> Vec<String> {
        self.tracks
            .get(delivery_service_id)
            .map(|aliases| aliases.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_tracked(&self, delivery_service_id: &str, alias: &str) -> bool {
        self.tracks
            .get(delivery_service_id)
            .is_some_and(|aliases| aliases.contains(alias))
    }

    /// Number of delivery services with at least one track.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl StatTracker for InMemoryStatTracker {
    fn initialize(&self, aliases: &BTreeMap<String, Vec<String>>) {
        self.tracks.clear();
        for (ds, names) in aliases {
            self.tracks.insert(ds.clone(), names.iter().cloned().collect());
        }
        debug!(delivery_services = self.tracks.len(), "Stat tracks initialized");
    }

    fn save_tracks(&self, delivery_service_id: &str, aliases: &[String]) {
        self.tracks
            .entry(delivery_service_id.to_string())
            .or_default()
            .extend(aliases.iter().cloned());
    }

    fn remove_tracks(&self, delivery_service_id: &str, aliases: &[String]) {
        let now_empty = match self.tracks.get_mut(delivery_service_id) {
            Some(mut tracked) => {
                for alias in aliases {
                    tracked.remove(alias);
                }
                tracked.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.tracks.remove(delivery_service_id);
        }
    }
}
