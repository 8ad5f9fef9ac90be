//! Atomic registry publication.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::debug;

use crate::external::Collaborators;
use crate::registry::CacheRegistry;
use crate::snapshot::DiffResult;

/// Lock-free handle to the currently published registry.
///
/// Cheap to clone; every clone sees the same registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryHandle {
    current: Arc<ArcSwapOption<CacheRegistry>>,
}

impl RegistryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The published registry, or `None` before the first successful apply.
    pub fn load(&self) -> Option<Arc<CacheRegistry>> {
        self.current.load_full()
    }

    pub(crate) fn store(&self, registry: Arc<CacheRegistry>) {
        self.current.store(Some(registry));
    }
}

/// Swap `registry` in, then tell observers, then drop location caches.
///
/// Location caches may hold cache objects of the previous registry; clearing
/// them before the swap would let lookups repopulate them from the old one.
pub(crate) fn publish(
    handle: &RegistryHandle,
    registry: CacheRegistry,
    diff: &DiffResult,
    collaborators: &Collaborators,
) -> Arc<CacheRegistry> {
    let registry = Arc::new(registry);
    handle.store(registry.clone());

    metrics::gauge!("registry_delivery_services").set(registry.delivery_service_count() as f64);
    metrics::gauge!("registry_caches").set(registry.cache_count() as f64);

    for observer in &collaborators.observers {
        observer.registry_published(&registry, diff);
    }
    for cache in &collaborators.location_caches {
        cache.clear_locations();
    }

    debug!(snapshot_ts = registry.snapshot_timestamp(), "Registry published");
    registry
}
