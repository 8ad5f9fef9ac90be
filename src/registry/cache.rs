//! Cache server records and their delivery-service references.

use serde_json::Value;
use tracing::warn;

use crate::snapshot::json::{as_text, opt_str, opt_u64};

/// Default virtual-node count for consistent hashing.
pub const DEFAULT_HASH_COUNT: u64 = 1000;

/// A cache's link to one delivery service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryServiceReference {
    pub delivery_service_id: String,
    /// Hostname the cache answers to for this delivery service.
    pub fqdn: String,
    /// Names the stats tracker counts requests under.
    pub aliases: Vec<String>,
}

impl DeliveryServiceReference {
    /// Parse one `deliveryServices` entry of a cache.
    ///
    /// Returns `None` for an empty list, which carries no hostname.
    pub fn parse(delivery_service_id: &str, value: &Value, domain_name: Option<&str>) -> Option<Self> {
        match value {
            Value::Array(names) => {
                let fqdn = as_text(names.first()?);
                let mut aliases: Vec<String> = Vec::with_capacity(names.len());
                for name in names.iter().map(as_text) {
                    let alias = shorten_alias(&name, domain_name);
                    if !aliases.contains(&alias) {
                        aliases.push(alias);
                    }
                }
                Some(Self {
                    delivery_service_id: delivery_service_id.to_string(),
                    fqdn,
                    aliases,
                })
            }
            other => {
                let name = as_text(other);
                Some(Self {
                    delivery_service_id: delivery_service_id.to_string(),
                    fqdn: name.clone(),
                    aliases: vec![name],
                })
            }
        }
    }
}

/// Names under the CDN domain lose their first label (`edge.ds.cdn.net` → `ds.cdn.net`).
fn shorten_alias(name: &str, domain_name: Option<&str>) -> String {
    match domain_name {
        Some(tld) if !tld.is_empty() && name.ends_with(tld) => match name.split_once('.') {
            Some((_, rest)) => rest.to_string(),
            None => name.to_string(),
        },
        _ => name.to_string(),
    }
}

/// Parse a cache's whole `deliveryServices` object, in key order.
pub fn parse_references(value: &Value, domain_name: Option<&str>) -> Vec<DeliveryServiceReference> {
    let Some(map) = value.as_object() else {
        warn!("deliveryServices is not an object, ignoring");
        return Vec::new();
    };

    map.iter()
        .filter_map(|(id, entry)| {
            let reference = DeliveryServiceReference::parse(id, entry, domain_name);
            if reference.is_none() {
                warn!(delivery_service = %id, "Empty hostname list, skipping reference");
            }
            reference
        })
        .collect()
}

/// A cache server.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub id: String,
    /// Key used for consistent hashing; never empty.
    pub hash_id: String,
    pub hash_count: u64,
    pub location_id: String,
    pub fqdn: String,
    pub port: u16,
    pub ip: Option<String>,
    pub ip6: Option<String>,
    pub references: Vec<DeliveryServiceReference>,
}

impl CacheRecord {
    /// A minimal record carrying only the id and a new reference list.
    ///
    /// Used as a patch onto a live cache, never published as-is.
    pub fn mapping_patch(id: &str, references: Vec<DeliveryServiceReference>) -> Self {
        Self {
            id: id.to_string(),
            hash_id: id.to_string(),
            hash_count: DEFAULT_HASH_COUNT,
            location_id: String::new(),
            fqdn: String::new(),
            port: 0,
            ip: None,
            ip6: None,
            references,
        }
    }

    /// Parse a `contentServers` entry. Returns `None` when the cache cannot be
    /// addressed (no location, fqdn or port).
    pub fn from_json(id: &str, json: &Value, domain_name: Option<&str>) -> Option<Self> {
        let Some(location_id) = opt_str(json, "locationId") else {
            warn!(cache = %id, "Cache has no locationId, skipping");
            return None;
        };
        let Some(fqdn) = opt_str(json, "fqdn") else {
            warn!(cache = %id, "Cache has no fqdn, skipping");
            return None;
        };
        let Some(port) = opt_u64(json, "port").and_then(|p| u16::try_from(p).ok()) else {
            warn!(cache = %id, "Cache has no usable port, skipping");
            return None;
        };

        let hash_id = opt_str(json, "hashId")
            .filter(|h| !h.is_empty())
            .unwrap_or(id)
            .to_string();

        let references = json
            .get("deliveryServices")
            .map(|refs| parse_references(refs, domain_name))
            .unwrap_or_default();

        Some(Self {
            id: id.to_string(),
            hash_id,
            hash_count: opt_u64(json, "hashCount").unwrap_or(DEFAULT_HASH_COUNT),
            location_id: location_id.to_string(),
            fqdn: fqdn.to_string(),
            port,
            ip: opt_str(json, "ip").map(str::to_string),
            ip6: opt_str(json, "ip6").map(str::to_string),
            references,
        })
    }

    pub fn reference(&self, delivery_service_id: &str) -> Option<&DeliveryServiceReference> {
        self.references
            .iter()
            .find(|r| r.delivery_service_id == delivery_service_id)
    }
}
