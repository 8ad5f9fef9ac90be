//! Parsed, immutable snapshot documents.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::snapshot::json::{opt_bool, opt_str, opt_u64};
use crate::snapshot::{
    CONFIG_KEY, CONTENT_SERVERS_KEY, DATE_KEY, DELIVERY_SERVICES_KEY, DS_SNAPSHOTS_KEY, STATS_KEY,
};

static NULL: Value = Value::Null;

/// Errors raised while reading a snapshot document.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The text is not JSON.
    #[error("snapshot is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document root is not an object.
    #[error("snapshot document root is not a JSON object")]
    NotAnObject,

    /// A mandatory section is absent or has the wrong shape.
    #[error("snapshot is missing required section '{0}'")]
    MissingSection(&'static str),

    /// A mandatory field is absent or unusable.
    #[error("snapshot field '{field}' is invalid: {reason}")]
    InvalidField { field: String, reason: String },
}

/// A complete configuration snapshot.
///
/// The two mandatory mappings are split out of the root at parse time; the
/// remaining sections (`config`, `stats`, `edgeLocations`, `monitors`,
/// `contentRouters`, ...) stay in `sections` untouched.
#[derive(Debug, Clone)]
pub struct Snapshot {
    timestamp: u64,
    delivery_services: Map<String, Value>,
    content_servers: Map<String, Value>,
    sections: Map<String, Value>,
}

impl Snapshot {
    /// Parse snapshot text.
    pub fn parse(text: &str) -> Result<Self, SnapshotError> {
        let root: Value = serde_json::from_str(text)?;
        Self::from_value(root)
    }

    /// Validate an already-parsed tree.
    pub fn from_value(root: Value) -> Result<Self, SnapshotError> {
        let Value::Object(mut sections) = root else {
            return Err(SnapshotError::NotAnObject);
        };

        let delivery_services = take_object(&mut sections, DELIVERY_SERVICES_KEY)?;
        let content_servers = take_object(&mut sections, CONTENT_SERVERS_KEY)?;

        let stats = sections
            .get(STATS_KEY)
            .ok_or(SnapshotError::MissingSection(STATS_KEY))?;
        let timestamp = opt_u64(stats, DATE_KEY).ok_or_else(|| SnapshotError::InvalidField {
            field: "stats.date".to_string(),
            reason: "expected seconds since the epoch".to_string(),
        })?;

        Ok(Self {
            timestamp,
            delivery_services,
            content_servers,
            sections,
        })
    }

    /// Snapshot timestamp in seconds since the epoch (`stats.date`).
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn delivery_services(&self) -> &Map<String, Value> {
        &self.delivery_services
    }

    pub fn content_servers(&self) -> &Map<String, Value> {
        &self.content_servers
    }

    /// Every section other than the two mandatory mappings.
    pub fn sections(&self) -> &Map<String, Value> {
        &self.sections
    }

    pub fn section(&self, key: &str) -> Option<&Value> {
        self.sections.get(key)
    }

    /// The `config` section, or `Value::Null` when the snapshot has none.
    pub fn config(&self) -> &Value {
        self.section(CONFIG_KEY).unwrap_or(&NULL)
    }

    /// True when the document carries the delivery-service snapshot marker,
    /// meaning it may be diffed against an earlier one instead of reloaded.
    pub fn supports_incremental(&self) -> bool {
        opt_bool(self.config(), DS_SNAPSHOTS_KEY).unwrap_or(false)
    }

    /// CDN top-level domain, used to shorten stats aliases.
    pub fn domain_name(&self) -> Option<&str> {
        opt_str(self.config(), "domain_name")
    }
}

fn take_object(
    sections: &mut Map<String, Value>,
    key: &'static str,
) -> Result<Map<String, Value>, SnapshotError> {
    match sections.remove(key) {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(SnapshotError::MissingSection(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_extracts_sections() {
        let snapshot = Snapshot::from_value(json!({
            "stats": {"date": 1465084800},
            "config": {"deliveryservice.snapshots": "true", "domain_name": "thecdn.example.com"},
            "deliveryServices": {"ds-1": {"matchsets": []}},
            "contentServers": {},
            "monitors": {}
        }))
        .unwrap();

        assert_eq!(snapshot.timestamp(), 1465084800);
        assert_eq!(snapshot.delivery_services().len(), 1);
        assert!(snapshot.content_servers().is_empty());
        assert!(snapshot.supports_incremental());
        assert_eq!(snapshot.domain_name(), Some("thecdn.example.com"));
        assert!(snapshot.section("monitors").is_some());
        assert!(snapshot.sections().get("deliveryServices").is_none());
    }

    #[test]
    fn test_missing_mandatory_sections() {
        let err = Snapshot::from_value(json!({"stats": {"date": 1}, "contentServers": {}})).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingSection("deliveryServices")));

        let err = Snapshot::from_value(json!({"stats": {"date": 1}, "deliveryServices": {}})).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingSection("contentServers")));

        let err = Snapshot::from_value(json!({"deliveryServices": [], "contentServers": {}})).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingSection("deliveryServices")));
    }

    #[test]
    fn test_timestamp_required() {
        let err = Snapshot::from_value(json!({
            "stats": {"CDN_name": "thecdn"},
            "deliveryServices": {},
            "contentServers": {}
        }))
        .unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidField { .. }));
        assert!(err.to_string().contains("stats.date"));
    }

    #[test]
    fn test_marker_absent_means_full_reload() {
        let snapshot = Snapshot::from_value(json!({
            "stats": {"date": 5},
            "deliveryServices": {},
            "contentServers": {}
        }))
        .unwrap();
        assert!(!snapshot.supports_incremental());
        assert_eq!(snapshot.config(), &Value::Null);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(Snapshot::parse("{not json"), Err(SnapshotError::Parse(_))));
        assert!(matches!(Snapshot::parse("[1, 2]"), Err(SnapshotError::NotAnObject)));
    }
}
