//! Edge locations.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde_json::Value;
use tracing::warn;

use crate::snapshot::json::{opt_bool, opt_f64};

/// Ways a client can be localized to a cache location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalizationMethod {
    CoverageZone,
    DeepCoverageZone,
    Geo,
}

impl LocalizationMethod {
    pub const ALL: [LocalizationMethod; 3] = [
        LocalizationMethod::CoverageZone,
        LocalizationMethod::DeepCoverageZone,
        LocalizationMethod::Geo,
    ];
}

impl FromStr for LocalizationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CZ" => Ok(LocalizationMethod::CoverageZone),
            "DEEP_CZ" => Ok(LocalizationMethod::DeepCoverageZone),
            "GEO" => Ok(LocalizationMethod::Geo),
            other => Err(format!("unknown localization method '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// A cache location and the caches placed in it.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLocation {
    pub id: String,
    pub geolocation: Geolocation,
    /// Backup locations, in priority order.
    pub backup_location_ids: Vec<String>,
    /// Fall back to the geographically closest location when every backup is down.
    pub use_closest_on_backup_failure: bool,
    pub localization_methods: BTreeSet<LocalizationMethod>,
    pub cache_ids: BTreeSet<String>,
}

impl CacheLocation {
    /// Parse an `edgeLocations` entry. A location without coordinates is
    /// unusable and yields `None`; a bad backup list or method name only
    /// loses that entry.
    pub fn from_json(id: &str, json: &Value) -> Option<Self> {
        let (Some(latitude), Some(longitude)) = (opt_f64(json, "latitude"), opt_f64(json, "longitude")) else {
            warn!(location = %id, "Location has no latitude/longitude, skipping");
            return None;
        };

        let (backup_location_ids, use_closest_on_backup_failure) = parse_backups(id, json.get("backupLocations"));

        Some(Self {
            id: id.to_string(),
            geolocation: Geolocation { latitude, longitude },
            backup_location_ids,
            use_closest_on_backup_failure,
            localization_methods: parse_methods(id, json.get("localizationMethods")),
            cache_ids: BTreeSet::new(),
        })
    }

    pub fn is_enabled_for(&self, method: LocalizationMethod) -> bool {
        self.localization_methods.contains(&method)
    }
}

fn parse_backups(id: &str, backups: Option<&Value>) -> (Vec<String>, bool) {
    let Some(backups) = backups else {
        return (Vec::new(), true);
    };

    let list = match backups.get("list") {
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Some(_) => {
            warn!(location = %id, "backupLocations.list is not an array, ignoring");
            Vec::new()
        }
        None => Vec::new(),
    };

    let fallback = opt_bool(backups, "fallbackToClosest").unwrap_or(list.is_empty());
    (list, fallback)
}

fn parse_methods(id: &str, methods: Option<&Value>) -> BTreeSet<LocalizationMethod> {
    let parsed: BTreeSet<_> = methods
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|m| match m.as_str().map(str::parse::<LocalizationMethod>) {
            Some(Ok(method)) => Some(method),
            Some(Err(e)) => {
                warn!(location = %id, error = %e, "Skipping localization method");
                None
            }
            None => None,
        })
        .collect();

    if parsed.is_empty() {
        LocalizationMethod::ALL.into_iter().collect()
    } else {
        parsed
    }
}
