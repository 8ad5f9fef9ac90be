//! Network-location database pollers driven by the snapshot `config` section.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::external::Updaters;
use crate::registry::DeliveryServiceRecord;
use crate::snapshot::json::{opt_str, opt_u64};

/// Features whose pollers stay enabled across snapshots once a delivery
/// service has asked for them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub regional_geo: bool,
    pub anonymous_ip: bool,
}

fn interval(config: &Value, key: &str) -> Duration {
    Duration::from_secs(opt_u64(config, key).unwrap_or(0))
}

/// Geolocation, coverage-zone and deep-coverage-zone sources. Full reloads only.
pub(crate) fn configure_location_databases(config: &Value, updaters: &Updaters) {
    let geo_key = if config.get("alt.geolocation.polling.url").is_some() {
        "alt.geolocation.polling.url"
    } else {
        "geolocation.polling.url"
    };
    match opt_str(config, geo_key) {
        Some(url) => updaters
            .geolocation
            .set_polling_source(url, interval(config, "geolocation.polling.interval")),
        None => warn!(key = geo_key, "Geolocation database URL not configured"),
    }

    match opt_str(config, "coveragezone.polling.url") {
        Some(url) => updaters
            .coverage_zone
            .set_polling_source(url, interval(config, "coveragezone.polling.interval")),
        None => warn!("coveragezone.polling.url not configured"),
    }

    match opt_str(config, "deepcoveragezone.polling.url") {
        Some(url) => updaters
            .deep_coverage_zone
            .set_polling_source(url, interval(config, "deepcoveragezone.polling.interval")),
        None => {
            debug!("deepcoveragezone.polling.url not configured; stopping updater");
            updaters.deep_coverage_zone.stop();
        }
    }
}

/// Regional-geo and anonymous-IP blocking, switched on by the delivery
/// services that changed in this snapshot.
pub(crate) fn configure_blocking_features<'a>(
    config: &Value,
    updaters: &Updaters,
    flags: &mut FeatureFlags,
    changed: impl Iterator<Item = &'a DeliveryServiceRecord> + Clone,
) {
    configure_regional_geo(config, updaters, flags, changed.clone());
    configure_anonymous_ip(config, updaters, flags, changed);
}

fn configure_regional_geo<'a>(
    config: &Value,
    updaters: &Updaters,
    flags: &mut FeatureFlags,
    mut changed: impl Iterator<Item = &'a DeliveryServiceRecord>,
) {
    let Some(url) = opt_str(config, "regional_geoblock.polling.url") else {
        info!("regional_geoblock.polling.url not configured; stopping updater and disabling feature");
        updaters.regional_geo.stop();
        flags.regional_geo = false;
        return;
    };

    if changed.any(|ds| ds.regional_geo_enabled) {
        updaters
            .regional_geo
            .set_polling_source(url, interval(config, "regional_geoblock.polling.interval"));
        flags.regional_geo = true;
        debug!("Regional geo blocking in use; updater scheduled");
    } else if !flags.regional_geo {
        debug!("No delivery service uses regional geo blocking; cancelling updater");
        updaters.regional_geo.cancel();
    }
}

fn configure_anonymous_ip<'a>(
    config: &Value,
    updaters: &Updaters,
    flags: &mut FeatureFlags,
    mut changed: impl Iterator<Item = &'a DeliveryServiceRecord>,
) {
    let Some(policy_url) = opt_str(config, "anonymousip.policy.configuration") else {
        info!("anonymousip.policy.configuration not configured; stopping updater and disabling feature");
        updaters.anonymous_ip_policy.stop();
        flags.anonymous_ip = false;
        return;
    };
    let Some(database_url) = opt_str(config, "anonymousip.polling.url") else {
        info!("anonymousip.polling.url not configured; stopping updater and disabling feature");
        updaters.anonymous_ip.stop();
        flags.anonymous_ip = false;
        return;
    };

    let period = interval(config, "anonymousip.polling.interval");
    if changed.any(|ds| ds.anonymous_ip_enabled) {
        updaters.anonymous_ip_policy.set_polling_source(policy_url, period);
        updaters.anonymous_ip.set_polling_source(database_url, period);
        flags.anonymous_ip = true;
        debug!("Anonymous IP blocking in use; updaters scheduled");
    } else if !flags.anonymous_ip {
        debug!("No delivery service uses anonymous IP blocking; cancelling updaters");
        updaters.anonymous_ip_policy.cancel();
        updaters.anonymous_ip.cancel();
    }
}

/// `certificates.polling.interval`, when the snapshot sets one.
pub(crate) fn certificate_polling_interval(config: &Value) -> Option<Duration> {
    opt_u64(config, "certificates.polling.interval").map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::NetworkUpdater;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl NetworkUpdater for Recorder {
        fn set_polling_source(&self, url: &str, interval: Duration) {
            self.calls.lock().unwrap().push(format!("set {} {}", url, interval.as_secs()));
        }
        fn stop(&self) {
            self.calls.lock().unwrap().push("stop".into());
        }
        fn cancel(&self) {
            self.calls.lock().unwrap().push("cancel".into());
        }
    }

    fn updaters(recorder: &Arc<Recorder>) -> Updaters {
        Updaters {
            geolocation: recorder.clone(),
            coverage_zone: recorder.clone(),
            deep_coverage_zone: recorder.clone(),
            regional_geo: recorder.clone(),
            anonymous_ip: recorder.clone(),
            anonymous_ip_policy: recorder.clone(),
        }
    }

    fn ds(regional: bool) -> DeliveryServiceRecord {
        DeliveryServiceRecord::from_json("ds", &json!({"matchsets": [], "regionalGeoBlocking": regional}))
    }

    #[test]
    fn test_alt_geolocation_url_preferred() {
        let recorder = Arc::new(Recorder::default());
        let config = json!({
            "geolocation.polling.url": "http://geo/db",
            "alt.geolocation.polling.url": "http://alt-geo/db",
            "geolocation.polling.interval": 3600,
            "coveragezone.polling.url": "http://cz/db"
        });
        configure_location_databases(&config, &updaters(&recorder));
        assert_eq!(recorder.calls(), vec!["set http://alt-geo/db 3600", "set http://cz/db 0", "stop"]);
    }

    #[test]
    fn test_regional_geo_toggle() {
        let recorder = Arc::new(Recorder::default());
        let updaters = updaters(&recorder);
        let config = json!({"regional_geoblock.polling.url": "http://rgb/conf"});
        let mut flags = FeatureFlags::default();

        configure_regional_geo(&config, &updaters, &mut flags, [ds(false)].iter());
        assert_eq!(recorder.calls(), vec!["cancel"]);
        assert!(!flags.regional_geo);

        configure_regional_geo(&config, &updaters, &mut flags, [ds(true)].iter());
        assert!(flags.regional_geo);

        // Already enabled: an unrelated change does not cancel it.
        configure_regional_geo(&config, &updaters, &mut flags, [ds(false)].iter());
        assert_eq!(recorder.calls(), vec!["cancel", "set http://rgb/conf 0"]);

        configure_regional_geo(&json!({}), &updaters, &mut flags, std::iter::empty());
        assert!(!flags.regional_geo);
        assert_eq!(recorder.calls().last().map(String::as_str), Some("stop"));
    }

    #[test]
    fn test_anonymous_ip_requires_both_urls() {
        let recorder = Arc::new(Recorder::default());
        let mut flags = FeatureFlags { anonymous_ip: true, ..Default::default() };
        let config = json!({"anonymousip.policy.configuration": "http://anon/policy"});

        configure_anonymous_ip(&config, &updaters(&recorder), &mut flags, std::iter::empty());
        assert!(!flags.anonymous_ip);
        assert_eq!(recorder.calls(), vec!["stop"]);
    }

    #[test]
    fn test_certificate_interval() {
        assert_eq!(
            certificate_polling_interval(&json!({"certificates.polling.interval": "300"})),
            Some(Duration::from_secs(300))
        );
        assert_eq!(certificate_polling_interval(&json!({})), None);
    }
}
