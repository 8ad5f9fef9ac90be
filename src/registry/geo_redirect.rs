//! Geo-limit redirect classification.

use tracing::error;
use url::Url;

use crate::registry::delivery_service::{DeliveryServiceRecord, GeoRedirect, GeoRedirectKind};
use crate::routing::{MatcherSet, RouteRequest};

/// Classify where `ds` sends geo-blocked clients, looking the redirect URL up
/// in the HTTP matchers of the registry being built.
///
/// Returns `None` when the delivery service has no redirect URL or the URL
/// cannot be parsed.
pub fn classify(ds: &DeliveryServiceRecord, http_matchers: &MatcherSet) -> Option<GeoRedirect> {
    let target = ds.geo_redirect_url.as_deref()?;

    if !target.contains("://") {
        return Some(GeoRedirect {
            kind: GeoRedirectKind::Local,
            file: target.to_string(),
        });
    }

    let url = match Url::parse(target) {
        Ok(url) => url,
        Err(e) => {
            error!(delivery_service = %ds.id, url = target, error = %e, "Invalid geo-limit redirect URL");
            return None;
        }
    };

    let kind = match http_matchers.first_match(&RouteRequest::from_url(&url)) {
        Some(owner) if owner != ds.id => GeoRedirectKind::External,
        _ => GeoRedirectKind::NotForeign,
    };

    Some(GeoRedirect {
        kind,
        file: url.path().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{DeliveryServiceMatcher, MatchRule};
    use serde_json::json;

    fn record(id: &str, redirect: &str) -> DeliveryServiceRecord {
        DeliveryServiceRecord::from_json(id, &json!({"matchsets": [], "geoLimitRedirectURL": redirect}))
    }

    fn matchers() -> MatcherSet {
        let mut set = MatcherSet::new();
        set.insert(DeliveryServiceMatcher::new(
            "video",
            vec![MatchRule::parse("HOST", r".*\.video\.cdn\.net", None).unwrap()],
        ));
        set
    }

    #[test]
    fn test_relative_url_is_local() {
        let geo = classify(&record("video", "/blocked.html"), &matchers()).unwrap();
        assert_eq!(geo.kind, GeoRedirectKind::Local);
        assert_eq!(geo.file, "/blocked.html");
    }

    #[test]
    fn test_url_served_by_other_delivery_service_is_external() {
        let geo = classify(&record("audio", "http://tr.video.cdn.net/blocked.html"), &matchers()).unwrap();
        assert_eq!(geo.kind, GeoRedirectKind::External);
        assert_eq!(geo.file, "/blocked.html");
    }

    #[test]
    fn test_own_or_unclaimed_url_is_not_foreign() {
        let own = classify(&record("video", "http://tr.video.cdn.net/blocked.html"), &matchers()).unwrap();
        assert_eq!(own.kind, GeoRedirectKind::NotForeign);

        let unclaimed = classify(&record("video", "https://example.com/sorry"), &matchers()).unwrap();
        assert_eq!(unclaimed.kind, GeoRedirectKind::NotForeign);
    }

    #[test]
    fn test_unparseable_or_missing_url() {
        assert!(classify(&record("video", "http://[bad/x"), &matchers()).is_none());
        let none = DeliveryServiceRecord::from_json("video", &json!({"matchsets": []}));
        assert!(classify(&none, &matchers()).is_none());
    }
}
