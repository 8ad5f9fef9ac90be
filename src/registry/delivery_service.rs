//! Delivery-service records.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::routing::{DeliveryServiceMatcher, MatchRule, RuleError};
use crate::snapshot::json::{opt_bool, opt_str};

/// How requests reach a delivery service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Dns,
}

impl Protocol {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "HTTP" => Some(Protocol::Http),
            "DNS" => Some(Protocol::Dns),
            _ => None,
        }
    }
}

/// A compiled matchset: the protocol it routes for plus its rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matchset {
    pub protocol: Protocol,
    pub matcher: DeliveryServiceMatcher,
}

/// Where a geo-limit redirect sends clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoRedirectKind {
    /// No scheme: a file served by the delivery service itself.
    Local,
    /// Absolute URL that no other delivery service claims.
    NotForeign,
    /// Absolute URL served by a different delivery service.
    External,
}

/// Resolved geo-limit redirect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoRedirect {
    pub kind: GeoRedirectKind,
    /// Path component of the redirect URL.
    pub file: String,
}

/// A delivery service as carried by the registry and by diff results.
///
/// Records are replaced wholesale when their definition changes; they are
/// never edited field by field.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryServiceRecord {
    pub id: String,
    /// The snapshot definition this record was parsed from.
    pub definition: Arc<Value>,
    pub matchsets: Vec<Matchset>,
    /// `None` when no matchset declared a usable protocol.
    pub protocol: Option<Protocol>,
    pub domains: Vec<String>,
    pub ssl_enabled: bool,
    pub anonymous_ip_enabled: bool,
    pub regional_geo_enabled: bool,
    pub geo_redirect_url: Option<String>,
    /// Set by the registry builder once matcher sets exist.
    pub geo_redirect: Option<GeoRedirect>,
}

impl DeliveryServiceRecord {
    /// Parse a delivery-service definition.
    ///
    /// Bad matchsets and rules are logged and skipped; the record itself is
    /// always produced so the id stays known to the registry.
    pub fn from_json(id: &str, definition: &Value) -> Self {
        let mut matchsets = Vec::new();
        let mut is_dns = false;

        match definition.get("matchsets") {
            Some(Value::Array(sets)) => {
                for set in sets {
                    let Some(protocol) = opt_str(set, "protocol") else {
                        warn!(delivery_service = %id, "Matchset has no protocol, skipping");
                        continue;
                    };
                    let Some(protocol) = Protocol::parse(protocol) else {
                        warn!(delivery_service = %id, protocol, "Unknown matchset protocol, skipping");
                        continue;
                    };
                    is_dns |= protocol == Protocol::Dns;

                    if let Some(matcher) = parse_matchlist(id, set) {
                        matchsets.push(Matchset { protocol, matcher });
                    }
                }
            }
            Some(_) => warn!(delivery_service = %id, "matchsets is not an array, ignoring"),
            None => {}
        }

        let protocol = if is_dns {
            Some(Protocol::Dns)
        } else if matchsets.is_empty() {
            None
        } else {
            Some(Protocol::Http)
        };

        let domains = definition
            .get("domains")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            id: id.to_string(),
            definition: Arc::new(definition.clone()),
            matchsets,
            protocol,
            domains,
            ssl_enabled: opt_bool(definition, "sslEnabled").unwrap_or(false),
            anonymous_ip_enabled: opt_bool(definition, "anonymousBlockingEnabled").unwrap_or(false),
            regional_geo_enabled: opt_bool(definition, "regionalGeoBlocking").unwrap_or(false),
            geo_redirect_url: opt_str(definition, "geoLimitRedirectURL")
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            geo_redirect: None,
        }
    }

    pub fn is_dns(&self) -> bool {
        self.protocol == Some(Protocol::Dns)
    }

    /// HTTPS delivery services must have certificates before they are published.
    pub fn requires_certificate(&self) -> bool {
        self.protocol == Some(Protocol::Http) && self.ssl_enabled
    }

    pub fn matchers(&self, protocol: Protocol) -> impl Iterator<Item = &DeliveryServiceMatcher> {
        self.matchsets
            .iter()
            .filter(move |set| set.protocol == protocol)
            .map(|set| &set.matcher)
    }
}

/// Compile one matchset's rules. A rule of unknown type is skipped; any other
/// bad rule drops the whole matchset, since a partial AND would match more
/// than intended.
fn parse_matchlist(id: &str, set: &Value) -> Option<DeliveryServiceMatcher> {
    let mut rules = Vec::new();

    for entry in set.get("matchlist").and_then(Value::as_array).into_iter().flatten() {
        let kind = opt_str(entry, "match-type").unwrap_or_default();
        let pattern = opt_str(entry, "regex").unwrap_or_default();
        match MatchRule::parse(kind, pattern, opt_str(entry, "target")) {
            Ok(rule) => rules.push(rule),
            Err(e @ RuleError::UnknownType(_)) => {
                warn!(delivery_service = %id, error = %e, "Unknown match type, skipping rule");
            }
            Err(e) => {
                warn!(delivery_service = %id, error = %e, "Invalid match rule, skipping matchset");
                return None;
            }
        }
    }

    Some(DeliveryServiceMatcher::new(id, rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{Matcher, RouteRequest};
    use serde_json::json;

    #[test]
    fn test_http_delivery_service() {
        let record = DeliveryServiceRecord::from_json(
            "video",
            &json!({
                "matchsets": [{
                    "protocol": "HTTP",
                    "matchlist": [{"match-type": "HOST", "regex": ".*\\.video\\..*"}]
                }],
                "domains": ["video.thecdn.example.com"],
                "sslEnabled": "true"
            }),
        );

        assert_eq!(record.protocol, Some(Protocol::Http));
        assert!(record.requires_certificate());
        assert_eq!(record.matchers(Protocol::Http).count(), 1);
        assert_eq!(record.matchers(Protocol::Dns).count(), 0);
        assert_eq!(record.domains, vec!["video.thecdn.example.com"]);
    }

    #[test]
    fn test_any_dns_matchset_makes_service_dns() {
        let record = DeliveryServiceRecord::from_json(
            "mixed",
            &json!({
                "matchsets": [
                    {"protocol": "HTTP", "matchlist": [{"match-type": "HOST", "regex": "a"}]},
                    {"protocol": "DNS", "matchlist": [{"match-type": "HOST", "regex": "b"}]}
                ],
                "sslEnabled": true
            }),
        );

        assert!(record.is_dns());
        assert!(!record.requires_certificate());
        assert_eq!(record.matchers(Protocol::Http).count(), 1);
        assert_eq!(record.matchers(Protocol::Dns).count(), 1);
    }

    #[test]
    fn test_matchset_without_protocol_is_skipped() {
        let record = DeliveryServiceRecord::from_json(
            "broken",
            &json!({"matchsets": [{"matchlist": [{"match-type": "HOST", "regex": "a"}]}]}),
        );
        assert!(record.matchsets.is_empty());
        assert_eq!(record.protocol, None);
    }

    #[test]
    fn test_empty_matchsets_have_no_protocol() {
        let record = DeliveryServiceRecord::from_json("bare", &json!({"matchsets": []}));
        assert_eq!(record.protocol, None);
        assert!(!record.requires_certificate());
    }

    #[test]
    fn test_bad_rule_drops_matchset() {
        let record = DeliveryServiceRecord::from_json(
            "partial",
            &json!({"matchsets": [
                {"protocol": "HTTP", "matchlist": [
                    {"match-type": "HOST", "regex": "ok"},
                    {"match-type": "PATH", "regex": "("}
                ]},
                {"protocol": "HTTP", "matchlist": [{"match-type": "HOST", "regex": "fine"}]}
            ]}),
        );
        assert_eq!(record.matchsets.len(), 1);
        assert_eq!(record.protocol, Some(Protocol::Http));
    }

    #[test]
    fn test_unknown_match_type_skips_rule() {
        let record = DeliveryServiceRecord::from_json(
            "mixed",
            &json!({"matchsets": [
                {"protocol": "HTTP", "matchlist": [
                    {"match-type": "COOKIE", "regex": "session=.*"},
                    {"match-type": "HOST", "regex": ".*\\.mixed\\..*"}
                ]}
            ]}),
        );
        assert_eq!(record.matchsets.len(), 1);
        let matcher = &record.matchsets[0].matcher;
        assert_eq!(matcher.rules().len(), 1);
        assert!(matcher.matches(&RouteRequest::new("edge.mixed.cdn.net", "/")));
    }

    #[test]
    fn test_missing_header_target_drops_matchset() {
        let record = DeliveryServiceRecord::from_json(
            "header",
            &json!({"matchsets": [
                {"protocol": "HTTP", "matchlist": [
                    {"match-type": "HOST", "regex": "ok"},
                    {"match-type": "HEADER", "regex": "v1"}
                ]}
            ]}),
        );
        assert!(record.matchsets.is_empty());
        assert_eq!(record.protocol, None);
    }

    #[test]
    fn test_feature_flags() {
        let record = DeliveryServiceRecord::from_json(
            "geo",
            &json!({
                "matchsets": [],
                "anonymousBlockingEnabled": "true",
                "regionalGeoBlocking": false,
                "geoLimitRedirectURL": "http://other.example.com/blocked.html"
            }),
        );
        assert!(record.anonymous_ip_enabled);
        assert!(!record.regional_geo_enabled);
        assert_eq!(record.geo_redirect_url.as_deref(), Some("http://other.example.com/blocked.html"));
        assert!(record.geo_redirect.is_none());
    }
}
