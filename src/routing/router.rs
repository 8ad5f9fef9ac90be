//! Ordered matcher sets and first-match lookup.
//!
//! # Responsibilities
//! - Store compiled delivery-service matchers in deterministic order
//! - Replace every matcher of a delivery service as a unit
//! - Return the first matching delivery service, or explicit no-match
//!
//! # Design Decisions
//! - `BTreeSet` keeps iteration order independent of insertion order,
//!   so a patched set and a rebuilt set look up identically
//! - O(n) scan per lookup (acceptable for typical delivery-service counts)

use std::collections::BTreeSet;

use super::matcher::{DeliveryServiceMatcher, Matcher, RouteRequest};

/// One protocol's matchers, in lookup order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatcherSet {
    matchers: BTreeSet<DeliveryServiceMatcher>,
}

impl MatcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, matcher: DeliveryServiceMatcher) {
        self.matchers.insert(matcher);
    }

    /// Drop every matcher belonging to `delivery_service_id`.
    ///
    /// Returns how many were removed.
    pub fn remove_delivery_service(&mut self, delivery_service_id: &str) -> usize {
        let before = self.matchers.len();
        self.matchers
            .retain(|m| m.delivery_service_id() != delivery_service_id);
        before - self.matchers.len()
    }

    /// Id of the first delivery service whose matcher accepts `req`.
    pub fn first_match(&self, req: &RouteRequest) -> Option<&str> {
        self.matchers
            .iter()
            .find(|m| m.matches(req))
            .map(|m| m.delivery_service_id())
    }

    pub fn contains_delivery_service(&self, delivery_service_id: &str) -> bool {
        self.matchers
            .iter()
            .any(|m| m.delivery_service_id() == delivery_service_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeliveryServiceMatcher> {
        self.matchers.iter()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::matcher::MatchRule;

    fn host_matcher(ds: &str, pattern: &str) -> DeliveryServiceMatcher {
        DeliveryServiceMatcher::new(ds, vec![MatchRule::parse("HOST", pattern, None).unwrap()])
    }

    #[test]
    fn test_first_match_wins() {
        let mut set = MatcherSet::new();
        set.insert(host_matcher("catch-all", ".*"));
        set.insert(host_matcher("video", r".*\.video\..*"));

        // ".*" sorts before ".*\.video\..*", so it shadows the narrower rule
        assert_eq!(set.first_match(&RouteRequest::new("tr.video.cdn.net", "/")), Some("catch-all"));
    }

    #[test]
    fn test_no_match() {
        let mut set = MatcherSet::new();
        set.insert(host_matcher("video", r".*\.video\..*"));
        assert_eq!(set.first_match(&RouteRequest::new("tr.audio.cdn.net", "/")), None);
    }

    #[test]
    fn test_remove_delivery_service_removes_all_matchsets() {
        let mut set = MatcherSet::new();
        set.insert(host_matcher("video", "a"));
        set.insert(host_matcher("video", "b"));
        set.insert(host_matcher("audio", "c"));

        assert_eq!(set.remove_delivery_service("video"), 2);
        assert_eq!(set.len(), 1);
        assert!(!set.contains_delivery_service("video"));
        assert_eq!(set.remove_delivery_service("video"), 0);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let mut a = MatcherSet::new();
        a.insert(host_matcher("x", "1"));
        a.insert(host_matcher("y", "2"));

        let mut b = MatcherSet::new();
        b.insert(host_matcher("y", "2"));
        b.insert(host_matcher("x", "1"));

        assert_eq!(a, b);
        assert!(!a.is_empty());
    }
}
