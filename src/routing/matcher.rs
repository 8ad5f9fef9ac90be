//! Delivery-service match rules.
//!
//! # Responsibilities
//! - Describe a request as the routing tables see it (host, path, query, headers)
//! - Match a single rule (host, path, query or header regex)
//! - Combine a matchset's rules with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive (host is lowercased once, on construction)
//! - Regexes are anchored: a rule must match the whole field, not a substring
//! - A matcher without rules never matches (an empty matchset routes nothing)
//! - Ordering is total and derived from rule text, so rebuilt sets iterate identically

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use url::Url;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &RouteRequest) -> bool;
}

/// The parts of a client request consulted by delivery-service matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteRequest {
    host: String,
    path: String,
    query: Option<String>,
    headers: HashMap<String, String>,
}

impl RouteRequest {
    /// Create a request for `host` and `path`.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into().to_lowercase(),
            path: path.into(),
            query: None,
            headers: HashMap::new(),
        }
    }

    /// Build the synthetic request a redirect URL would produce.
    pub fn from_url(url: &Url) -> Self {
        let mut req = Self::new(url.host_str().unwrap_or_default(), url.path());
        req.query = url.query().map(str::to_string);
        req
    }

    /// A DNS query only carries a name.
    pub fn for_name(name: &str) -> Self {
        Self::new(name.trim_end_matches('.'), "/")
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// Which part of the request a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchType {
    Host,
    Path,
    Header,
    Query,
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOST" => Ok(MatchType::Host),
            "PATH" => Ok(MatchType::Path),
            "HEADER" => Ok(MatchType::Header),
            "QUERY" => Ok(MatchType::Query),
            other => Err(format!("unknown match-type '{}'", other)),
        }
    }
}

/// Error building a rule from matchlist data.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("{0}")]
    UnknownType(String),

    #[error("HEADER rule has no target header name")]
    MissingTarget,

    #[error("invalid regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A single `{match-type, regex, target}` entry of a matchlist.
#[derive(Debug, Clone)]
pub struct MatchRule {
    kind: MatchType,
    pattern: String,
    target: Option<String>,
    regex: Regex,
}

impl MatchRule {
    pub fn new(kind: MatchType, pattern: &str, target: Option<&str>) -> Result<Self, RuleError> {
        if kind == MatchType::Header && target.is_none() {
            return Err(RuleError::MissingTarget);
        }

        // Hosts are compared lowercased, so host patterns ignore case.
        let flags = if kind == MatchType::Host { "(?i)" } else { "" };
        let regex = Regex::new(&format!("{}^(?:{})$", flags, pattern)).map_err(|source| RuleError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            kind,
            pattern: pattern.to_string(),
            target: target.map(str::to_string),
            regex,
        })
    }

    /// Parse from the textual match type used by snapshots.
    pub fn parse(kind: &str, pattern: &str, target: Option<&str>) -> Result<Self, RuleError> {
        let kind = kind.parse().map_err(RuleError::UnknownType)?;
        Self::new(kind, pattern, target)
    }

    pub fn kind(&self) -> MatchType {
        self.kind
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    fn key(&self) -> (MatchType, &str, Option<&str>) {
        (self.kind, &self.pattern, self.target.as_deref())
    }
}

impl Matcher for MatchRule {
    fn matches(&self, req: &RouteRequest) -> bool {
        match self.kind {
            MatchType::Host => self.regex.is_match(req.host()),
            MatchType::Path => self.regex.is_match(req.path()),
            MatchType::Query => req.query().is_some_and(|q| self.regex.is_match(q)),
            MatchType::Header => self
                .target
                .as_deref()
                .and_then(|name| req.header(name))
                .is_some_and(|value| self.regex.is_match(value)),
        }
    }
}

impl PartialEq for MatchRule {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MatchRule {}

impl PartialOrd for MatchRule {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MatchRule {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// One matchset of a delivery service: all rules must pass (AND).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryServiceMatcher {
    delivery_service_id: String,
    rules: Vec<MatchRule>,
}

impl DeliveryServiceMatcher {
    pub fn new(delivery_service_id: impl Into<String>, rules: Vec<MatchRule>) -> Self {
        Self {
            delivery_service_id: delivery_service_id.into(),
            rules,
        }
    }

    pub fn delivery_service_id(&self) -> &str {
        &self.delivery_service_id
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }
}

impl Matcher for DeliveryServiceMatcher {
    fn matches(&self, req: &RouteRequest) -> bool {
        !self.rules.is_empty() && self.rules.iter().all(|m| m.matches(req))
    }
}

impl PartialOrd for DeliveryServiceMatcher {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeliveryServiceMatcher {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rules
            .cmp(&other.rules)
            .then_with(|| self.delivery_service_id.cmp(&other.delivery_service_id))
    }
}
