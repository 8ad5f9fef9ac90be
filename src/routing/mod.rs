//! Delivery-service routing tables.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, query, headers)
//!     → router.rs (walk the ordered matcher set)
//!     → matcher.rs (evaluate every rule of a matchset)
//!     → Return: first matching delivery-service id, or None
//!
//! Matcher Compilation (per reconciliation):
//!     matchsets[] of each delivery service
//!     → Compile anchored regex rules
//!     → Insert into the HTTP or DNS MatcherSet (ordered)
//! ```
//!
//! # Design Decisions
//! - Matcher sets are plain values; a published registry never changes them
//! - Deterministic: same snapshot always yields the same iteration order
//! - First match wins

pub mod matcher;
pub mod router;

pub use matcher::{DeliveryServiceMatcher, MatchRule, MatchType, Matcher, RouteRequest, RuleError};
pub use router::MatcherSet;
