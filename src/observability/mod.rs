//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Reconciler and collaborators produce:
//!     → logging.rs (structured log events, one span per attempt)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Attempt ID flows through every event of a reconciliation
//! - Metrics are cheap; recording is a no-op until an exporter is installed

pub mod logging;
pub mod metrics;

pub use self::logging::init_logging;
pub use self::metrics::init_metrics;
