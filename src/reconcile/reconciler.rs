//! The reconciliation orchestrator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::certificates::{await_certificates, CertificateHandoff, CertificateList};
use super::features::{self, FeatureFlags};
use super::publish::{publish, RegistryHandle};
use super::state::ReconciliationState;
use super::ReconcileError;
use crate::external::Collaborators;
use crate::registry::{CacheRegistry, RegistryBuilder};
use crate::snapshot::{DiffResult, Snapshot, SnapshotDiffer, SnapshotError};

/// Default period between certificate checks while a publish waits.
pub const DEFAULT_CERTIFICATE_POLL: Duration = Duration::from_secs(1);

/// Which way a snapshot was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePath {
    Full,
    Incremental,
}

impl ReconcilePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilePath::Full => "full",
            ReconcilePath::Incremental => "incremental",
        }
    }
}

/// State only touched while holding the reconcile lock.
#[derive(Debug, Default)]
struct Session {
    features: FeatureFlags,
    certificates: CertificateList,
}

/// Converges the published registry onto the newest snapshot.
///
/// Share it behind an `Arc`: `apply` serializes itself, and
/// `request_cancel` / `is_reconciling` may be called from anywhere.
pub struct ConfigReconciler {
    differ: SnapshotDiffer,
    builder: RegistryBuilder,
    collaborators: Collaborators,
    state: ReconciliationState,
    handoff: Arc<CertificateHandoff>,
    registry: RegistryHandle,
    session: Mutex<Session>,
    certificate_poll: Duration,
}

impl ConfigReconciler {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            differ: SnapshotDiffer::new(),
            builder: RegistryBuilder::new(collaborators.stats.clone()),
            collaborators,
            state: ReconciliationState::new(),
            handoff: Arc::new(CertificateHandoff::new()),
            registry: RegistryHandle::new(),
            session: Mutex::new(Session::default()),
            certificate_poll: DEFAULT_CERTIFICATE_POLL,
        }
    }

    /// Override how often a parked publish re-checks for certificates.
    pub fn with_certificate_poll(mut self, poll: Duration) -> Self {
        self.certificate_poll = poll;
        self
    }

    /// Apply `snapshot`, diffing against `comparison` (the previously applied
    /// document) when given.
    ///
    /// Returns `Ok(true)` when a new registry was published and `Ok(false)`
    /// when the snapshot was rejected or the attempt aborted; the published
    /// registry and the watermark are then unchanged. Only unparseable input
    /// is returned as an error.
    pub async fn apply(&self, snapshot: &str, comparison: Option<&str>) -> Result<bool, ReconcileError> {
        let span = info_span!("reconcile", attempt = %Uuid::new_v4(), snapshot_ts = field::Empty);
        let _attempt = self.state.begin();
        let started = Instant::now();

        let result = self.attempt(snapshot, comparison).instrument(span.clone()).await;
        let _entered = span.enter();

        match result {
            Ok(path) => {
                metrics::counter!("reconcile_attempts_total", "outcome" => "applied").increment(1);
                metrics::histogram!("reconcile_duration_seconds", "path" => path.as_str())
                    .record(started.elapsed().as_secs_f64());
                info!(path = path.as_str(), "Snapshot applied");
                Ok(true)
            }
            Err(err) => {
                metrics::counter!("reconcile_attempts_total", "outcome" => err.outcome()).increment(1);
                match &err {
                    ReconcileError::Empty | ReconcileError::Stale { .. } => info!(reason = %err, "Snapshot rejected"),
                    ReconcileError::CertificateWaitAborted => warn!(reason = %err, "Reconciliation aborted"),
                    ReconcileError::Malformed(_) => error!(error = %err, "Malformed snapshot"),
                    ReconcileError::InternalConsistency(_) | ReconcileError::Build(_) => {
                        error!(error = %err, "Reconciliation failed; keeping previous registry")
                    }
                }
                match err {
                    ReconcileError::Malformed(_) => Err(err),
                    _ => Ok(false),
                }
            }
        }
    }

    async fn attempt(&self, text: &str, comparison: Option<&str>) -> Result<ReconcilePath, ReconcileError> {
        if text.trim().is_empty() {
            return Err(ReconcileError::Empty);
        }

        let snapshot = Snapshot::parse(text)?;
        let previous = parse_comparison(comparison)?;
        let timestamp = snapshot.timestamp();
        Span::current().record("snapshot_ts", timestamp);

        self.check_fresh(timestamp)?;
        let mut session = self.session.lock().await;
        let _holder = self.state.hold(&self.handoff);
        // Another attempt may have advanced the watermark while we waited.
        self.check_fresh(timestamp)?;

        let current = self.registry.load();
        let baseline = match (&current, &previous) {
            (Some(_), Some(previous)) => Some(previous),
            (None, Some(_)) => {
                debug!("No registry published yet; ignoring comparison snapshot");
                None
            }
            _ => None,
        };

        let diff = self.differ.diff(&snapshot, baseline);

        let (registry, path) = match current {
            Some(current) if !diff.load_all => {
                let registry = self.incremental(&mut session, &current, &snapshot, &diff).await?;
                (registry, ReconcilePath::Incremental)
            }
            _ => {
                let registry = self.full(&mut session, &snapshot, &diff).await?;
                (registry, ReconcilePath::Full)
            }
        };

        debug!(ecs_enabled = registry.ecs_enabled(), monitors = ?registry.online_monitors(), "Registry ready");
        publish(&self.registry, registry, &diff, &self.collaborators);

        self.state.advance(timestamp);
        metrics::gauge!("snapshot_watermark_seconds").set(timestamp as f64);
        Ok(path)
    }

    async fn full(
        &self,
        session: &mut Session,
        snapshot: &Snapshot,
        diff: &DiffResult,
    ) -> Result<CacheRegistry, ReconcileError> {
        let config = snapshot.config();
        let updaters = &self.collaborators.updaters;

        features::configure_location_databases(config, updaters);
        features::configure_blocking_features(config, updaters, &mut session.features, diff.created.values());

        session.certificates.replace_all(diff.created.values());
        self.update_certificate_publisher(config, &session.certificates);

        let https: Vec<&str> = diff
            .created
            .values()
            .filter(|ds| ds.requires_certificate())
            .map(|ds| ds.id.as_str())
            .collect();
        self.wait_for_certificates(&https).await?;

        Ok(self.builder.build_full(snapshot)?)
    }

    async fn incremental(
        &self,
        session: &mut Session,
        current: &CacheRegistry,
        snapshot: &Snapshot,
        diff: &DiffResult,
    ) -> Result<CacheRegistry, ReconcileError> {
        let config = snapshot.config();

        features::configure_blocking_features(
            config,
            &self.collaborators.updaters,
            &mut session.features,
            diff.changed_delivery_services(),
        );

        session.certificates.apply(diff);
        self.update_certificate_publisher(config, &session.certificates);

        let https: Vec<&str> = diff
            .changed_delivery_services()
            .filter(|ds| ds.requires_certificate())
            .map(|ds| ds.id.as_str())
            .collect();
        self.wait_for_certificates(&https).await?;

        Ok(self.builder.patch(current, snapshot, diff)?)
    }

    fn update_certificate_publisher(&self, config: &Value, list: &CertificateList) {
        let publisher = &self.collaborators.certificates;
        if let Some(interval) = features::certificate_polling_interval(config) {
            publisher.set_polling_interval(interval);
        }
        publisher.set_delivery_services(list.as_slice());
        publisher.restart_polling();
    }

    async fn wait_for_certificates(&self, https: &[&str]) -> Result<(), ReconcileError> {
        if https.is_empty() {
            return Ok(());
        }
        for id in https {
            info!(delivery_service = %id, "Checking for certificate");
        }

        if await_certificates(&self.handoff, &self.state, self.certificate_poll).await {
            Ok(())
        } else {
            Err(ReconcileError::CertificateWaitAborted)
        }
    }

    fn check_fresh(&self, timestamp: u64) -> Result<(), ReconcileError> {
        if self.state.is_stale(timestamp) {
            return Err(ReconcileError::Stale {
                timestamp,
                watermark: self.state.last_applied(),
            });
        }
        Ok(())
    }

    /// Abort an attempt parked waiting for certificates.
    ///
    /// No-op unless an attempt is parked right now; returns whether one was
    /// cancelled. A cancel never carries over to a later attempt.
    pub fn request_cancel(&self) -> bool {
        if !self.state.request_cancel() {
            return false;
        }
        self.handoff.wake();
        info!("Reconciliation cancel requested");
        true
    }

    pub fn is_reconciling(&self) -> bool {
        self.state.is_reconciling()
    }

    /// Timestamp of the last applied snapshot (0 before the first).
    pub fn last_applied_timestamp(&self) -> u64 {
        self.state.last_applied()
    }

    /// The currently published registry.
    pub fn registry(&self) -> Option<Arc<CacheRegistry>> {
        self.registry.load()
    }

    /// A handle routing threads can keep to read the published registry.
    pub fn registry_handle(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// The slot the certificate provisioner clears once certificates are ready.
    pub fn certificate_handoff(&self) -> Arc<CertificateHandoff> {
        self.handoff.clone()
    }
}

/// An absent, blank or `{}` comparison document means "no baseline".
fn parse_comparison(comparison: Option<&str>) -> Result<Option<Snapshot>, SnapshotError> {
    let Some(text) = comparison.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    let value: Value = serde_json::from_str(text)?;
    if value.as_object().is_some_and(|map| map.is_empty()) {
        return Ok(None);
    }
    Snapshot::from_value(value).map(Some)
}
