//! Waiting for HTTPS certificates before publishing.
//!
//! The reconciler raises a single-slot "publish pending" signal and parks
//! until the certificate side clears it, or until the attempt is cancelled.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::state::ReconciliationState;
use crate::registry::DeliveryServiceRecord;
use crate::snapshot::DiffResult;

/// Single-slot handoff between the reconciler and the certificate provisioner.
#[derive(Debug, Default)]
pub struct CertificateHandoff {
    pending: AtomicBool,
    /// Wakes the parked reconciler (confirmation or cancellation).
    changed: Notify,
    /// Wakes the provisioner when a publish starts waiting.
    signalled: Notify,
}

impl CertificateHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put the pending signal: a publish is waiting for certificates.
    pub fn signal_pending(&self) {
        self.pending.store(true, Ordering::Release);
        self.signalled.notify_waiters();
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Certificates are in place; release the waiting publish.
    pub fn confirm(&self) {
        self.pending.store(false, Ordering::Release);
        self.changed.notify_waiters();
    }

    /// Drop any pending signal without waking anyone.
    pub(crate) fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Wake the parked reconciler so it re-checks its cancel flag.
    pub(crate) fn wake(&self) {
        self.changed.notify_waiters();
    }

    /// Resolve once a publish is waiting for certificates.
    pub async fn pending_signalled(&self) {
        loop {
            let signalled = self.signalled.notified();
            tokio::pin!(signalled);
            signalled.as_mut().enable();
            if self.is_pending() {
                return;
            }
            signalled.await;
        }
    }
}

/// Park until certificates are confirmed (`true`) or the attempt is cancelled
/// (`false`). Re-checks at least every `poll` in case a wakeup was missed.
///
/// Cancellation is only accepted while this future is parked.
pub(crate) async fn await_certificates(
    handoff: &CertificateHandoff,
    state: &ReconciliationState,
    poll: Duration,
) -> bool {
    let started = Instant::now();
    let _wait = state.enter_wait();
    handoff.signal_pending();

    let confirmed = loop {
        let changed = handoff.changed.notified();
        tokio::pin!(changed);
        changed.as_mut().enable();

        if state.is_cancel_requested() {
            break false;
        }
        if !handoff.is_pending() {
            break true;
        }

        info!("Waiting for HTTPS certificates to support new config");
        tokio::select! {
            _ = &mut changed => {}
            _ = tokio::time::sleep(poll) => {}
        }
    };

    metrics::histogram!("certificate_wait_seconds").record(started.elapsed().as_secs_f64());
    if !confirmed {
        warn!("Certificate wait cancelled: a newer snapshot is ready");
    }
    confirmed
}

/// The delivery-service list the certificate publisher knows about.
#[derive(Debug, Default, Clone)]
pub(crate) struct CertificateList {
    delivery_services: Vec<Arc<DeliveryServiceRecord>>,
}

impl CertificateList {
    /// Full reload: every delivery service of the snapshot.
    pub(crate) fn replace_all<'a>(&mut self, all: impl Iterator<Item = &'a DeliveryServiceRecord>) {
        self.delivery_services = all.map(|ds| Arc::new(ds.clone())).collect();
    }

    /// Incremental: append created, swap updated in place, drop deleted.
    pub(crate) fn apply(&mut self, diff: &DiffResult) {
        self.delivery_services
            .extend(diff.created.values().map(|ds| Arc::new(ds.clone())));

        for entry in &mut self.delivery_services {
            if let Some(updated) = diff.updated.get(&entry.id) {
                *entry = Arc::new(updated.clone());
            }
        }

        self.delivery_services
            .retain(|ds| !diff.deleted.contains_key(&ds.id));
    }

    pub(crate) fn as_slice(&self) -> &[Arc<DeliveryServiceRecord>] {
        &self.delivery_services
    }
}

/// Confirms every pending publish straight away.
///
/// Stands in for a certificate provisioner when none is attached; runs until
/// `stop` resolves.
pub async fn auto_confirm(handoff: Arc<CertificateHandoff>, stop: impl Future<Output = ()>) {
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = handoff.pending_signalled() => {
                debug!("Confirming certificates for pending publish");
                handoff.confirm();
            }
            _ = &mut stop => break,
        }
    }
}
