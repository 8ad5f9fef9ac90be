//! Log-only collaborators for running without the real subsystems attached.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::{CertificatePublisher, NetworkUpdater};
use crate::registry::DeliveryServiceRecord;

/// Records updater commands in the log.
#[derive(Debug, Clone)]
pub struct LoggingUpdater {
    name: &'static str,
}

impl LoggingUpdater {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl NetworkUpdater for LoggingUpdater {
    fn set_polling_source(&self, url: &str, interval: Duration) {
        info!(updater = self.name, url, interval_secs = interval.as_secs(), "Polling source set");
    }

    fn stop(&self) {
        info!(updater = self.name, "Updater stopped");
    }

    fn cancel(&self) {
        info!(updater = self.name, "Updater cancelled");
    }
}

/// Records certificate publisher commands in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCertificatePublisher;

impl CertificatePublisher for LoggingCertificatePublisher {
    fn set_delivery_services(&self, delivery_services: &[Arc<DeliveryServiceRecord>]) {
        let https = delivery_services.iter().filter(|ds| ds.requires_certificate()).count();
        info!(total = delivery_services.len(), https, "Certificate publisher delivery services updated");
    }

    fn set_polling_interval(&self, interval: Duration) {
        info!(interval_secs = interval.as_secs(), "Certificate polling interval set");
    }

    fn restart_polling(&self) {
        info!("Certificate polling restarted");
    }
}
