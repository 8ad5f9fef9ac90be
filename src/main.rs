//! Edge Router
//!
//! Watches a routing snapshot file and keeps the published registry in step
//! with it.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌────────────────────────────────────────────────────────┐
//!                     │                      EDGE ROUTER                       │
//!                     │                                                        │
//!   snapshot.json ────┼─▶ SnapshotWatcher ──▶ driver ──▶ ConfigReconciler      │
//!                     │                         │          │                   │
//!                     │        request_cancel ◀─┘          ├─▶ SnapshotDiffer   │
//!                     │                                    ├─▶ RegistryBuilder  │
//!                     │                                    └─▶ RegistryHandle ──┼──▶ routing reads
//!                     │                                                        │
//!                     │  ┌──────────────────────────────────────────────────┐  │
//!                     │  │ config │ observability │ lifecycle (shutdown)    │  │
//!                     │  └──────────────────────────────────────────────────┘  │
//!                     └────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Mutex;

use edge_router::config::{
    load_config, validation::validate_config, AppliedSnapshot, RouterConfig, SnapshotWatcher,
};
use edge_router::external::Collaborators;
use edge_router::lifecycle::{signals, Shutdown};
use edge_router::observability::{init_logging, init_metrics};
use edge_router::reconcile::{auto_confirm, ConfigReconciler};

#[derive(Parser)]
#[command(name = "edge-router")]
#[command(about = "CDN routing snapshot reconciler", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Snapshot file to watch; overrides `snapshot.path`.
    #[arg(short, long)]
    snapshot: Option<PathBuf>,
}

async fn apply(reconciler: &ConfigReconciler, applied: &Mutex<AppliedSnapshot>, text: String) {
    let mut applied = applied.lock().await;
    let result = reconciler.apply(&text, applied.text()).await;
    match result {
        Ok(true) => applied.record(text).await,
        Ok(false) => {}
        Err(e) => tracing::error!(error = %e, "Snapshot not applied"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    if let Some(snapshot) = args.snapshot {
        config.snapshot.path = snapshot;
    }
    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            eprintln!("{}", e);
        }
        return Err("invalid configuration".into());
    }

    init_logging(&config.observability)?;
    tracing::info!("edge-router v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        snapshot = ?config.snapshot.path,
        poll_interval_secs = config.snapshot.poll_interval_secs,
        auto_confirm = config.certificates.auto_confirm,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let reconciler = Arc::new(
        ConfigReconciler::new(Collaborators::default())
            .with_certificate_poll(Duration::from_millis(config.certificates.wait_poll_ms)),
    );

    if config.certificates.auto_confirm {
        tokio::spawn(auto_confirm(reconciler.certificate_handoff(), shutdown.subscribe().wait()));
    }

    let applied = Arc::new(Mutex::new(AppliedSnapshot::load(config.snapshot.previous_path.clone()).await));

    let (watcher, mut updates) = SnapshotWatcher::new(
        &config.snapshot.path,
        Duration::from_secs(config.snapshot.poll_interval_secs),
    );
    // Keep the watcher alive for the lifetime of the driver loop.
    let _watcher = watcher.run()?;

    match tokio::fs::read_to_string(&config.snapshot.path).await {
        Ok(text) => {
            let (reconciler, applied) = (reconciler.clone(), applied.clone());
            tokio::spawn(async move { apply(&reconciler, &applied, text).await });
        }
        Err(e) => tracing::warn!(path = ?config.snapshot.path, error = %e, "No initial snapshot"),
    }

    let stop = shutdown.subscribe().wait();
    tokio::pin!(stop);
    let signal_handle = shutdown.clone();
    tokio::spawn(async move { signals::wait_for_shutdown(&signal_handle).await });

    loop {
        tokio::select! {
            Some(text) = updates.recv() => {
                reconciler.request_cancel();
                let (reconciler, applied) = (reconciler.clone(), applied.clone());
                tokio::spawn(async move { apply(&reconciler, &applied, text).await });
            }
            _ = &mut stop => break,
        }
    }

    reconciler.request_cancel();
    if let Some(registry) = reconciler.registry() {
        tracing::info!(
            snapshot_ts = registry.snapshot_timestamp(),
            delivery_services = registry.delivery_service_count(),
            "Shutdown complete"
        );
    } else {
        tracing::info!("Shutdown complete");
    }
    Ok(())
}
