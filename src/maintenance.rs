//! Background Maintenance
//!
//! Two periodic tasks keep the database healthy without client traffic:
//!
//! ```text
//!   every snapshot_interval:  Database::snapshot()      (RDB)
//!   every sweep_interval:     Database::sweep_expired() (active expiry)
//! ```
//!
//! Lazy expiry only removes keys that are read again; the sweep catches the
//! rest. Both tasks hold the database lock only for the in-memory part of
//! their work, and file I/O runs on the blocking pool.
//!
//! Failures are logged and the loop keeps going. Dropping the [`Maintainer`]
//! handle stops both tasks.

use crate::Database;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Configuration for the maintenance tasks.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Interval between snapshots (default: 10s)
    pub snapshot_interval: Duration,

    /// Interval between expiry sweeps (default: 5s)
    pub sweep_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl From<&crate::Config> for MaintenanceConfig {
    fn from(config: &crate::Config) -> Self {
        Self {
            snapshot_interval: config.snapshot_interval,
            sweep_interval: config.sweep_interval,
        }
    }
}

/// A handle to the running maintenance tasks.
///
/// When this handle is dropped, both tasks are told to stop.
#[derive(Debug)]
pub struct Maintainer {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Maintainer {
    /// Spawns the snapshot and sweep loops on the current runtime.
    pub fn start(db: Arc<Database>, config: MaintenanceConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = vec![
            tokio::spawn(snapshot_loop(
                Arc::clone(&db),
                config.snapshot_interval,
                shutdown_rx.clone(),
            )),
            tokio::spawn(sweep_loop(db, config.sweep_interval, shutdown_rx)),
        ];

        info!(
            snapshot_secs = config.snapshot_interval.as_secs_f64(),
            sweep_secs = config.sweep_interval.as_secs_f64(),
            "Background maintenance started"
        );

        Self { shutdown_tx, tasks }
    }

    /// Signals both tasks to stop without waiting for them.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops both tasks and waits until any snapshot in progress has finished.
    pub async fn shutdown(mut self) {
        self.stop();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("Background maintenance stopped");
    }
}

impl Drop for Maintainer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleeps for `period`. Returns `false` once shutdown has been requested.
async fn tick(period: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(period) => !*shutdown_rx.borrow(),
        result = shutdown_rx.changed() => result.is_ok() && !*shutdown_rx.borrow(),
    }
}

async fn snapshot_loop(
    db: Arc<Database>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    while tick(period, &mut shutdown_rx).await {
        let db = Arc::clone(&db);
        match tokio::task::spawn_blocking(move || db.snapshot()).await {
            Ok(Ok(Some(info))) => debug!(
                keys = info.keys,
                timestamp = info.timestamp,
                "Snapshot written"
            ),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => error!(error = %e, "Snapshot failed"),
            Err(e) => error!(error = %e, "Snapshot task panicked"),
        }
    }
    debug!("Snapshot task received shutdown signal");
}

async fn sweep_loop(db: Arc<Database>, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    while tick(period, &mut shutdown_rx).await {
        match db.sweep_expired() {
            Ok(0) => {}
            Ok(expired) => debug!(expired, keys_remaining = db.len(), "Expired keys cleaned up"),
            Err(e) => error!(error = %e, "Failed to journal swept keys"),
        }
    }
    debug!("Expiry sweep received shutdown signal");
}
