//! Background maintenance: periodic compaction and retention sweeps.
//!
//! One tokio task drives the whole loop. Each tick walks the owners and
//! runs their maintenance under the per-owner advisory lock; cancelling
//! the task mid-run is safe because supersession is transactional per
//! cluster.

use crate::memory::engine::MemoryEngine;
use std::sync::Arc;

/// Handle to the scheduled maintenance task.
pub struct MaintenanceScheduler {
    handle: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for MaintenanceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceScheduler").finish_non_exhaustive()
    }
}

impl MaintenanceScheduler {
    /// Spawn the maintenance loop with the engine's configured interval.
    /// The first pass runs one full interval after startup, not
    /// immediately, so service start is never delayed by maintenance.
    pub fn start(engine: Arc<MemoryEngine>) -> Self {
        let interval = engine.config().maintenance_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                tokio::time::Instant::now() + interval,
                interval,
            );
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                match engine.run_maintenance_once().await {
                    Ok(report) => {
                        tracing::info!(
                            owners = report.owners_processed,
                            skipped = report.owners_skipped,
                            failed = report.owners_failed,
                            superseded = report.records_superseded,
                            evicted = report.records_evicted,
                            "maintenance pass complete"
                        );
                    }
                    Err(error) => {
                        tracing::warn!(%error, "maintenance pass failed");
                    }
                }
            }
        });

        Self { handle }
    }

    /// Stop the loop. Any in-flight cluster either committed or rolled
    /// back; the store stays consistent.
    pub fn shutdown(self) {
        self.handle.abort();
        tracing::info!("maintenance scheduler stopped");
    }
}
