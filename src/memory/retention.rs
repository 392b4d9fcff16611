//! Retention sweeping: hard deletion of memories that are no longer
//! worth keeping.
//!
//! Two eviction rules, both off the request path:
//! - superseded records past the audit grace period are purged;
//! - active records whose decayed importance fell below the floor and
//!   that have not been accessed within the retention window are evicted,
//!   unless pinned or the owner's most recently created record.

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::memory::scoring;
use crate::memory::store::MemoryStore;
use crate::OwnerId;
use std::sync::Arc;

/// Outcome of one sweep for one owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    /// Superseded records purged after the grace period.
    pub superseded_purged: u64,
    /// Active records evicted for decayed importance.
    pub evicted: u64,
}

/// Periodic eviction job.
pub struct RetentionSweeper {
    store: Arc<MemoryStore>,
    config: Arc<MemoryConfig>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<MemoryStore>, config: Arc<MemoryConfig>) -> Self {
        Self { store, config }
    }

    /// Run one sweep for an owner.
    pub async fn sweep_owner(&self, owner_id: &OwnerId) -> Result<SweepReport> {
        let now = chrono::Utc::now();
        let retention = &self.config.retention;
        let mut report = SweepReport::default();

        let grace_cutoff = now - chrono::Duration::days(retention.superseded_grace_days);
        let stale = self.store.superseded_before(owner_id, grace_cutoff).await?;
        report.superseded_purged = self.store.hard_delete(&stale).await?;

        let active = self.store.fetch_active(owner_id).await?;
        // Never evict the newest record: an owner coming back after a
        // long absence should not find a completely empty memory.
        let newest = active.iter().max_by_key(|m| m.created_at).map(|m| m.id.clone());
        let window_cutoff = now - chrono::Duration::days(retention.retention_window_days);

        let doomed: Vec<String> = active
            .iter()
            .filter(|memory| {
                !memory.pinned
                    && Some(&memory.id) != newest.as_ref()
                    && memory.last_accessed_at < window_cutoff
                    && scoring::decayed_importance(memory, now, &self.config.decay)
                        < retention.importance_floor
            })
            .map(|memory| memory.id.clone())
            .collect();
        report.evicted = self.store.hard_delete(&doomed).await?;

        if report.superseded_purged > 0 || report.evicted > 0 {
            tracing::info!(
                owner_id = %owner_id,
                purged = report.superseded_purged,
                evicted = report.evicted,
                "retention sweep complete"
            );
        }
        Ok(report)
    }
}
