//! The memory engine facade consumed by the conversation and
//! data-privacy flows.
//!
//! Holds the store, the provider clients, and one advisory lock per
//! owner so compaction and sweeping never race each other on the same
//! record set. Creation and retrieval do not take the lock; store
//! operations are atomic at single-owner granularity.

use crate::config::MemoryConfig;
use crate::error::{ProviderError, Result};
use crate::llm::{EmbeddingProvider, Summarizer};
use crate::memory::compaction::{CompactionEngine, CompactionReport};
use crate::memory::retention::{RetentionSweeper, SweepReport};
use crate::memory::retrieval::RetrievalEngine;
use crate::memory::scoring;
use crate::memory::store::MemoryStore;
use crate::memory::types::{
    Memory, MemoryFilter, MemoryStats, MemoryType, MemoryView, RetrievedMemory,
};
use crate::{MemoryId, OwnerId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Totals from one maintenance pass over all owners.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaintenanceReport {
    pub owners_processed: usize,
    pub owners_skipped: usize,
    pub owners_failed: usize,
    pub records_superseded: usize,
    pub records_evicted: u64,
}

/// Long-term memory engine.
pub struct MemoryEngine {
    store: Arc<MemoryStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: Arc<MemoryConfig>,
    retrieval: RetrievalEngine,
    compaction: CompactionEngine,
    retention: RetentionSweeper,
    owner_locks: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
}

impl MemoryEngine {
    /// Assemble the engine from its collaborators. Pass the same client
    /// as both provider handles to share one concurrency limiter.
    pub fn new(
        store: Arc<MemoryStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        summarizer: Arc<dyn Summarizer>,
        config: Arc<MemoryConfig>,
    ) -> Arc<Self> {
        let retrieval = RetrievalEngine::new(store.clone(), embeddings.clone(), config.clone());
        let compaction = CompactionEngine::new(
            store.clone(),
            embeddings.clone(),
            summarizer,
            config.clone(),
        );
        let retention = RetentionSweeper::new(store.clone(), config.clone());

        Arc::new(Self {
            store,
            embeddings,
            config,
            retrieval,
            compaction,
            retention,
            owner_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Commit a candidate fact as a durable memory.
    ///
    /// The embedding is computed first; if the provider is unreachable no
    /// partial record is stored and the error is returned for the caller
    /// to degrade on.
    pub async fn create_memory(
        &self,
        owner_id: &OwnerId,
        text: &str,
        memory_type: MemoryType,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<MemoryId> {
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidInput("text must not be empty".into()).into());
        }

        let embed = self.embeddings.embed(text);
        let embedding =
            match tokio::time::timeout(self.config.provider.request_timeout, embed).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ProviderError::Unavailable("embedding call timed out".into()).into());
                }
            };

        let importance = scoring::initial_importance(memory_type, text.len());
        let memory = Memory::new(owner_id.clone(), text, memory_type)
            .with_embedding(embedding)
            .with_importance(importance)
            .with_metadata(metadata);

        self.store.put(&memory).await?;
        tracing::info!(owner_id = %owner_id, memory_id = %memory.id, %memory_type, "memory created");
        Ok(memory.id)
    }

    /// Top-k relevant memories for a query. Degrades to an empty list on
    /// provider trouble; see `RetrievalEngine::retrieve`.
    pub async fn retrieve(
        &self,
        owner_id: &OwnerId,
        query_text: &str,
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<RetrievedMemory>> {
        self.retrieval.retrieve(owner_id, query_text, k, min_similarity).await
    }

    /// Remove every memory for an owner. All-or-nothing; takes the owner
    /// lock so an in-flight maintenance run cannot resurrect records.
    pub async fn delete_all(&self, owner_id: &OwnerId) -> Result<u64> {
        let lock = self.owner_lock(owner_id).await;
        let _guard = lock.lock().await;

        let deleted = self.store.hard_delete_owner(owner_id).await?;
        // The owner is gone; dropping the lock entry keeps the map from
        // growing with every owner the service has ever seen.
        self.owner_locks.lock().await.remove(owner_id);
        tracing::info!(owner_id = %owner_id, deleted, "owner memories deleted");
        Ok(deleted)
    }

    /// Full export for the data-privacy flow, superseded records
    /// included.
    pub async fn export(&self, owner_id: &OwnerId) -> Result<Vec<MemoryView>> {
        let filter = MemoryFilter { include_superseded: true, ..Default::default() };
        let memories = self.store.list_by_owner(owner_id, &filter).await?;
        Ok(memories.into_iter().map(MemoryView::from).collect())
    }

    /// Per-owner memory counts.
    pub async fn stats(&self, owner_id: &OwnerId) -> Result<MemoryStats> {
        self.store.stats(owner_id).await
    }

    /// Pin or unpin a memory. Pinned records survive decay-based
    /// eviction.
    pub async fn pin(&self, owner_id: &OwnerId, id: &str, pinned: bool) -> Result<()> {
        self.store.set_pinned(owner_id, id, pinned).await
    }

    /// Run compaction for one owner under its advisory lock.
    pub async fn compact_owner(&self, owner_id: &OwnerId) -> Result<CompactionReport> {
        let lock = self.owner_lock(owner_id).await;
        let _guard = lock.lock().await;
        self.compaction.compact_owner(owner_id).await
    }

    /// Run a retention sweep for one owner under its advisory lock.
    pub async fn sweep_owner(&self, owner_id: &OwnerId) -> Result<SweepReport> {
        let lock = self.owner_lock(owner_id).await;
        let _guard = lock.lock().await;
        self.retention.sweep_owner(owner_id).await
    }

    /// One maintenance pass: compaction then a sweep for every owner,
    /// with per-owner failure isolation. Owners whose lock is already
    /// held (a manual run in flight) are skipped rather than queued.
    pub async fn run_maintenance_once(&self) -> Result<MaintenanceReport> {
        let owners = self.store.active_owners().await?;
        let mut report = MaintenanceReport::default();

        for owner_id in owners {
            let lock = self.owner_lock(&owner_id).await;
            let Ok(_guard) = lock.try_lock() else {
                report.owners_skipped += 1;
                tracing::debug!(owner_id = %owner_id, "owner busy, skipping maintenance");
                continue;
            };

            match self.maintain_owner(&owner_id).await {
                Ok((compacted, swept)) => {
                    report.owners_processed += 1;
                    report.records_superseded += compacted.records_superseded;
                    report.records_evicted += swept.evicted + swept.superseded_purged;
                }
                Err(error) => {
                    report.owners_failed += 1;
                    tracing::warn!(owner_id = %owner_id, %error, "maintenance failed for owner");
                }
            }
        }

        Ok(report)
    }

    async fn maintain_owner(&self, owner_id: &OwnerId) -> Result<(CompactionReport, SweepReport)> {
        let compacted = self.compaction.compact_owner(owner_id).await?;
        let swept = self.retention.sweep_owner(owner_id).await?;
        Ok((compacted, swept))
    }

    /// The advisory lock for an owner, created on first use.
    async fn owner_lock(&self, owner_id: &OwnerId) -> Arc<Mutex<()>> {
        let mut locks = self.owner_locks.lock().await;
        locks.entry(owner_id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// The engine's configuration.
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::atomic::{AtomicBool, Ordering};

    const DIM: usize = 4;

    struct FakeProvider {
        fail: AtomicBool,
    }

    fn vector_for(text: &str) -> Vec<f32> {
        match text {
            t if t.contains("hiking") => vec![1.0, 0.05, 0.0, 0.0],
            t if t.contains("tea") => vec![0.0, 1.0, 0.05, 0.0],
            _ => vec![0.0, 0.0, 0.0, 1.0],
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for FakeProvider {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(ProviderError::Unavailable("provider down".into()).into());
            }
            Ok(vector_for(text))
        }
    }

    #[async_trait::async_trait]
    impl Summarizer for FakeProvider {
        async fn summarize(&self, texts: &[String]) -> Result<String> {
            Ok(format!("hiking summary of {} notes", texts.len()))
        }
    }

    fn owner(name: &str) -> OwnerId {
        Arc::from(name)
    }

    async fn setup(fail: bool) -> (Arc<MemoryStore>, Arc<MemoryEngine>) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite should connect");
        let store = MemoryStore::new(pool, DIM);
        store.initialize().await.expect("schema should be created");

        let mut config = MemoryConfig::default();
        config.provider.dimension = DIM;
        config.compaction.max_retries = 0;
        let provider = Arc::new(FakeProvider { fail: AtomicBool::new(fail) });
        let engine =
            MemoryEngine::new(store.clone(), provider.clone(), provider, Arc::new(config));
        (store, engine)
    }

    #[tokio::test]
    async fn create_then_retrieve_round_trip() {
        let (_, engine) = setup(false).await;
        let alice = owner("alice");

        let id = engine
            .create_memory(&alice, "loves hiking in the rain", MemoryType::Preference, HashMap::new())
            .await
            .expect("create should succeed");

        let results = engine
            .retrieve(&alice, "hiking", 5, 0.5)
            .await
            .expect("retrieve should succeed");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.id, id);
    }

    #[tokio::test]
    async fn create_memory_rejects_empty_text() {
        let (_, engine) = setup(false).await;
        let error = engine
            .create_memory(&owner("alice"), "  ", MemoryType::Fact, HashMap::new())
            .await
            .expect_err("empty text must be rejected");
        assert!(matches!(error, Error::Provider(ProviderError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn provider_failure_stores_no_partial_record() {
        let (store, engine) = setup(true).await;
        let alice = owner("alice");

        let error = engine
            .create_memory(&alice, "loves hiking", MemoryType::Fact, HashMap::new())
            .await
            .expect_err("embed failure must abort creation");
        assert!(error.is_transient());

        let remaining = store.fetch_active(&alice).await.expect("list should succeed");
        assert!(remaining.is_empty(), "no record may exist without its embedding");
    }

    #[tokio::test]
    async fn delete_all_leaves_owner_empty() {
        let (_, engine) = setup(false).await;
        let alice = owner("alice");

        engine
            .create_memory(&alice, "loves hiking", MemoryType::Fact, HashMap::new())
            .await
            .expect("create should succeed");
        engine
            .create_memory(&alice, "drinks tea", MemoryType::Preference, HashMap::new())
            .await
            .expect("create should succeed");

        let deleted = engine.delete_all(&alice).await.expect("delete should succeed");
        assert_eq!(deleted, 2);
        assert!(engine.export(&alice).await.expect("export should succeed").is_empty());
        assert!(
            !engine.owner_locks.lock().await.contains_key(&alice),
            "deleted owners must not leave a lock entry behind"
        );
    }

    #[tokio::test]
    async fn export_includes_superseded_records() {
        let (_, engine) = setup(false).await;
        let alice = owner("alice");

        engine
            .create_memory(&alice, "loves hiking trails", MemoryType::Fact, HashMap::new())
            .await
            .expect("create should succeed");
        engine
            .create_memory(&alice, "enjoys hiking", MemoryType::Fact, HashMap::new())
            .await
            .expect("create should succeed");

        engine.compact_owner(&alice).await.expect("compaction should succeed");

        let export = engine.export(&alice).await.expect("export should succeed");
        assert_eq!(export.len(), 3, "two superseded originals plus the summary");
        assert_eq!(export.iter().filter(|v| v.superseded_by.is_some()).count(), 2);
    }

    #[tokio::test]
    async fn maintenance_pass_covers_all_owners() {
        let (_, engine) = setup(false).await;
        let alice = owner("alice");
        let bob = owner("bob");

        engine
            .create_memory(&alice, "loves hiking trails", MemoryType::Fact, HashMap::new())
            .await
            .expect("create should succeed");
        engine
            .create_memory(&alice, "enjoys hiking", MemoryType::Fact, HashMap::new())
            .await
            .expect("create should succeed");
        engine
            .create_memory(&bob, "drinks tea", MemoryType::Preference, HashMap::new())
            .await
            .expect("create should succeed");

        let report = engine.run_maintenance_once().await.expect("maintenance should succeed");
        assert_eq!(report.owners_processed, 2);
        assert_eq!(report.owners_failed, 0);
        assert_eq!(report.records_superseded, 2, "alice's duplicates merged");
    }

    #[tokio::test]
    async fn maintenance_skips_owner_with_lock_held() {
        let (_, engine) = setup(false).await;
        let alice = owner("alice");

        engine
            .create_memory(&alice, "loves hiking", MemoryType::Fact, HashMap::new())
            .await
            .expect("create should succeed");

        let lock = engine.owner_lock(&alice).await;
        let _guard = lock.lock().await;

        let report = engine.run_maintenance_once().await.expect("maintenance should succeed");
        assert_eq!(report.owners_skipped, 1);
        assert_eq!(report.owners_processed, 0);
    }

    #[tokio::test]
    async fn stats_and_pin_round_trip() {
        let (_, engine) = setup(false).await;
        let alice = owner("alice");

        let id = engine
            .create_memory(&alice, "loves hiking", MemoryType::Preference, HashMap::new())
            .await
            .expect("create should succeed");

        engine.pin(&alice, &id, true).await.expect("pin should succeed");
        let stats = engine.stats(&alice).await.expect("stats should succeed");
        assert_eq!(stats.active, 1);
        assert_eq!(stats.preferences, 1);

        let error = engine
            .pin(&owner("bob"), &id, true)
            .await
            .expect_err("pinning across owners must fail");
        assert!(matches!(error, Error::Memory(crate::error::MemoryError::NotFound { .. })));
    }
}
