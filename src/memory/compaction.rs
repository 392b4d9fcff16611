//! Compaction: cluster near-duplicate memories and replace each cluster
//! with one summarized record.
//!
//! Runs off the request path, per owner. Failure isolation is per
//! cluster: one summarization outage never blocks the other clusters,
//! and a cluster is either fully superseded in one transaction or left
//! untouched.

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::llm::{EmbeddingProvider, Summarizer};
use crate::memory::store::{MemoryStore, cosine_similarity};
use crate::memory::types::{Memory, MemoryType};
use crate::OwnerId;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one compaction run for one owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionReport {
    /// Clusters of size >= 2 found in this run.
    pub clusters_found: usize,
    /// Original records superseded across all merged clusters.
    pub records_superseded: usize,
    /// Clusters skipped because the provider kept failing.
    pub clusters_failed: usize,
}

/// Periodic near-duplicate merger.
pub struct CompactionEngine {
    store: Arc<MemoryStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    summarizer: Arc<dyn Summarizer>,
    config: Arc<MemoryConfig>,
}

impl CompactionEngine {
    pub fn new(
        store: Arc<MemoryStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        summarizer: Arc<dyn Summarizer>,
        config: Arc<MemoryConfig>,
    ) -> Self {
        Self { store, embeddings, summarizer, config }
    }

    /// Run one compaction pass for an owner.
    ///
    /// Idempotent on an unchanged record set: fresh summary records are
    /// singletons in their own cluster, so a second run finds nothing to
    /// merge.
    pub async fn compact_owner(&self, owner_id: &OwnerId) -> Result<CompactionReport> {
        let active = self.store.fetch_active(owner_id).await?;
        let clusters = cluster_by_similarity(&active, self.config.compaction.similarity_threshold);

        let mut report = CompactionReport::default();
        for cluster in clusters {
            if cluster.len() < self.config.compaction.min_cluster_size {
                continue;
            }
            report.clusters_found += 1;

            let members: Vec<&Memory> = cluster.iter().map(|&i| &active[i]).collect();
            match self.merge_cluster(owner_id, &members).await {
                Ok(()) => report.records_superseded += members.len(),
                Err(error) => {
                    report.clusters_failed += 1;
                    tracing::warn!(
                        owner_id = %owner_id,
                        cluster_size = members.len(),
                        %error,
                        "cluster compaction failed, skipping"
                    );
                }
            }
        }

        if report.clusters_found > 0 {
            tracing::info!(
                owner_id = %owner_id,
                clusters = report.clusters_found,
                superseded = report.records_superseded,
                failed = report.clusters_failed,
                "compaction run complete"
            );
        }
        Ok(report)
    }

    /// Summarize one cluster and supersede its members atomically.
    async fn merge_cluster(&self, owner_id: &OwnerId, members: &[&Memory]) -> Result<()> {
        let texts: Vec<String> = members.iter().map(|m| m.content.clone()).collect();

        let summary = self
            .with_backoff(|| self.summarizer.summarize(&texts))
            .await?;
        let embedding = self.with_backoff(|| self.embeddings.embed(&summary)).await?;

        let importance = members
            .iter()
            .map(|m| m.importance)
            .fold(0.0f32, f32::max);

        let mut metadata = HashMap::new();
        metadata.insert("merged_count".to_string(), serde_json::json!(members.len()));

        let replacement = Memory::new(owner_id.clone(), summary, dominant_type(members))
            .with_embedding(embedding)
            .with_importance(importance)
            .with_pinned(members.iter().any(|m| m.pinned))
            .with_metadata(metadata);

        let old_ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
        self.store.mark_superseded(owner_id, &old_ids, &replacement).await
    }

    /// Retry transient provider failures with doubling backoff; anything
    /// else fails immediately.
    async fn with_backoff<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.config.compaction.max_retries => {
                    let delay = self
                        .config
                        .compaction
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempt));
                    tracing::debug!(attempt, ?delay, %error, "provider call failed, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Single-link clustering over embeddings: a record joins a cluster when
/// it is similar enough to at least one existing member. Records are
/// visited oldest first so cluster assignment is deterministic.
pub fn cluster_by_similarity(records: &[Memory], threshold: f32) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..records.len())
        .filter(|&i| records[i].embedding.is_some())
        .collect();
    order.sort_by_key(|&i| records[i].created_at);

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for &i in &order {
        let embedding = records[i].embedding.as_deref().unwrap_or_default();
        let joined = clusters.iter_mut().find(|cluster| {
            cluster.iter().any(|&j| {
                records[j]
                    .embedding
                    .as_deref()
                    .is_some_and(|other| cosine_similarity(embedding, other) >= threshold)
            })
        });
        match joined {
            Some(cluster) => cluster.push(i),
            None => clusters.push(vec![i]),
        }
    }

    clusters
}

/// Most common member type; ties resolve to `ConversationSummary` since
/// the merged record is a summary by construction.
fn dominant_type(members: &[&Memory]) -> MemoryType {
    let mut counts: HashMap<MemoryType, usize> = HashMap::new();
    for member in members {
        *counts.entry(member.memory_type).or_insert(0) += 1;
    }

    let max = counts.values().copied().max().unwrap_or(0);
    let leaders: Vec<MemoryType> =
        counts.iter().filter(|&(_, &n)| n == max).map(|(&t, _)| t).collect();

    match leaders.as_slice() {
        [single] => *single,
        _ => MemoryType::ConversationSummary,
    }
}
