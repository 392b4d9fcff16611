//! Retrieval: embed the query, oversample candidates, re-rank by the
//! composite score, and record the hits.
//!
//! This sits on the conversation request path, so it degrades instead of
//! failing: a provider outage or timeout produces an empty result and a
//! warning, never an error the caller has to handle.

use crate::config::MemoryConfig;
use crate::error::Result;
use crate::llm::EmbeddingProvider;
use crate::memory::scoring;
use crate::memory::store::MemoryStore;
use crate::memory::types::{Memory, RetrievedMemory};
use crate::OwnerId;
use std::sync::Arc;

/// Composite-score retrieval engine.
pub struct RetrievalEngine {
    store: Arc<MemoryStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: Arc<MemoryConfig>,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<MemoryStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: Arc<MemoryConfig>,
    ) -> Self {
        Self { store, embeddings, config }
    }

    /// Top-k memories for a query, ranked by
    /// `alpha * similarity + beta * decayed_importance + gamma * recency`.
    ///
    /// Every returned record gets its access recorded, which boosts its
    /// importance and resets its decay clock. Returns an empty list when
    /// nothing clears `min_similarity`, the provider is unreachable, or
    /// the store misbehaves; the conversation flow never sees an error.
    pub async fn retrieve(
        &self,
        owner_id: &OwnerId,
        query_text: &str,
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<RetrievedMemory>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let embed = self.embeddings.embed(query_text);
        let query_vector =
            match tokio::time::timeout(self.config.provider.request_timeout, embed).await {
                Ok(Ok(vector)) => vector,
                Ok(Err(error)) => {
                    tracing::warn!(owner_id = %owner_id, %error, "query embedding failed, returning no memories");
                    return Ok(Vec::new());
                }
                Err(_) => {
                    tracing::warn!(owner_id = %owner_id, "query embedding timed out, returning no memories");
                    return Ok(Vec::new());
                }
            };

        let oversample = k.saturating_mul(self.config.retrieval.oversample_factor);
        let candidates = match self
            .store
            .similarity_search(owner_id, &query_vector, oversample, min_similarity)
            .await
        {
            Ok(candidates) => candidates,
            Err(error) => {
                tracing::warn!(owner_id = %owner_id, %error, "candidate search failed, returning no memories");
                return Ok(Vec::new());
            }
        };

        let now = chrono::Utc::now();
        let mut ranked: Vec<(Memory, f32, f32)> = candidates
            .into_iter()
            .map(|(memory, similarity)| {
                let score = self.composite_score(&memory, similarity, now);
                (memory, similarity, score)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.created_at.cmp(&a.0.created_at))
        });
        ranked.truncate(k);

        let boost = self.config.decay.access_boost;
        let mut results = Vec::with_capacity(ranked.len());
        for (memory, similarity, score) in ranked {
            // A hit is still a hit if its access bookkeeping fails.
            if let Err(error) = self.store.record_access(&memory.id, boost).await {
                tracing::warn!(owner_id = %owner_id, memory_id = %memory.id, %error, "failed to record access");
            }
            results.push(RetrievedMemory { memory: memory.into(), similarity, score });
        }

        tracing::debug!(owner_id = %owner_id, hits = results.len(), "memory retrieval complete");
        Ok(results)
    }

    fn composite_score(&self, memory: &Memory, similarity: f32, now: chrono::DateTime<chrono::Utc>) -> f32 {
        let weights = &self.config.retrieval;
        weights.similarity_weight * similarity
            + weights.importance_weight * scoring::decayed_importance(memory, now, &self.config.decay)
            + weights.recency_weight * scoring::recency_factor(memory, now, &self.config.decay)
    }
}
