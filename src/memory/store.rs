//! Memory storage (SQLite).
//!
//! Embeddings are stored inline as little-endian f32 blobs and similarity
//! search runs in-process over the owner's active vectors. Every query is
//! scoped to exactly one owner; nothing in this module can read across
//! owners.

use crate::OwnerId;
use crate::error::{MemoryError, Result};
use crate::memory::types::{Memory, MemoryFilter, MemoryStats, MemoryType};
use anyhow::Context as _;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Memory store for CRUD, similarity search, and supersession.
pub struct MemoryStore {
    pool: SqlitePool,
    dimension: usize,
}

impl MemoryStore {
    /// Create a new memory store with the given SQLite pool and
    /// deployment embedding dimension.
    pub fn new(pool: SqlitePool, dimension: usize) -> Arc<Self> {
        Arc::new(Self { pool, dimension })
    }

    /// The embedding dimension every stored record must match.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Get a reference to the SQLite pool.
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the memory tables if they don't exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB,
                memory_type TEXT NOT NULL,
                importance REAL NOT NULL DEFAULT 0.5,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_accessed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                access_count INTEGER NOT NULL DEFAULT 0,
                superseded_by TEXT,
                pinned INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .with_context(|| "failed to create memories table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_owner ON memories(owner_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memories_owner_active \
             ON memories(owner_id, superseded_by)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a new memory. The embedding must already be computed;
    /// records are never stored half-built.
    pub async fn put(&self, memory: &Memory) -> Result<()> {
        let embedding = self.validate_record(memory)?;
        let metadata = serde_json::to_string(&memory.metadata)
            .with_context(|| format!("failed to serialize metadata for memory {}", memory.id))?;

        sqlx::query(
            r#"
            INSERT INTO memories (id, owner_id, content, embedding, memory_type, importance,
                                  created_at, last_accessed_at, access_count, superseded_by,
                                  pinned, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&memory.id)
        .bind(memory.owner_id.as_ref())
        .bind(&memory.content)
        .bind(embedding_to_bytes(embedding))
        .bind(memory.memory_type.to_string())
        .bind(memory.importance)
        .bind(memory.created_at)
        .bind(memory.last_accessed_at)
        .bind(memory.access_count)
        .bind(&memory.superseded_by)
        .bind(memory.pinned)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save memory {}", memory.id))?;

        Ok(())
    }

    /// Load a memory by id, scoped to its owner.
    pub async fn get_by_id(&self, owner_id: &OwnerId, id: &str) -> Result<Option<Memory>> {
        let row = sqlx::query("SELECT * FROM memories WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id.as_ref())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load memory {id}"))?;

        Ok(row.map(|row| row_to_memory(&row)))
    }

    /// List an owner's memories, newest first.
    pub async fn list_by_owner(
        &self,
        owner_id: &OwnerId,
        filter: &MemoryFilter,
    ) -> Result<Vec<Memory>> {
        let mut sql = String::from("SELECT * FROM memories WHERE owner_id = ?");
        if !filter.include_superseded {
            sql.push_str(" AND superseded_by IS NULL");
        }
        if filter.memory_type.is_some() {
            sql.push_str(" AND memory_type = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql).bind(owner_id.as_ref());
        if let Some(memory_type) = filter.memory_type {
            query = query.bind(memory_type.to_string());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to list memories for owner {owner_id}"))?;

        Ok(rows.iter().map(row_to_memory).collect())
    }

    /// All active (non-superseded) memories for an owner.
    pub async fn fetch_active(&self, owner_id: &OwnerId) -> Result<Vec<Memory>> {
        self.list_by_owner(owner_id, &MemoryFilter::default()).await
    }

    /// Rank the owner's active memories by cosine similarity to the query
    /// vector. Superseded records are excluded; ties break toward more
    /// recently created records.
    pub async fn similarity_search(
        &self,
        owner_id: &OwnerId,
        query_vector: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<(Memory, f32)>> {
        if query_vector.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            }
            .into());
        }

        let candidates = self.fetch_active(owner_id).await?;

        let mut scored: Vec<(Memory, f32)> = candidates
            .into_iter()
            .filter_map(|memory| {
                let similarity =
                    memory.embedding.as_deref().map(|e| cosine_similarity(e, query_vector))?;
                (similarity >= min_similarity).then_some((memory, similarity))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.created_at.cmp(&a.0.created_at))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    /// Overwrite a memory's importance, clamped to [0, 1].
    pub async fn update_importance(&self, id: &str, new_value: f32) -> Result<()> {
        let result = sqlx::query("UPDATE memories SET importance = ? WHERE id = ?")
            .bind(new_value.clamp(0.0, 1.0))
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update importance for memory {id}"))?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound { id: id.to_string() }.into());
        }
        Ok(())
    }

    /// Record a retrieval hit: reset the decay clock, bump the access
    /// count, and boost importance toward (never above) 1.0.
    pub async fn record_access(&self, id: &str, boost: f32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE memories
            SET last_accessed_at = ?, access_count = access_count + 1,
                importance = MIN(1.0, importance + ?)
            WHERE id = ?
            "#,
        )
        .bind(chrono::Utc::now())
        .bind(boost)
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to record access for memory {id}"))?;

        Ok(())
    }

    /// Set or clear the pinned flag on a memory.
    pub async fn set_pinned(&self, owner_id: &OwnerId, id: &str, pinned: bool) -> Result<()> {
        let result = sqlx::query("UPDATE memories SET pinned = ? WHERE id = ? AND owner_id = ?")
            .bind(pinned)
            .bind(id)
            .bind(owner_id.as_ref())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to set pinned flag for memory {id}"))?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound { id: id.to_string() }.into());
        }
        Ok(())
    }

    /// Atomically insert a replacement record and mark the originals
    /// superseded by it. Either the whole cluster flips or nothing does;
    /// a record that is already superseded (or missing) aborts the
    /// transaction.
    pub async fn mark_superseded(
        &self,
        owner_id: &OwnerId,
        old_ids: &[String],
        new_record: &Memory,
    ) -> Result<()> {
        let embedding = self.validate_record(new_record)?;
        if old_ids.is_empty() {
            return Err(MemoryError::Validation("no records to supersede".into()).into());
        }

        let metadata = serde_json::to_string(&new_record.metadata)
            .with_context(|| format!("failed to serialize metadata for memory {}", new_record.id))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO memories (id, owner_id, content, embedding, memory_type, importance,
                                  created_at, last_accessed_at, access_count, superseded_by,
                                  pinned, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&new_record.id)
        .bind(new_record.owner_id.as_ref())
        .bind(&new_record.content)
        .bind(embedding_to_bytes(embedding))
        .bind(new_record.memory_type.to_string())
        .bind(new_record.importance)
        .bind(new_record.created_at)
        .bind(new_record.last_accessed_at)
        .bind(new_record.access_count)
        .bind(new_record.pinned)
        .bind(metadata)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert replacement memory {}", new_record.id))?;

        // last_accessed_at doubles as the supersession timestamp for the
        // tombstoned records; the retention grace period is measured from it.
        let now = chrono::Utc::now();
        for old_id in old_ids {
            let result = sqlx::query(
                r#"
                UPDATE memories SET superseded_by = ?, last_accessed_at = ?
                WHERE id = ? AND owner_id = ? AND superseded_by IS NULL
                "#,
            )
            .bind(&new_record.id)
            .bind(now)
            .bind(old_id)
            .bind(owner_id.as_ref())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to supersede memory {old_id}"))?;

            if result.rows_affected() != 1 {
                tx.rollback().await?;
                return Err(MemoryError::Validation(format!(
                    "memory {old_id} is missing or already superseded"
                ))
                .into());
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Hard-delete a set of memories.
    pub async fn hard_delete(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM memories WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to delete memory {id}"))?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;

        Ok(deleted)
    }

    /// Remove every record for an owner in one statement. All-or-nothing;
    /// used by the data-privacy flow.
    pub async fn hard_delete_owner(&self, owner_id: &OwnerId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM memories WHERE owner_id = ?")
            .bind(owner_id.as_ref())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete memories for owner {owner_id}"))?;

        Ok(result.rows_affected())
    }

    /// Owners with at least one record, for the maintenance loop.
    pub async fn active_owners(&self) -> Result<Vec<OwnerId>> {
        let rows = sqlx::query("SELECT DISTINCT owner_id FROM memories")
            .fetch_all(&self.pool)
            .await
            .with_context(|| "failed to list owners")?;

        Ok(rows
            .iter()
            .map(|row| Arc::from(row.try_get::<String, _>("owner_id").unwrap_or_default()))
            .collect())
    }

    /// Ids of superseded records whose supersession happened before the
    /// cutoff.
    pub async fn superseded_before(
        &self,
        owner_id: &OwnerId,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM memories
            WHERE owner_id = ? AND superseded_by IS NOT NULL AND last_accessed_at < ?
            "#,
        )
        .bind(owner_id.as_ref())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list stale superseded memories for {owner_id}"))?;

        Ok(rows.iter().map(|row| row.try_get("id").unwrap_or_default()).collect())
    }

    /// Per-owner memory counts.
    pub async fn stats(&self, owner_id: &OwnerId) -> Result<MemoryStats> {
        let rows = sqlx::query(
            r#"
            SELECT memory_type, superseded_by IS NOT NULL AS superseded, COUNT(*) AS n
            FROM memories WHERE owner_id = ?
            GROUP BY memory_type, superseded
            "#,
        )
        .bind(owner_id.as_ref())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to compute stats for owner {owner_id}"))?;

        let mut stats = MemoryStats::default();
        for row in rows {
            let count: i64 = row.try_get("n").unwrap_or(0);
            let superseded: bool = row.try_get("superseded").unwrap_or(false);
            stats.total += count;
            if superseded {
                stats.superseded += count;
                continue;
            }
            stats.active += count;
            let type_str: String = row.try_get("memory_type").unwrap_or_default();
            match type_str.parse::<MemoryType>() {
                Ok(MemoryType::Fact) => stats.facts += count,
                Ok(MemoryType::Preference) => stats.preferences += count,
                Ok(MemoryType::ConversationSummary) => stats.summaries += count,
                Ok(MemoryType::Event) => stats.events += count,
                Err(_) => {}
            }
        }

        Ok(stats)
    }

    /// Validate a record against the store's invariants, returning its
    /// embedding on success.
    fn validate_record<'a>(&self, memory: &'a Memory) -> Result<&'a [f32]> {
        if memory.content.trim().is_empty() {
            return Err(MemoryError::Validation("content must not be empty".into()).into());
        }

        for (key, value) in &memory.metadata {
            if value.is_array() || value.is_object() {
                return Err(MemoryError::Validation(format!(
                    "metadata value for '{key}' must be a scalar"
                ))
                .into());
            }
        }

        let embedding = memory
            .embedding
            .as_deref()
            .ok_or_else(|| MemoryError::Validation("record is missing its embedding".into()))?;

        if embedding.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            }
            .into());
        }

        Ok(embedding)
    }
}

/// Cosine similarity: normalized dot product of two equal-length vectors.
/// Zero-norm vectors compare as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Helper: Convert a database row to a Memory.
fn row_to_memory(row: &sqlx::sqlite::SqliteRow) -> Memory {
    let type_str: String = row.try_get("memory_type").unwrap_or_default();
    let memory_type = type_str.parse().unwrap_or(MemoryType::Fact);

    let owner: String = row.try_get("owner_id").unwrap_or_default();
    let metadata: String = row.try_get("metadata").unwrap_or_default();
    let embedding: Option<Vec<u8>> = row.try_get("embedding").ok();

    Memory {
        id: row.try_get("id").unwrap_or_default(),
        owner_id: Arc::from(owner),
        content: row.try_get("content").unwrap_or_default(),
        embedding: embedding.map(|bytes| bytes_to_embedding(&bytes)),
        memory_type,
        importance: row.try_get("importance").unwrap_or(0.5),
        created_at: row.try_get("created_at").unwrap_or_else(|_| chrono::Utc::now()),
        last_accessed_at: row.try_get("last_accessed_at").unwrap_or_else(|_| chrono::Utc::now()),
        access_count: row.try_get("access_count").unwrap_or(0),
        superseded_by: row.try_get("superseded_by").ok().flatten(),
        pinned: row.try_get("pinned").unwrap_or(false),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
    }
}

/// Helper: Encode an embedding as a little-endian f32 blob.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|value| value.to_le_bytes()).collect()
}

/// Helper: Decode a little-endian f32 blob back into an embedding.
fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::types::MemoryFilter;
    use sqlx::sqlite::SqlitePoolOptions;

    const DIM: usize = 4;

    async fn setup_store() -> Arc<MemoryStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite should connect");

        let store = MemoryStore::new(pool, DIM);
        store.initialize().await.expect("schema should be created");
        store
    }

    fn owner(name: &str) -> OwnerId {
        Arc::from(name)
    }

    fn memory(
        owner_id: &OwnerId,
        content: &str,
        embedding: [f32; DIM],
    ) -> Memory {
        Memory::new(owner_id.clone(), content, MemoryType::Fact)
            .with_embedding(embedding.to_vec())
    }

    #[tokio::test]
    async fn put_and_get_round_trip() {
        let store = setup_store().await;
        let alice = owner("alice");
        let record = memory(&alice, "lives in Lisbon", [1.0, 0.0, 0.0, 0.0]);

        store.put(&record).await.expect("put should succeed");

        let loaded = store
            .get_by_id(&alice, &record.id)
            .await
            .expect("get should succeed")
            .expect("record should exist");
        assert_eq!(loaded.content, "lives in Lisbon");
        assert_eq!(loaded.embedding.as_deref(), Some(&[1.0, 0.0, 0.0, 0.0][..]));
        assert_eq!(loaded.memory_type, MemoryType::Fact);
    }

    #[tokio::test]
    async fn put_rejects_dimension_mismatch() {
        let store = setup_store().await;
        let alice = owner("alice");
        let record = Memory::new(alice, "short vector", MemoryType::Fact)
            .with_embedding(vec![1.0, 0.0]);

        let error = store.put(&record).await.expect_err("wrong dimension must fail");
        assert!(matches!(
            error,
            Error::Memory(MemoryError::DimensionMismatch { expected: DIM, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn put_rejects_missing_embedding() {
        let store = setup_store().await;
        let record = Memory::new(owner("alice"), "no vector", MemoryType::Fact);

        let error = store.put(&record).await.expect_err("missing embedding must fail");
        assert!(matches!(error, Error::Memory(MemoryError::Validation(_))));
    }

    #[tokio::test]
    async fn put_rejects_nested_metadata() {
        let store = setup_store().await;
        let alice = owner("alice");
        let mut record = memory(&alice, "has metadata", [1.0, 0.0, 0.0, 0.0]);
        record
            .metadata
            .insert("nested".into(), serde_json::json!({ "deep": true }));

        let error = store.put(&record).await.expect_err("nested metadata must fail");
        assert!(matches!(error, Error::Memory(MemoryError::Validation(_))));
    }

    #[tokio::test]
    async fn similarity_search_never_crosses_owners() {
        let store = setup_store().await;
        let alice = owner("alice");
        let bob = owner("bob");

        store
            .put(&memory(&alice, "alice likes hiking", [1.0, 0.0, 0.0, 0.0]))
            .await
            .expect("put should succeed");
        store
            .put(&memory(&bob, "bob likes hiking", [1.0, 0.0, 0.0, 0.0]))
            .await
            .expect("put should succeed");

        let hits = store
            .similarity_search(&alice, &[1.0, 0.0, 0.0, 0.0], 10, 0.0)
            .await
            .expect("search should succeed");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.owner_id, alice);
    }

    #[tokio::test]
    async fn similarity_search_excludes_superseded_and_honors_threshold() {
        let store = setup_store().await;
        let alice = owner("alice");

        let close = memory(&alice, "close", [1.0, 0.0, 0.0, 0.0]);
        let far = memory(&alice, "far", [0.0, 1.0, 0.0, 0.0]);
        let old = memory(&alice, "old duplicate", [1.0, 0.0, 0.0, 0.0]);
        store.put(&close).await.expect("put should succeed");
        store.put(&far).await.expect("put should succeed");
        store.put(&old).await.expect("put should succeed");

        let replacement = memory(&alice, "replacement", [0.9, 0.1, 0.0, 0.0]);
        store
            .mark_superseded(&alice, &[old.id.clone()], &replacement)
            .await
            .expect("supersession should succeed");

        let hits = store
            .similarity_search(&alice, &[1.0, 0.0, 0.0, 0.0], 10, 0.5)
            .await
            .expect("search should succeed");

        let ids: Vec<&str> = hits.iter().map(|(m, _)| m.id.as_str()).collect();
        assert!(ids.contains(&close.id.as_str()));
        assert!(ids.contains(&replacement.id.as_str()));
        assert!(!ids.contains(&old.id.as_str()), "superseded records must be invisible");
        assert!(!ids.contains(&far.id.as_str()), "below-threshold records must be filtered");
    }

    #[tokio::test]
    async fn similarity_ties_break_toward_newer_records() {
        let store = setup_store().await;
        let alice = owner("alice");

        let mut older = memory(&alice, "older", [1.0, 0.0, 0.0, 0.0]);
        older.created_at = chrono::Utc::now() - chrono::Duration::days(2);
        let newer = memory(&alice, "newer", [1.0, 0.0, 0.0, 0.0]);
        store.put(&older).await.expect("put should succeed");
        store.put(&newer).await.expect("put should succeed");

        let hits = store
            .similarity_search(&alice, &[1.0, 0.0, 0.0, 0.0], 2, 0.0)
            .await
            .expect("search should succeed");

        assert_eq!(hits[0].0.id, newer.id);
        assert_eq!(hits[1].0.id, older.id);
    }

    #[tokio::test]
    async fn mark_superseded_is_all_or_nothing() {
        let store = setup_store().await;
        let alice = owner("alice");

        let first = memory(&alice, "first", [1.0, 0.0, 0.0, 0.0]);
        store.put(&first).await.expect("put should succeed");

        let replacement = memory(&alice, "merged", [1.0, 0.0, 0.0, 0.0]);
        let error = store
            .mark_superseded(
                &alice,
                &[first.id.clone(), "missing-id".to_string()],
                &replacement,
            )
            .await
            .expect_err("superseding a missing record must fail");
        assert!(matches!(error, Error::Memory(MemoryError::Validation(_))));

        // The failed transaction must not have touched anything.
        let reloaded = store
            .get_by_id(&alice, &first.id)
            .await
            .expect("get should succeed")
            .expect("record should exist");
        assert!(reloaded.superseded_by.is_none());
        assert!(
            store
                .get_by_id(&alice, &replacement.id)
                .await
                .expect("get should succeed")
                .is_none(),
            "replacement record must not survive a rolled-back supersession"
        );
    }

    #[tokio::test]
    async fn record_access_boost_never_exceeds_one() {
        let store = setup_store().await;
        let alice = owner("alice");
        let record = memory(&alice, "boosted", [1.0, 0.0, 0.0, 0.0]).with_importance(0.98);
        store.put(&record).await.expect("put should succeed");

        store.record_access(&record.id, 0.05).await.expect("access should succeed");

        let loaded = store
            .get_by_id(&alice, &record.id)
            .await
            .expect("get should succeed")
            .expect("record should exist");
        assert!(loaded.importance <= 1.0);
        assert_eq!(loaded.access_count, 1);
    }

    #[tokio::test]
    async fn update_importance_clamps_and_checks_existence() {
        let store = setup_store().await;
        let alice = owner("alice");
        let record = memory(&alice, "adjustable", [1.0, 0.0, 0.0, 0.0]);
        store.put(&record).await.expect("put should succeed");

        store.update_importance(&record.id, 7.0).await.expect("update should succeed");
        let loaded = store
            .get_by_id(&alice, &record.id)
            .await
            .expect("get should succeed")
            .expect("record should exist");
        assert_eq!(loaded.importance, 1.0);

        let error = store
            .update_importance("missing-id", 0.5)
            .await
            .expect_err("unknown id must fail");
        assert!(matches!(error, Error::Memory(MemoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn hard_delete_owner_removes_everything() {
        let store = setup_store().await;
        let alice = owner("alice");
        let bob = owner("bob");

        store
            .put(&memory(&alice, "a1", [1.0, 0.0, 0.0, 0.0]))
            .await
            .expect("put should succeed");
        store
            .put(&memory(&alice, "a2", [0.0, 1.0, 0.0, 0.0]))
            .await
            .expect("put should succeed");
        store
            .put(&memory(&bob, "b1", [0.0, 0.0, 1.0, 0.0]))
            .await
            .expect("put should succeed");

        let deleted = store.hard_delete_owner(&alice).await.expect("delete should succeed");
        assert_eq!(deleted, 2);

        let remaining = store
            .list_by_owner(&alice, &MemoryFilter { include_superseded: true, ..Default::default() })
            .await
            .expect("list should succeed");
        assert!(remaining.is_empty());

        let bobs = store.fetch_active(&bob).await.expect("list should succeed");
        assert_eq!(bobs.len(), 1, "other owners must be untouched");
    }

    #[tokio::test]
    async fn stats_counts_by_type_and_state() {
        let store = setup_store().await;
        let alice = owner("alice");

        store
            .put(&memory(&alice, "a fact", [1.0, 0.0, 0.0, 0.0]))
            .await
            .expect("put should succeed");
        let pref = Memory::new(alice.clone(), "a preference", MemoryType::Preference)
            .with_embedding(vec![0.0, 1.0, 0.0, 0.0]);
        store.put(&pref).await.expect("put should succeed");

        let doomed = memory(&alice, "doomed", [0.0, 0.0, 1.0, 0.0]);
        store.put(&doomed).await.expect("put should succeed");
        let replacement = Memory::new(alice.clone(), "merged", MemoryType::ConversationSummary)
            .with_embedding(vec![0.0, 0.0, 1.0, 0.0]);
        store
            .mark_superseded(&alice, &[doomed.id], &replacement)
            .await
            .expect("supersession should succeed");

        let stats = store.stats(&alice).await.expect("stats should succeed");
        assert_eq!(stats.total, 4);
        assert_eq!(stats.active, 3);
        assert_eq!(stats.superseded, 1);
        assert_eq!(stats.facts, 1);
        assert_eq!(stats.preferences, 1);
        assert_eq!(stats.summaries, 1);
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn embedding_blob_round_trips() {
        let original = vec![0.25f32, -1.5, 3.75, 0.0];
        let decoded = bytes_to_embedding(&embedding_to_bytes(&original));
        assert_eq!(decoded, original);
    }
}
