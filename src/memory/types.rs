//! Memory record types.

use crate::OwnerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A single durable memory about a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub id: String,
    pub owner_id: OwnerId,
    pub content: String,
    /// Must be present (and match the deployment dimension) before the
    /// record is searchable; `MemoryStore::put` enforces this.
    pub embedding: Option<Vec<f32>>,
    pub memory_type: MemoryType,
    pub importance: f32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_accessed_at: chrono::DateTime<chrono::Utc>,
    pub access_count: i64,
    /// Set by compaction when a newer record replaces this one. Records
    /// with this set are invisible to retrieval but kept for audit until
    /// the retention sweeper hard-deletes them.
    pub superseded_by: Option<String>,
    /// Pinned records are never evicted by the decay rule.
    pub pinned: bool,
    /// Open key/value attributes (conversation id, source, ...). Scalar
    /// values only; never consulted by ranking.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Memory {
    /// Create a new memory with default values.
    pub fn new(owner_id: OwnerId, content: impl Into<String>, memory_type: MemoryType) -> Self {
        let now = chrono::Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            content: content.into(),
            embedding: None,
            memory_type,
            importance: memory_type.base_importance(),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            superseded_by: None,
            pinned: false,
            metadata: HashMap::new(),
        }
    }

    /// Set the importance explicitly, clamped to [0, 1].
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Attach the embedding vector.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Replace the metadata map.
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the pinned flag.
    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }
}

/// Memory types. A closed set; unknown type strings are rejected at the
/// boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Something that is true about the user or the world.
    Fact,
    /// Something the user likes or dislikes.
    Preference,
    /// A consolidated summary of one or more conversations.
    ConversationSummary,
    /// Something that happened.
    Event,
}

impl MemoryType {
    /// Base importance for new memories of this type. Facts and
    /// preferences start higher than raw conversation material.
    pub fn base_importance(&self) -> f32 {
        match self {
            MemoryType::Preference => 0.7,
            MemoryType::Fact => 0.6,
            MemoryType::ConversationSummary => 0.5,
            MemoryType::Event => 0.4,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryType::Fact => write!(f, "fact"),
            MemoryType::Preference => write!(f, "preference"),
            MemoryType::ConversationSummary => write!(f, "conversation_summary"),
            MemoryType::Event => write!(f, "event"),
        }
    }
}

impl std::str::FromStr for MemoryType {
    type Err = crate::error::MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(MemoryType::Fact),
            "preference" => Ok(MemoryType::Preference),
            "conversation_summary" => Ok(MemoryType::ConversationSummary),
            "event" => Ok(MemoryType::Event),
            other => Err(crate::error::MemoryError::Validation(format!(
                "unknown memory type: {other}"
            ))),
        }
    }
}

/// Read-only view of a memory, as handed to callers. Embeddings stay
/// internal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryView {
    pub id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: f32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_accessed_at: chrono::DateTime<chrono::Utc>,
    pub access_count: i64,
    pub pinned: bool,
    pub superseded_by: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl From<Memory> for MemoryView {
    fn from(memory: Memory) -> Self {
        Self {
            id: memory.id,
            content: memory.content,
            memory_type: memory.memory_type,
            importance: memory.importance,
            created_at: memory.created_at,
            last_accessed_at: memory.last_accessed_at,
            access_count: memory.access_count,
            pinned: memory.pinned,
            superseded_by: memory.superseded_by,
            metadata: memory.metadata,
        }
    }
}

/// A retrieval hit with its ranking scores.
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub memory: MemoryView,
    /// Cosine similarity to the query.
    pub similarity: f32,
    /// Composite score used for ranking.
    pub score: f32,
}

/// Filter for `list_by_owner`.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub memory_type: Option<MemoryType>,
    pub include_superseded: bool,
    pub limit: Option<i64>,
}

/// Per-owner memory counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    pub total: i64,
    pub active: i64,
    pub superseded: i64,
    pub facts: i64,
    pub preferences: i64,
    pub summaries: i64,
    pub events: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn importance_is_clamped() {
        let owner: OwnerId = Arc::from("owner-1");
        let memory = Memory::new(owner, "likes tea", MemoryType::Preference).with_importance(3.0);
        assert_eq!(memory.importance, 1.0);
    }

    #[test]
    fn base_importance_favors_durable_types() {
        assert!(MemoryType::Preference.base_importance() > MemoryType::Event.base_importance());
        assert!(MemoryType::Fact.base_importance() > MemoryType::Event.base_importance());
    }

    #[test]
    fn type_round_trips_through_display() {
        for memory_type in [
            MemoryType::Fact,
            MemoryType::Preference,
            MemoryType::ConversationSummary,
            MemoryType::Event,
        ] {
            let parsed: MemoryType = memory_type.to_string().parse().expect("should parse back");
            assert_eq!(parsed, memory_type);
        }
    }

    #[test]
    fn unknown_type_string_is_rejected() {
        assert!("identity".parse::<MemoryType>().is_err());
    }
}
