//! Configuration for the memory engine.
//!
//! Scoring weights, decay rates, and retention thresholds are policy, not
//! mechanism. They all live here with sensible defaults and can be
//! overridden by construction or `MNEMO_*` environment variables.

use crate::error::{ConfigError, Result};
use crate::memory::types::MemoryType;
use std::time::Duration;

/// Memory engine configuration.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Inference provider settings (embeddings + summarization).
    pub provider: ProviderConfig,

    /// Retrieval ranking settings.
    pub retrieval: RetrievalConfig,

    /// Importance decay settings.
    pub decay: DecayConfig,

    /// Compaction settings.
    pub compaction: CompactionConfig,

    /// Retention sweep settings.
    pub retention: RetentionConfig,

    /// How often the background maintenance loop runs.
    pub maintenance_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            retrieval: RetrievalConfig::default(),
            decay: DecayConfig::default(),
            compaction: CompactionConfig::default(),
            retention: RetentionConfig::default(),
            maintenance_interval: Duration::from_secs(6 * 3600),
        }
    }
}

/// Inference provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the Ollama-compatible inference service.
    pub base_url: String,

    /// Model used for embeddings.
    pub embed_model: String,

    /// Model used for compaction summaries.
    pub summary_model: String,

    /// Embedding dimension. Constant for a deployment; every stored
    /// vector must match it.
    pub dimension: usize,

    /// Maximum input length in characters accepted by `embed`.
    pub max_input_chars: usize,

    /// Global cap on concurrent provider calls, shared by the request
    /// path and background jobs.
    pub max_concurrent_calls: usize,

    /// Request-path timeout for provider calls. On expiry, retrieval
    /// degrades to an empty result instead of blocking the conversation.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            embed_model: "nomic-embed-text".into(),
            summary_model: "llama3.1:8b".into(),
            dimension: 384,
            max_input_chars: 8192,
            max_concurrent_calls: 4,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Retrieval ranking configuration.
///
/// The three weights must sum to 1; `validate` enforces this.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    /// Weight of cosine similarity in the composite score.
    pub similarity_weight: f32,

    /// Weight of decayed importance in the composite score.
    pub importance_weight: f32,

    /// Weight of the recency factor in the composite score.
    pub recency_weight: f32,

    /// Candidate oversampling factor: `similarity_search` fetches
    /// `oversample_factor * k` rows so re-ranking has room to work.
    pub oversample_factor: usize,

    /// Default result count when the caller does not specify one.
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.6,
            importance_weight: 0.25,
            recency_weight: 0.15,
            oversample_factor: 3,
            default_limit: 5,
        }
    }
}

/// Importance decay configuration.
#[derive(Debug, Clone, Copy)]
pub struct DecayConfig {
    /// Per-day decay rate for facts.
    pub fact_decay_per_day: f64,

    /// Per-day decay rate for preferences.
    pub preference_decay_per_day: f64,

    /// Per-day decay rate for conversation summaries. Summaries decay
    /// slowest; they already condense many raw fragments.
    pub summary_decay_per_day: f64,

    /// Per-day decay rate for events.
    pub event_decay_per_day: f64,

    /// Per-day rate for the retrieval recency factor.
    pub recency_rate_per_day: f64,

    /// Importance increment applied on every retrieval hit, clamped so
    /// importance never exceeds 1.0.
    pub access_boost: f32,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            fact_decay_per_day: 0.004,
            preference_decay_per_day: 0.002,
            summary_decay_per_day: 0.003,
            event_decay_per_day: 0.012,
            recency_rate_per_day: 0.1,
            access_boost: 0.05,
        }
    }
}

impl DecayConfig {
    /// Per-day decay rate for a memory type.
    pub fn decay_for(&self, memory_type: MemoryType) -> f64 {
        match memory_type {
            MemoryType::Fact => self.fact_decay_per_day,
            MemoryType::Preference => self.preference_decay_per_day,
            MemoryType::ConversationSummary => self.summary_decay_per_day,
            MemoryType::Event => self.event_decay_per_day,
        }
    }
}

/// Compaction configuration.
#[derive(Debug, Clone, Copy)]
pub struct CompactionConfig {
    /// Pairwise cosine similarity above which two records are considered
    /// near-duplicates.
    pub similarity_threshold: f32,

    /// Minimum cluster size worth summarizing. Singletons are never
    /// touched, which is what makes compaction idempotent.
    pub min_cluster_size: usize,

    /// Provider retries per cluster before the cluster is skipped.
    pub max_retries: u32,

    /// Base backoff between retries; doubles per attempt.
    pub retry_backoff: Duration,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.92,
            min_cluster_size: 2,
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Retention sweep configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    /// Decayed importance below which an unaccessed record is eligible
    /// for eviction.
    pub importance_floor: f32,

    /// Days without access before a below-floor record may be evicted.
    pub retention_window_days: i64,

    /// Days a superseded record is kept for audit before hard deletion.
    pub superseded_grace_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            importance_floor: 0.15,
            retention_window_days: 30,
            superseded_grace_days: 7,
        }
    }
}

impl MemoryConfig {
    /// Load configuration with `MNEMO_*` environment overrides on top of
    /// the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("MNEMO_PROVIDER_URL") {
            config.provider.base_url = url;
        }
        if let Ok(model) = std::env::var("MNEMO_EMBED_MODEL") {
            config.provider.embed_model = model;
        }
        if let Ok(model) = std::env::var("MNEMO_SUMMARY_MODEL") {
            config.provider.summary_model = model;
        }
        if let Some(dimension) = env_parse::<usize>("MNEMO_EMBED_DIMENSION")? {
            config.provider.dimension = dimension;
        }
        if let Some(limit) = env_parse::<usize>("MNEMO_MAX_CONCURRENT_CALLS")? {
            config.provider.max_concurrent_calls = limit;
        }
        if let Some(secs) = env_parse::<u64>("MNEMO_REQUEST_TIMEOUT_SECS")? {
            config.provider.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("MNEMO_MAINTENANCE_INTERVAL_SECS")? {
            config.maintenance_interval = Duration::from_secs(secs);
        }
        if let Some(threshold) = env_parse::<f32>("MNEMO_COMPACTION_THRESHOLD")? {
            config.compaction.similarity_threshold = threshold;
        }
        if let Some(floor) = env_parse::<f32>("MNEMO_IMPORTANCE_FLOOR")? {
            config.retention.importance_floor = floor;
        }
        if let Some(weight) = env_parse::<f32>("MNEMO_SIMILARITY_WEIGHT")? {
            config.retrieval.similarity_weight = weight;
        }
        if let Some(weight) = env_parse::<f32>("MNEMO_IMPORTANCE_WEIGHT")? {
            config.retrieval.importance_weight = weight;
        }
        if let Some(weight) = env_parse::<f32>("MNEMO_RECENCY_WEIGHT")? {
            config.retrieval.recency_weight = weight;
        }
        if let Some(rate) = env_parse::<f64>("MNEMO_FACT_DECAY_PER_DAY")? {
            config.decay.fact_decay_per_day = rate;
        }
        if let Some(rate) = env_parse::<f64>("MNEMO_PREFERENCE_DECAY_PER_DAY")? {
            config.decay.preference_decay_per_day = rate;
        }
        if let Some(rate) = env_parse::<f64>("MNEMO_SUMMARY_DECAY_PER_DAY")? {
            config.decay.summary_decay_per_day = rate;
        }
        if let Some(rate) = env_parse::<f64>("MNEMO_EVENT_DECAY_PER_DAY")? {
            config.decay.event_decay_per_day = rate;
        }
        if let Some(rate) = env_parse::<f64>("MNEMO_RECENCY_RATE_PER_DAY")? {
            config.decay.recency_rate_per_day = rate;
        }
        if let Some(boost) = env_parse::<f32>("MNEMO_ACCESS_BOOST")? {
            config.decay.access_boost = boost;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate invariants the rest of the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.provider.dimension == 0 {
            return Err(ConfigError::Invalid("embedding dimension must be non-zero".into()).into());
        }
        if self.provider.max_concurrent_calls == 0 {
            return Err(ConfigError::Invalid("max_concurrent_calls must be at least 1".into()).into());
        }

        let weight_sum = self.retrieval.similarity_weight
            + self.retrieval.importance_weight
            + self.retrieval.recency_weight;
        if (weight_sum - 1.0).abs() > 1e-3 {
            return Err(ConfigError::Invalid(format!(
                "retrieval weights must sum to 1.0, got {weight_sum}"
            ))
            .into());
        }
        if self.retrieval.oversample_factor == 0 {
            return Err(ConfigError::Invalid("oversample_factor must be at least 1".into()).into());
        }

        let threshold = self.compaction.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "compaction threshold must be within [0, 1], got {threshold}"
            ))
            .into());
        }
        if self.compaction.min_cluster_size < 2 {
            return Err(ConfigError::Invalid("min_cluster_size must be at least 2".into()).into());
        }

        let floor = self.retention.importance_floor;
        if !(0.0..1.0).contains(&floor) {
            return Err(ConfigError::Invalid(format!(
                "importance floor must be within [0, 1), got {floor}"
            ))
            .into());
        }
        if !(0.0..=1.0).contains(&self.decay.access_boost) {
            return Err(ConfigError::Invalid("access boost must be within [0, 1]".into()).into());
        }

        Ok(())
    }
}

/// Parse an environment variable if set, failing loudly on garbage values.
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::BadEnvValue { key: key.into(), value: raw }.into()),
        Err(_) => Ok(None),
    }
}
