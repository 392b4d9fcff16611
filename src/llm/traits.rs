//! Provider seams for the memory engine.
//!
//! The engine only ever talks to the inference service through these two
//! traits, so tests can substitute deterministic in-process fakes.

use crate::error::Result;

/// Turns text into a fixed-dimension embedding vector.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single non-empty text.
    ///
    /// Fails with `ProviderError::InvalidInput` for empty or oversized
    /// text and `ProviderError::Unavailable` on network or timeout
    /// failures. The returned vector always has the deployment's
    /// configured dimension.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Consolidates several near-duplicate texts into one. Used only by the
/// compaction engine.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, texts: &[String]) -> Result<String>;
}
