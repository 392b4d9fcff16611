//! Inference provider clients (embeddings and summarization).

pub mod ollama;
pub mod traits;

pub use ollama::OllamaClient;
pub use traits::{EmbeddingProvider, Summarizer};
