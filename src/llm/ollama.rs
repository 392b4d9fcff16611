//! Ollama HTTP client for embeddings and summarization.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::llm::traits::{EmbeddingProvider, Summarizer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Client for an Ollama-compatible inference service.
///
/// All calls pass through a single semaphore so the inference service is
/// never hit by more than `max_concurrent_calls` requests at once,
/// regardless of whether they come from the request path or a background
/// job.
pub struct OllamaClient {
    http: reqwest::Client,
    config: ProviderConfig,
    limiter: Semaphore,
}

impl OllamaClient {
    /// Create a new client from provider configuration.
    pub fn new(config: ProviderConfig) -> Result<Arc<Self>> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        let limiter = Semaphore::new(config.max_concurrent_calls);

        Ok(Arc::new(Self { http, config, limiter }))
    }

    fn check_input(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ProviderError::InvalidInput("text must not be empty".into()).into());
        }
        if text.len() > self.config.max_input_chars {
            return Err(ProviderError::InvalidInput(format!(
                "text exceeds {} characters",
                self.config.max_input_chars
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.check_input(text)?;

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ProviderError::Unavailable("provider limiter closed".into()))?;

        let url = format!("{}/api/embeddings", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .json(&EmbeddingRequest { model: &self.config.embed_model, prompt: text })
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "embedding API returned {}",
                response.status()
            ))
            .into());
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(format!("bad embedding payload: {e}")))?;

        if parsed.embedding.len() != self.config.dimension {
            return Err(ProviderError::UnexpectedResponse(format!(
                "provider returned {}-dimensional vector, expected {}",
                parsed.embedding.len(),
                self.config.dimension
            ))
            .into());
        }

        Ok(parsed.embedding)
    }
}

#[async_trait::async_trait]
impl Summarizer for OllamaClient {
    async fn summarize(&self, texts: &[String]) -> Result<String> {
        if texts.is_empty() {
            return Err(ProviderError::InvalidInput("nothing to summarize".into()).into());
        }

        let mut prompt = String::from(
            "Consolidate the following overlapping notes about a user into a single \
             concise statement. Keep every distinct detail, drop repetition, and \
             answer with the statement only.\n\n",
        );
        for (i, text) in texts.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, text));
        }

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| ProviderError::Unavailable("provider limiter closed".into()))?;

        let url = format!("{}/api/generate", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .json(&GenerateRequest {
                model: &self.config.summary_model,
                prompt: &prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("summarization request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "generate API returned {}",
                response.status()
            ))
            .into());
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(format!("bad generate payload: {e}")))?;

        let summary = parsed.response.trim().to_string();
        if summary.is_empty() {
            return Err(ProviderError::UnexpectedResponse("empty summary".into()).into());
        }

        Ok(summary)
    }
}
