#[cfg(test)]
mod tests;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::Embedder;
use crate::config::OllamaConfig;
use crate::http::{RetryPolicy, build_agent};

/// Output width of `nomic-embed-text`, the default model
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Embedding client for a local Ollama server (`/api/embed`, `/api/tags`)
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: usize,
    dimension: usize,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbedBody<'a, T: Serialize + ?Sized> {
    model: &'a str,
    input: &'a T,
}

#[derive(Debug, Deserialize)]
struct EmbedReply {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct TagsReply {
    models: Vec<LocalModel>,
}

/// One entry of `/api/tags`
#[derive(Debug, Deserialize)]
pub struct LocalModel {
    pub name: String,
    pub size: Option<u64>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Invalid Ollama address in config")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1) as usize,
            dimension: config.embedding_dimension as usize,
            agent: build_agent(REQUEST_TIMEOUT),
            retry: RetryPolicy::default(),
        })
    }

    #[inline]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `route` is relative (`api/embed`) so a base path is kept
    fn endpoint(&self, route: &str) -> Result<Url> {
        self.base_url
            .join(route)
            .with_context(|| format!("Cannot build Ollama URL for {}", route))
    }

    #[inline]
    pub fn local_models(&self) -> Result<Vec<LocalModel>> {
        let url = self.endpoint("api/tags")?;
        let body = self
            .retry
            .run(url.as_str(), || {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .with_context(|| format!("Ollama is not reachable at {}", self.base_url))?;

        let reply: TagsReply = serde_json::from_str(&body).context("Unexpected /api/tags reply")?;
        Ok(reply.models)
    }

    /// Confirms the server answers and has the configured model pulled.
    /// An untagged model name matches its `:latest` variant. Returns the
    /// name the server lists it under.
    #[inline]
    pub fn check_model(&self) -> Result<String> {
        let models = self.local_models()?;
        let tagged = if self.model.contains(':') {
            None
        } else {
            Some(format!("{}:latest", self.model))
        };

        let Some(model) = models
            .iter()
            .find(|m| m.name == self.model || tagged.as_deref() == Some(m.name.as_str()))
        else {
            let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            bail!(
                "Model '{}' is not pulled on {} (available: {}). Run `ollama pull {}`",
                self.model,
                self.base_url,
                if names.is_empty() { "none".to_string() } else { names.join(", ") },
                self.model
            );
        };

        info!("Ollama at {} serves {}", self.base_url, model.name);
        Ok(model.name.clone())
    }

    fn embed_request<T: Serialize + ?Sized>(&self, input: &T, count: usize) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint("api/embed")?;
        let payload = serde_json::to_string(&EmbedBody {
            model: &self.model,
            input,
        })?;

        let body = self
            .retry
            .run(url.as_str(), || {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&payload)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Embedding request failed")?;

        let reply: EmbedReply = serde_json::from_str(&body).context("Unexpected /api/embed reply")?;
        if reply.embeddings.len() != count {
            bail!(
                "Asked for {} embeddings, Ollama returned {}",
                count,
                reply.embeddings.len()
            );
        }
        if let Some(vector) = reply.embeddings.iter().find(|v| v.len() != self.dimension) {
            bail!(
                "Embedding dimension mismatch: model returned {}, configured {}",
                vector.len(),
                self.dimension
            );
        }
        Ok(reply.embeddings)
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_request(text, 1)?
            .pop()
            .context("Ollama returned no embedding")
    }

    /// Sends `batch_size` texts per request
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (index, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!("Embedding batch {} ({} texts)", index + 1, batch.len());
            let embedded = self
                .embed_request(batch, batch.len())
                .with_context(|| format!("Batch {} of {} texts failed", index + 1, batch.len()))?;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }
}
