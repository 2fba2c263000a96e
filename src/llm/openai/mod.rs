
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{ChatModel, Message, ToolSpec};
use crate::config::LlmConfig;
use crate::http::{RetryPolicy, build_agent};

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_base: String,
    api_key: String,
    model: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "<[ToolSpec]>::is_empty")]
    tools: &'a [ToolSpec],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub struct ModelEntry {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        config
            .validate()
            .context("Invalid LLM configuration")?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            agent: build_agent(Duration::from_secs(config.timeout_secs)),
            retry: RetryPolicy::default(),
        })
    }

    #[inline]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    /// Verify the endpoint is reachable and the key is accepted
    #[inline]
    pub fn health_check(&self) -> Result<Vec<ModelEntry>> {
        let url = self.endpoint("models");
        debug!("Checking chat endpoint at {}", url);

        let response_text = self
            .retry
            .run(&url, || {
                self.agent
                    .get(&url)
                    .header("Authorization", &format!("Bearer {}", self.api_key))
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to reach chat endpoint")?;

        let models: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        info!(
            "Chat endpoint {} is reachable ({} models)",
            self.api_base,
            models.data.len()
        );
        Ok(models.data)
    }
}

impl ChatModel for OpenAiClient {
    #[inline]
    fn chat(&self, messages: &[Message], tools: &[ToolSpec], temperature: f32) -> Result<Message> {
        let url = self.endpoint("chat/completions");
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            temperature,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        debug!(
            "Sending {} messages ({} tools) to {}",
            messages.len(),
            tools.len(),
            self.model
        );

        let response_text = self
            .retry
            .run(&url, || {
                self.agent
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .header("Authorization", &format!("Bearer {}", self.api_key))
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Chat completion request failed")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        if let Some(usage) = &response.usage {
            debug!("Chat completion used {} tokens", usage.total_tokens);
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .context("Chat response contained no choices")?;

        debug!(
            "Finish reason: {}",
            choice.finish_reason.as_deref().unwrap_or("unknown")
        );
        Ok(choice.message)
    }
}
