//! OpenAI-compatible HTTP provider
//!
//! Talks to any server exposing `/embeddings` and `/chat/completions`
//! (OpenAI, Ollama, vLLM, llama.cpp). Requests are never retried here;
//! the processing queue owns retry policy.

use super::{with_timeout, ModelProvider, ProviderRateLimiter};
use crate::config::ProviderConfig;
use crate::error::{Error, ProviderError, ProviderResult, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Data { data: Vec<EmbeddingData> },
    Embeddings { embeddings: Vec<Vec<f32>> },
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl EmbeddingResponse {
    fn into_embeddings(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponse::Embeddings { embeddings } => embeddings,
            EmbeddingResponse::Data { mut data } => {
                if data.iter().all(|d| d.index.is_some()) {
                    data.sort_by_key(|d| d.index);
                }
                data.into_iter().map(|d| d.embedding).collect()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Provider backed by an OpenAI-compatible REST API
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    chat_model: String,
    dimension: usize,
    timeout: Duration,
    default_retry_after_secs: u64,
    temperature: f32,
    max_tokens: u32,
    limiter: Option<ProviderRateLimiter>,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, api_key: Option<String>) -> Result<Self> {
        url::Url::parse(&config.base_url)?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create provider client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            dimension: config.dimension,
            timeout,
            default_retry_after_secs: config.default_retry_after_secs,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            limiter: ProviderRateLimiter::from_config(config.requests_per_second),
        })
    }

    /// Override the per-request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> ProviderResult<T>
    where
        B: Serialize + Sync,
        T: for<'de> Deserialize<'de>,
    {
        if let Some(limiter) = &self.limiter {
            limiter.wait().await;
        }

        let url = self.endpoint(path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(url = %url, "Sending provider request");
        with_timeout(self.timeout, async {
            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = parse_retry_after(response.headers(), Utc::now())
                    .unwrap_or(self.default_retry_after_secs);
                warn!(url = %url, retry_after_secs, "Provider rate limited request");
                return Err(ProviderError::RateLimited { retry_after_secs });
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(ProviderError::api(
                    Some(status.as_u16()),
                    error_message(&text, status),
                ));
            }

            response.json::<T>().await.map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::api(
                        Some(status.as_u16()),
                        format!("invalid response body: {}", e),
                    )
                }
            })
        })
        .await
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn embed(&self, texts: Vec<String>) -> ProviderResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response: EmbeddingResponse = self.post_json("embeddings", &request).await?;
        let embeddings = response.into_embeddings();

        if embeddings.len() != expected {
            return Err(ProviderError::api(
                None,
                format!(
                    "expected {} embeddings, provider returned {}",
                    expected,
                    embeddings.len()
                ),
            ));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(ProviderError::api(
                None,
                format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    bad.len()
                ),
            ));
        }

        Ok(embeddings)
    }

    async fn generate(&self, prompt: &str, context: &str) -> ProviderResult<String> {
        let mut messages = Vec::with_capacity(2);
        if !context.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: context,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };
        let response: ChatResponse = self.post_json("chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::api(None, "completion contained no choices"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Seconds to wait from a `Retry-After` header (delta-seconds or HTTP-date)
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<u64> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&Utc).signed_duration_since(now).num_seconds();
    Some(delta.max(0) as u64)
}

fn error_message(body: &str, status: StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        return parsed.error.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
