//! Embedding and generation provider
//!
//! This module provides an abstraction over the external model API with:
//! - A trait the ingestion pipeline and query engine depend on
//! - An OpenAI-compatible HTTP backend
//! - Batch processing for embeddings
//!
//! Every failure is reported as a `ProviderError`: rate limited, timed out,
//! or an API error.

mod http_backend;
mod rate_limit;

pub use http_backend::*;
pub use rate_limit::*;

use crate::config::Config;
use crate::error::{ProviderError, ProviderResult, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding/generation providers
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input in order
    async fn embed(&self, texts: Vec<String>) -> ProviderResult<Vec<Vec<f32>>>;

    /// Generate a completion for `prompt`, grounded by `context`
    async fn generate(&self, prompt: &str, context: &str) -> ProviderResult<String>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Create the configured provider
pub fn create_provider(config: &Config) -> Result<Arc<dyn ModelProvider>> {
    let provider = OpenAiProvider::new(&config.provider, config.provider_api_key())?;
    Ok(Arc::new(provider))
}

/// Helper to embed in batches, keeping input order
pub async fn embed_in_batches(
    provider: &dyn ModelProvider,
    texts: Vec<String>,
    batch_size: usize,
) -> ProviderResult<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let embeddings = provider.embed(chunk.to_vec()).await?;
        if embeddings.len() != chunk.len() {
            return Err(ProviderError::api(
                None,
                format!(
                    "provider returned {} embeddings for {} inputs",
                    embeddings.len(),
                    chunk.len()
                ),
            ));
        }
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}

/// Bound a provider call; expiry becomes `ProviderError::Timeout`
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ProviderError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProvider;

    #[tokio::test]
    async fn test_embed_in_batches_keeps_order() {
        let provider = FakeProvider::new(4);
        let texts: Vec<String> = (0..7).map(|i| format!("text {i}")).collect();

        let vectors = embed_in_batches(&provider, texts.clone(), 3).await.unwrap();

        assert_eq!(vectors.len(), 7);
        assert_eq!(provider.embed_calls(), 3);
        assert_eq!(vectors[5], provider.vector_for(&texts[5]));
    }

    #[tokio::test]
    async fn test_embed_in_batches_propagates_errors() {
        let provider = FakeProvider::new(4);
        provider.fail_embeds_with(vec![ProviderError::RateLimited {
            retry_after_secs: 9,
        }]);

        let err = embed_in_batches(&provider, vec!["a".to_string()], 8)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::RateLimited { retry_after_secs: 9 });
    }

    #[tokio::test]
    async fn test_with_timeout_maps_expiry() {
        let result: ProviderResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(ProviderError::Timeout));
    }
}
