//! Cache invalidation hooks
//!
//! Called after every committed change to a material's processing status so
//! external read caches can drop stale entries. Hook failures are logged and
//! never affect the queue.

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::meta::MaterialStatus;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn material_status_changed(&self, material_id: &str, status: MaterialStatus);
}

/// Does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

#[async_trait]
impl CacheInvalidator for NoopInvalidator {
    async fn material_status_changed(&self, _material_id: &str, _status: MaterialStatus) {}
}

/// Logs each change at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInvalidator;

#[async_trait]
impl CacheInvalidator for LoggingInvalidator {
    async fn material_status_changed(&self, material_id: &str, status: MaterialStatus) {
        debug!(material_id = %material_id, status = %status, "Material status changed");
    }
}

#[derive(Debug, Serialize)]
struct InvalidationPayload<'a> {
    material_id: &'a str,
    processing_status: MaterialStatus,
}

/// POSTs `{material_id, processing_status}` to a webhook
pub struct WebhookInvalidator {
    client: Client,
    url: String,
}

impl WebhookInvalidator {
    pub fn new(url: &str) -> Result<Self> {
        url::Url::parse(url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create webhook client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl CacheInvalidator for WebhookInvalidator {
    async fn material_status_changed(&self, material_id: &str, status: MaterialStatus) {
        let payload = InvalidationPayload {
            material_id,
            processing_status: status,
        };

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(material_id = %material_id, status = %status, "Cache invalidated");
            }
            Ok(response) => {
                warn!(
                    material_id = %material_id,
                    status = %response.status(),
                    "Cache invalidation webhook rejected request"
                );
            }
            Err(e) => {
                warn!(material_id = %material_id, error = %e, "Cache invalidation webhook failed");
            }
        }
    }
}

/// Webhook when configured, otherwise logging only
pub fn create_invalidator(config: &CacheConfig) -> Result<Arc<dyn CacheInvalidator>> {
    match &config.invalidation_url {
        Some(url) => Ok(Arc::new(WebhookInvalidator::new(url)?)),
        None => Ok(Arc::new(LoggingInvalidator)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_webhook_posts_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/invalidate"))
            .and(body_json(json!({
                "material_id": "m1",
                "processing_status": "completed"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let hook = WebhookInvalidator::new(&format!("{}/invalidate", server.uri())).unwrap();
        hook.material_status_changed("m1", MaterialStatus::Completed)
            .await;
    }

    #[tokio::test]
    async fn test_webhook_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let hook = WebhookInvalidator::new(&server.uri()).unwrap();
        hook.material_status_changed("m1", MaterialStatus::Failed)
            .await;

        let unreachable = WebhookInvalidator::new("http://127.0.0.1:9/hook").unwrap();
        unreachable
            .material_status_changed("m1", MaterialStatus::Queued)
            .await;
    }

    #[test]
    fn test_create_invalidator_rejects_bad_url() {
        let config = CacheConfig {
            invalidation_url: Some("not a url".to_string()),
        };
        assert!(create_invalidator(&config).is_err());
        assert!(create_invalidator(&CacheConfig::default()).is_ok());
    }
}
