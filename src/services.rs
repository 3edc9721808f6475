//! Service wiring
//!
//! Builds the queue, pipeline and query engine from configuration so the
//! CLI and the HTTP server share one construction path.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{BlobFetcher, HttpFetcher};
use crate::ingest::IngestionPipeline;
use crate::meta::MetaDb;
use crate::parse::{DocumentExtractor, TextExtractor};
use crate::provider::{create_provider, ModelProvider};
use crate::queue::{create_invalidator, CacheInvalidator, JobQueue};
use crate::rag::QueryEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub db: MetaDb,
    pub queue: Arc<JobQueue>,
    pub engine: Arc<QueryEngine>,
    /// Whether clients may submit `file://` material URLs
    pub allow_file_urls: bool,
}

impl Services {
    /// Connect to the initialized database and build every service
    pub async fn build(config: &Config) -> Result<Self> {
        if !config.is_initialized() {
            return Err(Error::NotInitialized);
        }

        let db = MetaDb::connect(config).await?;
        let provider = create_provider(config)?;
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
        let invalidator = create_invalidator(&config.cache)?;

        Ok(Self::from_parts(
            db,
            fetcher,
            Arc::new(DocumentExtractor::new()),
            provider,
            invalidator,
            config,
        ))
    }

    pub fn from_parts(
        db: MetaDb,
        fetcher: Arc<dyn BlobFetcher>,
        extractor: Arc<dyn TextExtractor>,
        provider: Arc<dyn ModelProvider>,
        invalidator: Arc<dyn CacheInvalidator>,
        config: &Config,
    ) -> Self {
        let pipeline =
            IngestionPipeline::new(db.clone(), fetcher, extractor, provider.clone(), config);
        let queue = Arc::new(JobQueue::new(
            db.clone(),
            pipeline,
            invalidator,
            &config.queue,
        ));
        let engine = Arc::new(QueryEngine::new(db.clone(), provider, &config.query));

        Self {
            db,
            queue,
            engine,
            allow_file_urls: config.fetch.allow_file_urls,
        }
    }
}
