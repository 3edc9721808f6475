//! Ingestion pipeline
//!
//! Turns one material into persisted, embedded chunks:
//! fetch → extract pages → chunk → embed in batches → atomic write.
//!
//! The pipeline never panics or escapes with a crate-level error; every
//! failure is an `IngestError` the queue can classify for backoff.

use crate::chunk::chunk_pages;
use crate::config::{ChunkConfig, Config};
use crate::error::IngestError;
use crate::fetch::BlobFetcher;
use crate::meta::{ClaimedJob, Material, MetaDb, NewChunk};
use crate::parse::TextExtractor;
use crate::provider::{embed_in_batches, ModelProvider};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Successful ingestion summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestSuccess {
    pub chunks_created: usize,
    pub pages: usize,
}

pub struct IngestionPipeline {
    db: MetaDb,
    fetcher: Arc<dyn BlobFetcher>,
    extractor: Arc<dyn TextExtractor>,
    provider: Arc<dyn ModelProvider>,
    chunk_config: ChunkConfig,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        db: MetaDb,
        fetcher: Arc<dyn BlobFetcher>,
        extractor: Arc<dyn TextExtractor>,
        provider: Arc<dyn ModelProvider>,
        config: &Config,
    ) -> Self {
        Self {
            db,
            fetcher,
            extractor,
            provider,
            chunk_config: config.chunk.clone(),
            batch_size: config.provider.batch_size,
        }
    }

    /// Run the whole pipeline for one material
    pub async fn ingest(&self, material: &Material) -> Result<IngestSuccess, IngestError> {
        self.run(material, None).await
    }

    /// Run the pipeline for a queue claim. The chunk write is refused once
    /// the claim has been reclaimed by someone else.
    pub async fn ingest_claimed(&self, claimed: &ClaimedJob) -> Result<IngestSuccess, IngestError> {
        self.run(&claimed.material, Some(claimed)).await
    }

    async fn run(
        &self,
        material: &Material,
        claim: Option<&ClaimedJob>,
    ) -> Result<IngestSuccess, IngestError> {
        let start = Instant::now();
        info!(material_id = %material.id, url = %material.file_url, "Ingesting material");

        let data = self.fetcher.fetch(&material.file_url).await?;
        debug!(material_id = %material.id, bytes = data.len(), "Fetched document");

        let pages = self.extractor.extract_pages(data).await?;
        let page_count = pages.len();

        let chunks = chunk_pages(&pages, &self.chunk_config);
        if chunks.is_empty() {
            return Err(IngestError::Parse("no extractable text".to_string()));
        }
        debug!(
            material_id = %material.id,
            pages = page_count,
            chunks = chunks.len(),
            "Chunked document"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = embed_in_batches(self.provider.as_ref(), texts, self.batch_size).await?;

        let records: Vec<NewChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| NewChunk {
                metadata: chunk.metadata(),
                content: chunk.content,
                embedding,
                chunk_index: chunk.chunk_index as i64,
                page_number: Some(chunk.page_number as i64),
            })
            .collect();

        let chunks_created = match claim {
            Some(claimed) => {
                self.db
                    .replace_claimed_chunks(&claimed.job.id, &claimed.token, &material.id, &records)
                    .await?
            }
            None => {
                self.db
                    .replace_material_chunks(&material.id, &records)
                    .await?
            }
        };

        info!(
            material_id = %material.id,
            chunks = chunks_created,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Material ingested"
        );

        Ok(IngestSuccess {
            chunks_created,
            pages: page_count,
        })
    }
}
