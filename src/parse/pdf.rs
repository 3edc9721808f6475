//! PDF text extraction

use super::{ensure_has_text, PageText, TextExtractor};
use crate::error::IngestError;
use async_trait::async_trait;
use tracing::debug;

/// Extracts text page by page with `pdf-extract`
#[derive(Debug, Clone, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    fn extract_blocking(data: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let pages = pdf_extract::extract_text_from_mem_by_pages(data)
            .map_err(|e| IngestError::Parse(format!("PDF extraction error: {e}")))?;

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| PageText {
                page_number: i as u32 + 1,
                text,
            })
            .collect())
    }
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract_pages(&self, data: Vec<u8>) -> Result<Vec<PageText>, IngestError> {
        // pdf-extract is CPU-bound and may panic on malformed input
        let pages = tokio::task::spawn_blocking(move || Self::extract_blocking(&data))
            .await
            .map_err(|e| IngestError::Parse(format!("PDF extraction aborted: {e}")))??;

        debug!(pages = pages.len(), "Extracted PDF pages");
        ensure_has_text(pages)
    }
}
