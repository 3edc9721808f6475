//! Document parsing and text extraction
//!
//! This module handles:
//! - Per-page text extraction from PDFs
//! - Plain text documents (pages separated by form feeds)
//! - Content type detection
//! - Whitespace normalization before chunking

mod pdf;
mod text;

pub use pdf::*;
pub use text::*;

use crate::error::IngestError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Text of a single page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number
    pub page_number: u32,
    pub text: String,
}

/// Content types we can extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Pdf,
    PlainText,
    Unknown,
}

impl ContentType {
    /// Detect content type from the leading bytes
    pub fn sniff(data: &[u8]) -> Self {
        let head = &data[..data.len().min(1024)];
        if head.windows(5).any(|w| w == b"%PDF-") {
            ContentType::Pdf
        } else if !is_binary_content(data) && std::str::from_utf8(data).is_ok() {
            ContentType::PlainText
        } else {
            ContentType::Unknown
        }
    }
}

/// Turns document bytes into per-page text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract page texts. Fails with `IngestError::Parse` for unreadable input.
    async fn extract_pages(&self, data: Vec<u8>) -> Result<Vec<PageText>, IngestError>;
}

/// Dispatches on the sniffed content type
#[derive(Debug, Clone, Default)]
pub struct DocumentExtractor {
    pdf: PdfExtractor,
    text: PlainTextExtractor,
}

impl DocumentExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract_pages(&self, data: Vec<u8>) -> Result<Vec<PageText>, IngestError> {
        match ContentType::sniff(&data) {
            ContentType::Pdf => self.pdf.extract_pages(data).await,
            ContentType::PlainText => self.text.extract_pages(data).await,
            ContentType::Unknown => Err(IngestError::Parse(
                "unsupported document format".to_string(),
            )),
        }
    }
}

/// Fail when no page carries any non-whitespace text
pub fn ensure_has_text(pages: Vec<PageText>) -> Result<Vec<PageText>, IngestError> {
    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(IngestError::Parse(
            "document contains no extractable text".to_string(),
        ));
    }
    Ok(pages)
}

/// Check if content appears to be binary
pub fn is_binary_content(data: &[u8]) -> bool {
    // Check for null bytes in the first 8KB
    let check_len = std::cmp::min(data.len(), 8192);
    data[..check_len].iter().any(|&b| b == 0)
}

/// Normalize whitespace in text.
///
/// Runs of whitespace inside a paragraph collapse to one space; paragraphs
/// (separated by blank lines) are joined by `\n\n`.
pub fn normalize_whitespace(text: &str) -> String {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&words.join(" "));
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs.join("\n\n")
}
