//! Text chunking for extracted pages
//!
//! This module splits page text into chunks while:
//! - Keeping every chunk within `max_chars` characters
//! - Preferring paragraph, then sentence, then word breaks near the limit
//! - Overlapping consecutive chunks so content spanning a cut is not lost
//! - Producing the same chunks for the same input and configuration

mod boundaries;

pub use boundaries::*;

use crate::config::ChunkConfig;
use crate::parse::{normalize_whitespace, PageText};
use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// A text chunk with its position in the source document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// The chunk text
    pub content: String,

    /// Document-wide chunk index (0-based, contiguous)
    pub chunk_index: usize,

    /// 1-based page the chunk came from
    pub page_number: u32,

    /// Character start in the normalized page text
    pub char_start: usize,

    /// Character end (exclusive) in the normalized page text
    pub char_end: usize,

    /// Blake3 hash of the content
    pub content_hash: String,
}

impl TextChunk {
    /// Metadata stored alongside the persisted chunk
    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "char_start": self.char_start,
            "char_end": self.char_end,
            "content_hash": self.content_hash,
        })
    }
}

/// Chunk a sequence of pages. Chunks never span pages.
pub fn chunk_pages(pages: &[PageText], config: &ChunkConfig) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    for page in pages {
        let normalized = normalize_whitespace(&page.text);
        for (char_start, char_end, content) in split_text(&normalized, config) {
            chunks.push(TextChunk {
                content_hash: compute_text_hash(&content),
                content,
                chunk_index: chunks.len(),
                page_number: page.page_number,
                char_start,
                char_end,
            });
        }
    }
    chunks
}

/// Split normalized text into `(char_start, char_end, content)` spans
pub fn split_text(text: &str, config: &ChunkConfig) -> Vec<(usize, usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let max = config.max_chars.max(1);

    if len == 0 || len < config.min_chars {
        return Vec::new();
    }

    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        let end = if len - start <= max {
            len
        } else {
            let limit = start + max;
            let window_start = limit.saturating_sub(config.boundary_window).max(start + 1);
            find_best_break(&chars, window_start, limit)
                .map(|b| b.position)
                .unwrap_or(limit)
        };

        if let Some(span) = trimmed_span(&chars, start, end) {
            spans.push(span);
        }

        if end >= len {
            break;
        }

        // Overlap, realigned to a word start, always past the previous start
        let overlap_start = end.saturating_sub(config.overlap_chars).max(start + 1);
        start = next_word_start(&chars, overlap_start, end).unwrap_or(overlap_start);
    }

    spans
}

fn trimmed_span(chars: &[char], start: usize, end: usize) -> Option<(usize, usize, String)> {
    let mut s = start;
    let mut e = end;
    while s < e && chars[s].is_whitespace() {
        s += 1;
    }
    while e > s && chars[e - 1].is_whitespace() {
        e -= 1;
    }
    if s == e {
        return None;
    }
    Some((s, e, chars[s..e].iter().collect()))
}

/// Compute a stable hash for document content
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}

/// Compute a stable hash for a string
pub fn compute_text_hash(text: &str) -> String {
    compute_content_hash(text.as_bytes())
}
