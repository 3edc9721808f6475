//! Plain text extraction

use super::{ensure_has_text, PageText, TextExtractor};
use crate::error::IngestError;
use async_trait::async_trait;

/// Treats UTF-8 text as a document; form feeds separate pages
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn split_pages(text: &str) -> Vec<PageText> {
        text.split('\x0c')
            .enumerate()
            .map(|(i, page)| PageText {
                page_number: i as u32 + 1,
                text: page.to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract_pages(&self, data: Vec<u8>) -> Result<Vec<PageText>, IngestError> {
        let text = String::from_utf8(data)
            .map_err(|e| IngestError::Parse(format!("document is not valid UTF-8: {e}")))?;
        ensure_has_text(Self::split_pages(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pages_keeps_numbering() {
        let pages = PlainTextExtractor::split_pages("one\x0c\x0cthree");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1].text, "");
        assert_eq!(pages[2].page_number, 3);
        assert_eq!(pages[2].text, "three");
    }

    #[tokio::test]
    async fn test_rejects_empty_and_invalid() {
        let extractor = PlainTextExtractor;
        assert!(matches!(
            extractor.extract_pages(b"  \x0c ".to_vec()).await,
            Err(IngestError::Parse(_))
        ));
        assert!(matches!(
            extractor.extract_pages(vec![0xff, 0xfe]).await,
            Err(IngestError::Parse(_))
        ));
    }
}
