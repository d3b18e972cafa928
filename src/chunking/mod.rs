//! Page chunking: overlapping fixed-size character windows with positional metadata.

pub mod window;

use crate::config::ChunkingConfig;
use crate::error::ChunkingError;
use crate::models::Chunk;

/// Splits extracted page text into overlapping chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::ZeroChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkingError> {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk every page of a document. `pages[0]` is page 1.
    ///
    /// `chunk_id` counts up from 0 across the whole document, in page order
    /// and then offset order.
    pub fn chunk_document(
        &self,
        doc_name: &str,
        pages: &[String],
        scope_id: Option<i64>,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut next_id = 0u32;

        for (i, page_text) in pages.iter().enumerate() {
            for w in window::sliding_window(page_text, self.chunk_size, self.overlap) {
                chunks.push(Chunk {
                    doc_name: doc_name.to_string(),
                    page_num: i as u32 + 1,
                    chunk_id: next_id,
                    text: w.content,
                    scope_id,
                });
                next_id += 1;
            }
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert_eq!(
            Chunker::new(10, 10).unwrap_err(),
            ChunkingError::InvalidOverlap {
                chunk_size: 10,
                overlap: 10
            }
        );
        assert!(Chunker::new(10, 11).is_err());
        assert_eq!(Chunker::new(0, 0).unwrap_err(), ChunkingError::ZeroChunkSize);
    }

    #[test]
    fn test_default_config_is_valid() {
        let chunker = Chunker::from_config(&ChunkingConfig::default()).unwrap();
        assert_eq!(chunker.chunk_size(), 3200);
        assert_eq!(chunker.overlap(), 400);
    }

    #[test]
    fn test_chunk_ids_are_sequential_across_pages() {
        let chunker = Chunker::new(4, 1).unwrap();
        let pages = vec!["abcdefghij".to_string(), "".to_string(), "xyz".to_string()];
        let chunks = chunker.chunk_document("plans.pdf", &pages, None);

        let ids: Vec<u32> = chunks.iter().map(|c| c.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        let pages_seen: Vec<u32> = chunks.iter().map(|c| c.page_num).collect();
        assert_eq!(pages_seen, vec![1, 1, 1, 3]);
        assert_eq!(chunks[3].text, "xyz");
    }

    #[test]
    fn test_empty_page_produces_no_chunks() {
        let chunker = Chunker::new(100, 10).unwrap();
        assert!(chunker.chunk_document("a.pdf", &[String::new()], None).is_empty());
        assert!(chunker.chunk_document("a.pdf", &[], None).is_empty());
    }

    #[test]
    fn test_scope_and_doc_name_propagate() {
        let chunker = Chunker::new(100, 10).unwrap();
        let chunks = chunker.chunk_document("specs.pdf", &["Door D-101".to_string()], Some(42));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].doc_name, "specs.pdf");
        assert_eq!(chunks[0].scope_id, Some(42));
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
    }
}
