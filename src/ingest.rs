use std::collections::HashSet;

use crate::chunking::Chunker;
use crate::error::IndexError;
use crate::models::DocumentPages;
use crate::search::vector::VectorIndex;

/// Outcome of an ingestion request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub chunks_added: usize,
    pub documents: Vec<String>,
}

/// Chunk and index each document as its own batch.
///
/// Document names key the fused search results, so a name that is already
/// indexed, or repeated within `documents`, rejects the whole request with
/// [`IndexError::DuplicateDocument`] before anything is indexed.
///
/// Batches are committed one document at a time: if a later document fails,
/// earlier documents stay indexed and the error is returned.
pub async fn ingest_documents(
    index: &VectorIndex,
    chunker: &Chunker,
    documents: &[DocumentPages],
    scope_id: Option<i64>,
) -> Result<IngestReport, IndexError> {
    let mut seen = HashSet::new();
    for doc in documents {
        if !seen.insert(doc.filename.as_str()) || index.contains_document(&doc.filename) {
            tracing::warn!("Rejecting upload: {} is already indexed", doc.filename);
            return Err(IndexError::DuplicateDocument(doc.filename.clone()));
        }
    }

    let mut report = IngestReport::default();

    for doc in documents {
        let chunks = chunker.chunk_document(&doc.filename, &doc.pages, scope_id);
        if chunks.is_empty() {
            tracing::warn!("No text found in {}, skipping", doc.filename);
            continue;
        }

        let added = index.add_new_documents(chunks).await?;
        tracing::info!(
            "Indexed {added} chunks from {} ({} pages, scope {scope_id:?})",
            doc.filename,
            doc.pages.len()
        );

        report.chunks_added += added;
        report.documents.push(doc.filename.clone());
    }

    Ok(report)
}
