//! Exact-distance vector index over chunk embeddings.
//!
//! Each vector is stored together with the chunk it was embedded from, so the
//! vector at position `i` and the metadata at position `i` can never drift
//! apart. On disk the pair is split into a binary index file and a JSON
//! metadata list that are always written together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Buf, BufMut};
use parking_lot::RwLock;

use crate::error::IndexError;
use crate::llm::{EmbedTask, Embedder};
use crate::models::{Chunk, ScopeFilter};

const INDEX_MAGIC: &[u8; 4] = b"PBVI";
const INDEX_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// One position of the index: a vector and the chunk it was embedded from.
#[derive(Debug, Clone)]
struct IndexRecord {
    vector: Vec<f32>,
    chunk: Chunk,
}

/// Locations of the two persisted stores.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
}

impl IndexPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            index: dir.join("vectors.index"),
            metadata: dir.join("metadata.json"),
        }
    }
}

/// A raw nearest-neighbour result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    /// Squared Euclidean distance; lower is more similar.
    pub distance: f32,
}

/// A nearest-neighbour result resolved to its chunk.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub position: usize,
    pub chunk: Chunk,
    pub distance: f32,
    /// `1 / (1 + distance)`, in (0, 1], higher is better.
    pub score: f32,
}

/// Result of [`VectorIndex::search_with_pool`].
#[derive(Debug)]
pub struct SearchSnapshot {
    pub hits: Result<Vec<VectorHit>, IndexError>,
    /// Chunks admitted by the filter, in index order.
    pub pool: Vec<Chunk>,
}

/// Brute-force similarity index with parallel chunk metadata.
pub struct VectorIndex {
    dim: usize,
    records: RwLock<Vec<IndexRecord>>,
    paths: Option<IndexPaths>,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndex {
    /// Load both stores from disk, or start empty if either file is missing.
    pub fn open(paths: IndexPaths, dim: usize, embedder: Arc<dyn Embedder>) -> Result<Self, IndexError> {
        let records = if paths.index.exists() && paths.metadata.exists() {
            let raw = std::fs::read(&paths.index)?;
            let vectors = decode_vectors(&raw, dim)?;
            let meta = std::fs::read_to_string(&paths.metadata)?;
            let chunks: Vec<Chunk> = serde_json::from_str(&meta)
                .map_err(|e| IndexError::CorruptIndex(format!("metadata: {e}")))?;
            if vectors.len() != chunks.len() {
                return Err(IndexError::CorruptIndex(format!(
                    "{} vectors but {} metadata entries",
                    vectors.len(),
                    chunks.len()
                )));
            }
            vectors
                .into_iter()
                .zip(chunks)
                .map(|(vector, chunk)| IndexRecord { vector, chunk })
                .collect()
        } else {
            Vec::new()
        };

        tracing::info!(
            "Vector index opened with {} entries (dim {dim}) at {}",
            records.len(),
            paths.index.display()
        );

        Ok(Self {
            dim,
            records: RwLock::new(records),
            paths: Some(paths),
            embedder,
        })
    }

    /// An index that never touches disk.
    pub fn in_memory(dim: usize, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            dim,
            records: RwLock::new(Vec::new()),
            paths: None,
            embedder,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Embed and append a batch, then persist both stores.
    ///
    /// The batch is all-or-nothing: if embedding fails or returns a bad shape,
    /// nothing is appended. If persisting fails the in-memory append is rolled
    /// back. A crash after the append but before the files are renamed loses
    /// the batch; there is no write-ahead log.
    pub async fn add(&self, chunks: Vec<Chunk>) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let vectors = self.embed_batch(&chunks).await?;
        self.append(vectors, chunks, false)
    }

    /// Like [`add`](Self::add), but rejects the batch with
    /// [`IndexError::DuplicateDocument`] if any of its document names is
    /// already indexed. The check runs under the same write lock as the append,
    /// so two concurrent uploads of one name cannot both land.
    pub async fn add_new_documents(&self, chunks: Vec<Chunk>) -> Result<usize, IndexError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        if let Some(name) = chunks.iter().find(|c| self.contains_document(&c.doc_name)) {
            return Err(IndexError::DuplicateDocument(name.doc_name.clone()));
        }
        let vectors = self.embed_batch(&chunks).await?;
        self.append(vectors, chunks, true)
    }

    /// Whether any indexed chunk belongs to `doc_name`.
    pub fn contains_document(&self, doc_name: &str) -> bool {
        self.records.read().iter().any(|r| r.chunk.doc_name == doc_name)
    }

    async fn embed_batch(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, IndexError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts, EmbedTask::SearchDocument).await?;

        if vectors.len() != chunks.len() {
            return Err(IndexError::EmbeddingCount {
                expected: chunks.len(),
                got: vectors.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: bad.len(),
            });
        }
        Ok(vectors)
    }

    fn append(&self, vectors: Vec<Vec<f32>>, chunks: Vec<Chunk>, unique: bool) -> Result<usize, IndexError> {
        let added = chunks.len();
        let mut records = self.records.write();
        if unique {
            if let Some(dup) = chunks
                .iter()
                .find(|c| records.iter().any(|r| r.chunk.doc_name == c.doc_name))
            {
                return Err(IndexError::DuplicateDocument(dup.doc_name.clone()));
            }
        }

        let previous_len = records.len();
        records.extend(
            vectors
                .into_iter()
                .zip(chunks)
                .map(|(vector, chunk)| IndexRecord { vector, chunk }),
        );

        if let Err(e) = self.write_files(&records) {
            records.truncate(previous_len);
            tracing::error!("Failed to persist vector index, batch rolled back: {e}");
            return Err(e);
        }

        tracing::debug!("Appended {added} vectors (total {})", records.len());
        Ok(added)
    }

    /// The `k` nearest positions to `query` among chunks admitted by `filter`,
    /// closest first.
    pub fn nearest(&self, query: &[f32], k: usize, filter: ScopeFilter) -> Vec<Neighbor> {
        let records = self.records.read();
        nearest_in(&records, query, k, filter)
    }

    /// Embed `query` and return its `k` nearest chunks admitted by `filter`.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: ScopeFilter,
    ) -> Result<Vec<VectorHit>, IndexError> {
        let query_vector = self.embed_query(query).await?;
        // Resolve positions under the same read guard so a concurrent append
        // cannot shift what a position refers to.
        let records = self.records.read();
        Ok(hits_in(&records, &query_vector, k, filter))
    }

    /// Vector hits and the filtered chunk pool taken from one read guard, so
    /// both describe the same index state.
    ///
    /// The query is embedded before the lock is taken. If embedding fails the
    /// error is returned alongside a pool that is still usable for keyword
    /// matching.
    pub async fn search_with_pool(&self, query: &str, k: usize, filter: ScopeFilter) -> SearchSnapshot {
        let query_vector = self.embed_query(query).await;

        let records = self.records.read();
        let hits = query_vector.map(|v| hits_in(&records, &v, k, filter));
        let pool = records
            .iter()
            .filter(|r| filter.admits(&r.chunk))
            .map(|r| r.chunk.clone())
            .collect();
        SearchSnapshot { hits, pool }
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, IndexError> {
        let mut vectors = self
            .embedder
            .embed(&[query.to_string()], EmbedTask::SearchQuery)
            .await?;
        if vectors.len() != 1 {
            return Err(IndexError::EmbeddingCount {
                expected: 1,
                got: vectors.len(),
            });
        }
        let query_vector = vectors.remove(0);
        if query_vector.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: query_vector.len(),
            });
        }
        Ok(query_vector)
    }

    /// Metadata view: chunks admitted by `filter`, in index order.
    pub fn chunks(&self, filter: ScopeFilter) -> Vec<Chunk> {
        self.records
            .read()
            .iter()
            .filter(|r| filter.admits(&r.chunk))
            .map(|r| r.chunk.clone())
            .collect()
    }

    pub fn chunk_at(&self, position: usize) -> Option<Chunk> {
        self.records.read().get(position).map(|r| r.chunk.clone())
    }

    /// Vector view.
    pub fn vector_at(&self, position: usize) -> Option<Vec<f32>> {
        self.records.read().get(position).map(|r| r.vector.clone())
    }

    /// Write both stores to disk. A no-op for in-memory indexes.
    pub fn persist(&self) -> Result<(), IndexError> {
        let records = self.records.write();
        self.write_files(&records)
    }

    /// Flush and release the index.
    pub fn close(self) -> Result<(), IndexError> {
        self.persist()?;
        tracing::info!("Vector index closed");
        Ok(())
    }

    fn write_files(&self, records: &[IndexRecord]) -> Result<(), IndexError> {
        let Some(paths) = &self.paths else {
            return Ok(());
        };

        if let Some(parent) = paths.index.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = paths.metadata.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let encoded = encode_vectors(records.iter().map(|r| r.vector.as_slice()), self.dim, records.len());
        let chunks: Vec<&Chunk> = records.iter().map(|r| &r.chunk).collect();
        let meta = serde_json::to_vec(&chunks)
            .map_err(|e| IndexError::CorruptIndex(format!("metadata encode: {e}")))?;

        // Stage both files before replacing either.
        let index_tmp = paths.index.with_extension("index.tmp");
        let meta_tmp = paths.metadata.with_extension("json.tmp");
        std::fs::write(&index_tmp, encoded)?;
        std::fs::write(&meta_tmp, meta)?;
        std::fs::rename(&index_tmp, &paths.index)?;
        std::fs::rename(&meta_tmp, &paths.metadata)?;
        Ok(())
    }
}

fn nearest_in(records: &[IndexRecord], query: &[f32], k: usize, filter: ScopeFilter) -> Vec<Neighbor> {
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<Neighbor> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| filter.admits(&r.chunk))
        .map(|(position, r)| Neighbor {
            position,
            distance: squared_l2(query, &r.vector),
        })
        .collect();

    // Ascending by distance, earlier positions first on ties.
    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.position.cmp(&b.position))
    });
    scored.truncate(k);
    scored
}

fn hits_in(records: &[IndexRecord], query: &[f32], k: usize, filter: ScopeFilter) -> Vec<VectorHit> {
    nearest_in(records, query, k, filter)
        .into_iter()
        .map(|n| VectorHit {
            position: n.position,
            chunk: records[n.position].chunk.clone(),
            distance: n.distance,
            score: distance_to_score(n.distance),
        })
        .collect()
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Map a lower-is-better distance onto a higher-is-better score in (0, 1].
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

fn encode_vectors<'a>(vectors: impl Iterator<Item = &'a [f32]>, dim: usize, count: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + count * dim * 4);
    buf.put_slice(INDEX_MAGIC);
    buf.put_u32_le(INDEX_VERSION);
    buf.put_u32_le(dim as u32);
    buf.put_u64_le(count as u64);
    for v in vectors {
        for x in v {
            buf.put_f32_le(*x);
        }
    }
    buf
}

fn decode_vectors(raw: &[u8], dim: usize) -> Result<Vec<Vec<f32>>, IndexError> {
    if raw.len() < HEADER_LEN || &raw[..4] != INDEX_MAGIC {
        return Err(IndexError::CorruptIndex("bad index header".to_string()));
    }
    let mut buf = &raw[4..];
    let version = buf.get_u32_le();
    if version != INDEX_VERSION {
        return Err(IndexError::CorruptIndex(format!(
            "unsupported index version {version}"
        )));
    }
    let stored_dim = buf.get_u32_le() as usize;
    if stored_dim != dim {
        return Err(IndexError::DimensionMismatch {
            expected: dim,
            got: stored_dim,
        });
    }
    let count = usize::try_from(buf.get_u64_le())
        .map_err(|_| IndexError::CorruptIndex("vector count out of range".to_string()))?;
    let expected = count
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| IndexError::CorruptIndex(format!("vector count {count} out of range")))?;
    if buf.remaining() != expected {
        return Err(IndexError::CorruptIndex(format!(
            "expected {count} vectors of dim {dim}, found {} bytes",
            buf.remaining()
        )));
    }

    let mut vectors = Vec::with_capacity(count);
    for _ in 0..count {
        let mut v = Vec::with_capacity(dim);
        for _ in 0..dim {
            v.push(buf.get_f32_le());
        }
        vectors.push(v);
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use async_trait::async_trait;

    /// Embeds "x,y" texts as the literal vector [x, y].
    struct Literal;

    #[async_trait]
    impl Embedder for Literal {
        async fn embed(&self, texts: &[String], _task: EmbedTask) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts
                .iter()
                .map(|t| t.split(',').map(|p| p.trim().parse().unwrap_or(0.0)).collect())
                .collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl Embedder for Failing {
        async fn embed(&self, _texts: &[String], _task: EmbedTask) -> Result<Vec<Vec<f32>>, LlmError> {
            Err(LlmError::Upstream("boom".into()))
        }
    }

    fn chunk(id: u32, text: &str, scope_id: Option<i64>) -> Chunk {
        Chunk {
            doc_name: "doc.pdf".into(),
            page_num: 1,
            chunk_id: id,
            text: text.into(),
            scope_id,
        }
    }

    #[tokio::test]
    async fn test_nearest_orders_by_distance() {
        let index = VectorIndex::in_memory(2, Arc::new(Literal));
        index
            .add(vec![chunk(0, "0,0", None), chunk(1, "3,4", None), chunk(2, "1,0", None)])
            .await
            .unwrap();

        let hits = index.nearest(&[0.0, 0.0], 10, ScopeFilter::All);
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 2, 1]);
        assert_eq!(hits[1].distance, 1.0);
        assert_eq!(hits[2].distance, 25.0);
    }

    #[tokio::test]
    async fn test_search_maps_positions_to_chunks() {
        let index = VectorIndex::in_memory(2, Arc::new(Literal));
        index
            .add(vec![chunk(0, "5,5", None), chunk(1, "1,1", None)])
            .await
            .unwrap();

        let hits = index.search("1,1", 1, ScopeFilter::All).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.chunk_id, 1);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_scope_filter_applies_to_vector_search() {
        let index = VectorIndex::in_memory(2, Arc::new(Literal));
        index
            .add(vec![
                chunk(0, "0,0", Some(1)),
                chunk(1, "0,0", Some(2)),
                chunk(2, "0,0", None),
            ])
            .await
            .unwrap();

        let hits = index.search("0,0", 10, ScopeFilter::Only(2)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.scope_id, Some(2));
        assert_eq!(index.search("0,0", 10, ScopeFilter::All).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_embedding_appends_nothing() {
        let index = VectorIndex::in_memory(2, Arc::new(Failing));
        let err = index.add(vec![chunk(0, "1,1", None)]).await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let index = VectorIndex::in_memory(3, Arc::new(Literal));
        let err = index.add(vec![chunk(0, "1,1", None)]).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, got: 2 }));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_views_stay_aligned() {
        let index = VectorIndex::in_memory(2, Arc::new(Literal));
        index.add(vec![chunk(0, "1,2", None)]).await.unwrap();
        index.add(vec![chunk(1, "3,4", None), chunk(2, "5,6", None)]).await.unwrap();

        for position in 0..index.len() {
            let chunk = index.chunk_at(position).unwrap();
            let vector = index.vector_at(position).unwrap();
            let expected: Vec<f32> = chunk.text.split(',').map(|p| p.parse().unwrap()).collect();
            assert_eq!(vector, expected);
        }
    }

    #[tokio::test]
    async fn test_persist_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());

        let index = VectorIndex::open(paths.clone(), 2, Arc::new(Literal)).unwrap();
        index
            .add(vec![chunk(0, "1,2", Some(7)), chunk(1, "3,4", None)])
            .await
            .unwrap();
        index.close().unwrap();

        let reopened = VectorIndex::open(paths, 2, Arc::new(Literal)).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.vector_at(1).unwrap(), vec![3.0, 4.0]);
        assert_eq!(reopened.chunk_at(0).unwrap().scope_id, Some(7));
    }

    #[test]
    fn test_missing_metadata_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        std::fs::write(&paths.index, encode_vectors(std::iter::empty(), 2, 0)).unwrap();

        let index = VectorIndex::open(paths, 2, Arc::new(Literal)).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_dimension_change_rejected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        std::fs::write(&paths.index, encode_vectors(std::iter::empty(), 2, 0)).unwrap();
        std::fs::write(&paths.metadata, "[]").unwrap();

        let result = VectorIndex::open(paths, 768, Arc::new(Literal));
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_count_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let v = [1.0f32, 2.0];
        std::fs::write(&paths.index, encode_vectors(std::iter::once(&v[..]), 2, 1)).unwrap();
        std::fs::write(&paths.metadata, "[]").unwrap();

        let result = VectorIndex::open(paths, 2, Arc::new(Literal));
        assert!(matches!(result, Err(IndexError::CorruptIndex(_))));
    }

    #[test]
    fn test_oversized_count_is_corrupt() {
        let mut raw = Vec::new();
        raw.put_slice(INDEX_MAGIC);
        raw.put_u32_le(INDEX_VERSION);
        raw.put_u32_le(2);
        raw.put_u64_le(u64::MAX);
        raw.put_f32_le(1.0);

        let result = decode_vectors(&raw, 2);
        assert!(matches!(result, Err(IndexError::CorruptIndex(_))));
    }

    // ─── Snapshot search ───

    #[tokio::test]
    async fn test_hits_are_drawn_from_pool() {
        let index = VectorIndex::in_memory(2, Arc::new(Literal));
        index
            .add(vec![
                chunk(0, "0,0", Some(1)),
                chunk(1, "1,1", Some(2)),
                chunk(2, "2,2", Some(1)),
            ])
            .await
            .unwrap();

        let snapshot = index.search_with_pool("0,0", 10, ScopeFilter::Only(1)).await;
        let hits = snapshot.hits.unwrap();
        let pool_ids: Vec<u32> = snapshot.pool.iter().map(|c| c.chunk_id).collect();
        assert_eq!(pool_ids, vec![0, 2]);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| pool_ids.contains(&h.chunk.chunk_id)));
    }

    #[tokio::test]
    async fn test_failed_query_embedding_still_returns_pool() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::in_dir(dir.path());
        let seeded = VectorIndex::open(paths.clone(), 2, Arc::new(Literal)).unwrap();
        seeded.add(vec![chunk(0, "1,1", None)]).await.unwrap();
        seeded.close().unwrap();

        let index = VectorIndex::open(paths, 2, Arc::new(Failing)).unwrap();
        let snapshot = index.search_with_pool("1,1", 5, ScopeFilter::All).await;
        assert!(matches!(snapshot.hits, Err(IndexError::Embedding(_))));
        assert_eq!(snapshot.pool.len(), 1);
    }

    // ─── Document uniqueness ───

    #[tokio::test]
    async fn test_new_documents_reject_indexed_name() {
        let index = VectorIndex::in_memory(2, Arc::new(Literal));
        index.add_new_documents(vec![chunk(0, "1,1", None)]).await.unwrap();
        assert!(index.contains_document("doc.pdf"));

        let err = index
            .add_new_documents(vec![chunk(0, "2,2", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateDocument(ref name) if name == "doc.pdf"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.vector_at(0).unwrap(), vec![1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_concurrent_uploads_of_one_name_admit_one() {
        let index = Arc::new(VectorIndex::in_memory(2, Arc::new(Literal)));
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let index = index.clone();
                tokio::spawn(async move {
                    index
                        .add_new_documents(vec![chunk(0, &format!("{i},{i}"), None)])
                        .await
                })
            })
            .collect();

        let mut admitted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(e) => assert!(matches!(e, IndexError::DuplicateDocument(_))),
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_distance_to_score() {
        assert_eq!(distance_to_score(0.0), 1.0);
        assert_eq!(distance_to_score(1.0), 0.5);
        assert!(distance_to_score(10.0) < distance_to_score(1.0));
    }
}
