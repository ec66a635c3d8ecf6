//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and small-scale use cases.
//!
//! A store opened with [`InMemoryVectorStore::load_snapshot`] is also a
//! simple on-disk backend. Each change is applied to a copy of the state,
//! the copy is written to the snapshot file, and only then does it replace
//! the live state. A change whose snapshot write fails is not visible to
//! readers. Snapshot-backed changes are serialized by a writer mutex that is
//! held across the file write; searches and counts never take it and never
//! wait on disk I/O.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::document::{DocumentChunk, ScoredChunk};
use crate::error::{Result, RetrievalError};
use crate::filter::CompiledFilter;
use crate::vectorstore::VectorStore;

const BACKEND: &str = "InMemory";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    seq: u64,
    chunk: DocumentChunk,
}

#[derive(Debug, Clone, Default)]
struct StoreState {
    chunks: HashMap<String, StoredChunk>,
    next_seq: u64,
    /// Fixed by the first write; cleared whenever the store becomes empty.
    dimensions: Option<usize>,
}

impl StoreState {
    fn check_chunks(&self, chunks: &[DocumentChunk]) -> Result<Option<usize>> {
        let mut dimensions = self.dimensions;
        for chunk in chunks {
            if chunk.embedding.is_empty() {
                return Err(RetrievalError::index(
                    BACKEND,
                    format!("chunk '{}' has no embedding", chunk.id),
                ));
            }
            match dimensions {
                Some(d) if d != chunk.embedding.len() => {
                    return Err(RetrievalError::index(
                        BACKEND,
                        format!(
                            "chunk '{}' has dimension {}, index has {d}",
                            chunk.id,
                            chunk.embedding.len()
                        ),
                    ));
                }
                Some(_) => {}
                None => dimensions = Some(chunk.embedding.len()),
            }
        }
        Ok(dimensions)
    }

    fn insert(&mut self, chunks: &[DocumentChunk]) {
        for chunk in chunks {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.chunks.insert(chunk.id.clone(), StoredChunk { seq, chunk: chunk.clone() });
        }
    }

    fn upsert(&mut self, chunks: &[DocumentChunk]) -> Result<()> {
        self.dimensions = self.check_chunks(chunks)?;
        self.insert(chunks);
        Ok(())
    }

    fn replace(&mut self, document_id: &str, chunks: &[DocumentChunk]) -> Result<usize> {
        let dimensions = self.check_chunks(chunks)?;
        let removed = self.remove_documents(&[document_id.to_string()]);
        if !chunks.is_empty() {
            self.dimensions = dimensions;
            self.insert(chunks);
        }
        Ok(removed)
    }

    fn remove_documents(&mut self, document_ids: &[String]) -> usize {
        self.remove_where(|chunk| document_ids.contains(&chunk.document_id))
    }

    fn remove_where(&mut self, doomed: impl Fn(&DocumentChunk) -> bool) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|_, stored| !doomed(&stored.chunk));
        if self.chunks.is_empty() {
            self.dimensions = None;
        }
        before - self.chunks.len()
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.dimensions = None;
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let mut chunks: Vec<&StoredChunk> = self.chunks.values().collect();
        chunks.sort_by_key(|stored| stored.seq);
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            next_seq: self.next_seq,
            dimensions: self.dimensions,
            chunks,
        };
        serde_json::to_vec(&snapshot)
            .map_err(|e| RetrievalError::index(BACKEND, format!("snapshot encode: {e}")))
    }
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    next_seq: u64,
    dimensions: Option<usize>,
    chunks: Vec<StoredChunk>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    next_seq: u64,
    dimensions: Option<usize>,
    chunks: Vec<&'a StoredChunk>,
}

/// Write `bytes` to a sibling temporary file and rename it over `path`, so
/// the file at `path` is always a complete snapshot.
async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(|e| {
        RetrievalError::index(BACKEND, format!("failed to write {}: {e}", tmp.display()))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        RetrievalError::index(BACKEND, format!("failed to replace {}: {e}", path.display()))
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "saved snapshot");
    Ok(())
}

/// An in-memory vector store using cosine similarity for search.
///
/// Each chunk is stamped with a monotonically increasing sequence number
/// when written, which breaks score ties in search. Every change is applied
/// whole or not at all, so
/// [`replace_document`](VectorStore::replace_document) is atomic and a
/// rejected write leaves nothing behind.
///
/// # Example
///
/// ```rust
/// use retrieval_core::{InMemoryVectorStore, VectorStore};
///
/// # async fn demo() -> retrieval_core::Result<()> {
/// let store = InMemoryVectorStore::new();
/// assert_eq!(store.count().await?, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
    /// Serializes snapshot-backed changes from copy to rename.
    writer: Mutex<()>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by the JSON snapshot at `path`.
    ///
    /// A missing file yields an empty store. Every change is written to
    /// `path` before it becomes visible, and a change that cannot be written
    /// fails without taking effect.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Index`] if the file exists but cannot be
    /// read or parsed.
    pub async fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let state = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    RetrievalError::index(BACKEND, format!("corrupt snapshot {}: {e}", path.display()))
                })?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(RetrievalError::index(
                        BACKEND,
                        format!("unsupported snapshot version {}", snapshot.version),
                    ));
                }
                let chunks = snapshot
                    .chunks
                    .into_iter()
                    .map(|stored| (stored.chunk.id.clone(), stored))
                    .collect();
                StoreState { chunks, next_seq: snapshot.next_seq, dimensions: snapshot.dimensions }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => {
                return Err(RetrievalError::index(
                    BACKEND,
                    format!("failed to read snapshot {}: {e}", path.display()),
                ));
            }
        };

        info!(path = %path.display(), chunks = state.chunks.len(), "loaded snapshot");
        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path.to_path_buf()),
            writer: Mutex::new(()),
        })
    }

    /// Write the current contents to `path` as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Index`] on serialization or I/O failure.
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let _writer = self.writer.lock().await;
        let bytes = self.state.read().await.encode()?;
        write_atomically(path.as_ref(), &bytes).await
    }

    /// Apply `change` to the state. With a snapshot, the changed copy is
    /// persisted first and swapped in only if that succeeds.
    async fn mutate<T>(&self, change: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let Some(path) = &self.snapshot_path else {
            return change(&mut *self.state.write().await);
        };

        let _writer = self.writer.lock().await;
        let mut next = self.state.read().await.clone();
        let outcome = change(&mut next)?;
        write_atomically(path, &next.encode()?).await?;
        *self.state.write().await = next;
        Ok(outcome)
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn write(&self, chunks: &[DocumentChunk]) -> Result<()> {
        self.mutate(|state| state.upsert(chunks)).await?;
        debug!(count = chunks.len(), "wrote chunks");
        Ok(())
    }

    async fn replace_document(&self, document_id: &str, chunks: &[DocumentChunk]) -> Result<()> {
        if let Some(stray) = chunks.iter().find(|c| c.document_id != document_id) {
            return Err(RetrievalError::index(
                BACKEND,
                format!("chunk '{}' does not belong to document '{document_id}'", stray.id),
            ));
        }
        let removed = self.mutate(|state| state.replace(document_id, chunks)).await?;
        debug!(document_id, removed, written = chunks.len(), "replaced document");
        Ok(())
    }

    async fn delete_by_document_ids(&self, document_ids: &[String]) -> Result<()> {
        let removed = self.mutate(|state| Ok(state.remove_documents(document_ids))).await?;
        debug!(documents = document_ids.len(), removed, "deleted by document id");
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &CompiledFilter) -> Result<usize> {
        let removed =
            self.mutate(|state| Ok(state.remove_where(|chunk| filter.matches_chunk(chunk)))).await?;
        debug!(removed, "deleted by filter");
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<()> {
        self.mutate(|state| {
            state.clear();
            Ok(())
        })
        .await?;
        debug!("deleted all chunks");
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        filter: Option<&CompiledFilter>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let state = self.state.read().await;
        match state.dimensions {
            None => return Ok(Vec::new()),
            Some(d) if d != embedding.len() => {
                return Err(RetrievalError::index(
                    BACKEND,
                    format!("query has dimension {}, index has {d}", embedding.len()),
                ));
            }
            Some(_) => {}
        }

        let mut scored: Vec<(u64, f32, &DocumentChunk)> = state
            .chunks
            .values()
            .filter(|stored| filter.is_none_or(|f| f.matches_chunk(&stored.chunk)))
            .map(|stored| {
                (stored.seq, cosine_similarity(&stored.chunk.embedding, embedding), &stored.chunk)
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        Ok(scored
            .into_iter()
            .map(|(_, score, chunk)| ScoredChunk { chunk: chunk.clone(), score })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.chunks.len())
    }
}
