//! Vector store trait for storing and searching chunk embeddings.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::VectorStoreConfig;
use crate::document::{DocumentChunk, ScoredChunk};
use crate::error::{Result, RetrievalError};
use crate::filter::CompiledFilter;
use crate::inmemory::InMemoryVectorStore;

/// A storage backend for chunk embeddings with filtered similarity search.
///
/// Every chunk belongs to exactly one document, and a document's chunks are
/// always written, replaced, and deleted as a group. When a write returns,
/// subsequent searches observe it.
///
/// # Example
///
/// ```rust
/// use retrieval_core::{CompiledFilter, InMemoryVectorStore, VectorStore};
///
/// # async fn demo() -> retrieval_core::Result<()> {
/// let store = InMemoryVectorStore::new();
/// let hits = store.search(&[1.0, 0.0], Some(&CompiledFilter::match_all()), 5).await?;
/// assert!(hits.is_empty());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// A short backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Upsert chunks by chunk ID. Every chunk must carry an embedding.
    async fn write(&self, chunks: &[DocumentChunk]) -> Result<()>;

    /// Remove every chunk of `document_id` and write `chunks` in its place.
    ///
    /// The default implementation deletes then writes, which leaves a short
    /// window where the document has no chunks. Backends that can do better
    /// override it so readers see either the old set or the new one.
    async fn replace_document(&self, document_id: &str, chunks: &[DocumentChunk]) -> Result<()> {
        self.delete_by_document_ids(&[document_id.to_string()]).await?;
        if chunks.is_empty() {
            return Ok(());
        }
        self.write(chunks).await
    }

    /// Delete every chunk of the given documents. Unknown IDs are ignored.
    async fn delete_by_document_ids(&self, document_ids: &[String]) -> Result<()>;

    /// Delete every chunk matching `filter` and return how many were removed,
    /// when the backend can tell.
    async fn delete_by_filter(&self, filter: &CompiledFilter) -> Result<usize>;

    /// Delete everything.
    async fn delete_all(&self) -> Result<()>;

    /// Return up to `top_k` chunks most similar to `embedding`, restricted to
    /// chunks matching `filter`, ordered by descending cosine similarity.
    ///
    /// Ties keep insertion order, earliest first.
    async fn search(
        &self,
        embedding: &[f32],
        filter: Option<&CompiledFilter>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Number of stored chunks.
    async fn count(&self) -> Result<usize>;
}

/// Construct the backend selected by `config` for embeddings of the given
/// dimensionality.
///
/// # Errors
///
/// Returns [`RetrievalError::Config`] if the selected backend was not
/// compiled in, or the backend's own error if it cannot be reached or
/// initialized.
pub async fn build_vector_store(
    config: &VectorStoreConfig,
    dimensions: usize,
) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config {
        VectorStoreConfig::Memory => Arc::new(InMemoryVectorStore::new()),
        VectorStoreConfig::Snapshot { path } => {
            Arc::new(InMemoryVectorStore::load_snapshot(path).await?)
        }
        #[cfg(feature = "qdrant")]
        VectorStoreConfig::Qdrant { url, collection } => {
            let store = crate::qdrant::QdrantVectorStore::new(url, collection, dimensions)?;
            store.ensure_collection().await?;
            Arc::new(store)
        }
        #[cfg(feature = "pgvector")]
        VectorStoreConfig::PgVector { url, table } => {
            let store = crate::pgvector::PgVectorStore::connect(url, table, dimensions).await?;
            store.ensure_table().await?;
            Arc::new(store)
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(RetrievalError::Config(format!(
                "vector store backend {other:?} is not enabled in this build"
            )));
        }
    };
    info!(backend = store.backend(), dimensions, "vector store ready");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_memory_store() {
        let store = build_vector_store(&VectorStoreConfig::Memory, 4).await.unwrap();
        assert_eq!(store.backend(), "InMemory");
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[cfg(not(feature = "qdrant"))]
    #[tokio::test]
    async fn disabled_backend_is_a_config_error() {
        let config = VectorStoreConfig::Qdrant {
            url: "http://localhost:6334".into(),
            collection: "documents".into(),
        };
        let err = build_vector_store(&config, 4).await.err().unwrap();
        assert!(matches!(err, RetrievalError::Config(_)));
    }
}
