//! Retrieval pipeline orchestrator.
//!
//! The [`RetrievalPipeline`] implements the three operations behind the
//! HTTP layer by composing an [`EmbeddingProvider`], a [`VectorStore`], and a
//! [`Chunker`]:
//!
//! - **upsert**: chunk → embed (batched, with retry) → replace the
//!   document's chunk set
//! - **query**: validate → embed → filtered search → threshold
//! - **delete**: by document ID, by filter, or everything
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use retrieval_core::{
//!     Document, DocumentMetadata, HashingEmbeddingProvider, InMemoryVectorStore, Query,
//!     RetrievalPipeline,
//! };
//!
//! # async fn demo() -> retrieval_core::Result<()> {
//! let pipeline = RetrievalPipeline::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! let ids = pipeline.upsert(vec![Document::new("The cat sat", DocumentMetadata::default())]).await?;
//! let results = pipeline.query(vec![Query::new("cat")]).await?;
//! assert_eq!(results[0].results[0].chunk.document_id, ids[0]);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::api::DeleteRequest;
use crate::chunking::{Chunker, chunker_for};
use crate::config::{RetrievalConfig, VectorStoreConfig};
use crate::document::{Document, DocumentChunk, DocumentMetadata, Query, QueryResult, chunk_id};
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, RetrievalError, UpsertFailure};
use crate::filter::CompiledFilter;
use crate::retry::embed_with_retry;
use crate::vectorstore::{VectorStore, build_vector_store};

/// The retrieval pipeline orchestrator.
///
/// Holds no per-request state; share one instance behind an `Arc`.
/// Construct one via [`RetrievalPipeline::builder()`].
pub struct RetrievalPipeline {
    config: RetrievalConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
}

/// A query that passed validation.
struct PreparedQuery {
    text: String,
    filter: Option<CompiledFilter>,
    top_k: usize,
}

impl RetrievalPipeline {
    /// Create a new [`RetrievalPipelineBuilder`].
    pub fn builder() -> RetrievalPipelineBuilder {
        RetrievalPipelineBuilder::default()
    }

    /// Build a pipeline whose vector store is selected by `store_config`.
    ///
    /// The store is created for the provider's dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] for an invalid configuration or a
    /// backend that is not compiled in, and the backend's error if it cannot
    /// be initialized.
    pub async fn connect(
        config: RetrievalConfig,
        store_config: &VectorStoreConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let vector_store = build_vector_store(store_config, embedding_provider.dimensions()).await?;
        Self::builder()
            .config(config)
            .embedding_provider(embedding_provider)
            .vector_store(vector_store)
            .build()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Ingest documents and return their IDs in input order.
    ///
    /// Documents without an ID get a fresh UUID. Each document's chunk set
    /// replaces whatever was stored under its ID before, so re-upserting the
    /// same document is idempotent. A document whose text yields no chunks
    /// is accepted and clears any earlier chunks for its ID.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::Validation`] if `documents` is empty, an ID is
    ///   blank, or an ID appears twice. Nothing is written.
    /// - The document's own error if a single-document upsert fails.
    /// - [`RetrievalError::PartialUpsert`] if some documents of a larger
    ///   request fail. A failed document keeps its previous chunks on stores
    ///   with an atomic [`VectorStore::replace_document`] (in-memory,
    ///   snapshot, pgvector). On Qdrant a write that fails after the old
    ///   chunks were deleted leaves the document with no chunks.
    pub async fn upsert(&self, documents: Vec<Document>) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Err(RetrievalError::Validation("no documents to upsert".to_string()));
        }

        validate_ids(&documents)?;

        let total = documents.len();
        let outcomes: Vec<(usize, String, Result<usize>)> =
            stream::iter(documents.into_iter().enumerate().map(|(index, mut document)| {
                let id = document.id.take().unwrap_or_else(|| Uuid::new_v4().to_string());
                async move {
                    let outcome = self.ingest(&id, &document).await;
                    (index, id, outcome)
                }
            }))
            .buffered(self.config.max_concurrency)
            .collect()
            .await;

        let mut succeeded = Vec::with_capacity(total);
        let mut failed = Vec::new();
        let mut chunk_count = 0;
        for (index, document_id, outcome) in outcomes {
            match outcome {
                Ok(chunks) => {
                    chunk_count += chunks;
                    succeeded.push(document_id);
                }
                Err(error) => failed.push(UpsertFailure { index, document_id, error }),
            }
        }

        if failed.is_empty() {
            info!(document_count = total, chunk_count, "upsert completed");
            return Ok(succeeded);
        }

        error!(succeeded = succeeded.len(), failed = failed.len(), "upsert partially failed");
        if total == 1 {
            if let Some(failure) = failed.pop() {
                return Err(failure.error);
            }
        }
        Err(RetrievalError::PartialUpsert { succeeded, failed })
    }

    /// Chunk, embed, and store one document. Returns the number of chunks.
    async fn ingest(&self, document_id: &str, document: &Document) -> Result<usize> {
        let passages = self.chunker.chunk(document);
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();

        let embeddings =
            embed_with_retry(self.embedding_provider.as_ref(), &texts, &self.config.embedding_retry)
                .await
                .inspect_err(|e| {
                    error!(document.id = document_id, error = %e, "embedding failed during upsert");
                })?;

        let chunks: Vec<DocumentChunk> = passages
            .into_iter()
            .zip(embeddings)
            .map(|(passage, embedding)| DocumentChunk {
                id: chunk_id(document_id, passage.ordinal),
                document_id: document_id.to_string(),
                text: passage.text,
                embedding,
                metadata: document.metadata.clone(),
            })
            .collect();

        self.vector_store.replace_document(document_id, &chunks).await.inspect_err(|e| {
            error!(document.id = document_id, error = %e, "vector store write failed");
        })?;

        debug!(document.id = document_id, chunk_count = chunks.len(), "ingested document");
        Ok(chunks.len())
    }

    /// Ingest an uploaded file's extracted text.
    ///
    /// `raw_metadata` is the JSON metadata form field, if any. When it is
    /// missing or cannot be parsed the document is tagged `source: file`.
    /// Returns the generated document ID.
    ///
    /// # Errors
    ///
    /// See [`upsert`](Self::upsert).
    pub async fn upsert_file(&self, text: &str, raw_metadata: Option<&str>) -> Result<String> {
        let metadata = DocumentMetadata::from_file_form(raw_metadata);
        let id = Uuid::new_v4().to_string();
        self.upsert(vec![Document::new(text, metadata).with_id(id.clone())]).await?;
        Ok(id)
    }

    /// Run queries and return one [`QueryResult`] per query, in input order.
    ///
    /// Results are ordered by descending score, carry no embeddings, and
    /// never include a chunk that fails the query's filter. An empty input
    /// returns an empty output.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::Validation`] for blank query text or a `top_k`
    ///   of zero or above `max_top_k`.
    /// - [`RetrievalError::InvalidFilter`] for a malformed filter.
    ///
    /// All queries are validated before any is executed. Embedding or index
    /// failures of any query fail the whole call.
    pub async fn query(&self, queries: Vec<Query>) -> Result<Vec<QueryResult>> {
        let prepared =
            queries.into_iter().map(|q| self.prepare_query(q)).collect::<Result<Vec<_>>>()?;
        if prepared.is_empty() {
            return Ok(Vec::new());
        }

        let query_count = prepared.len();
        let results: Vec<QueryResult> = stream::iter(prepared.into_iter().map(|q| self.run_query(q)))
            .buffered(self.config.max_concurrency)
            .try_collect()
            .await?;

        info!(query_count, "query completed");
        Ok(results)
    }

    fn prepare_query(&self, query: Query) -> Result<PreparedQuery> {
        if query.query.trim().is_empty() {
            return Err(RetrievalError::Validation("query text is blank".to_string()));
        }
        let top_k = query.top_k.unwrap_or(self.config.default_top_k);
        if top_k == 0 || top_k > self.config.max_top_k {
            return Err(RetrievalError::Validation(format!(
                "top_k must be between 1 and {}, got {top_k}",
                self.config.max_top_k
            )));
        }
        let filter = match &query.filter {
            Some(predicate) if !predicate.is_empty() => Some(predicate.compile()?),
            _ => None,
        };
        Ok(PreparedQuery { text: query.query, filter, top_k })
    }

    async fn run_query(&self, query: PreparedQuery) -> Result<QueryResult> {
        let embedding = embed_with_retry(
            self.embedding_provider.as_ref(),
            &[query.text.as_str()],
            &self.config.embedding_retry,
        )
        .await
        .inspect_err(|e| error!(error = %e, "embedding failed during query"))?
        .pop()
        .ok_or_else(|| {
            RetrievalError::Embedding {
                provider: self.embedding_provider.name().to_string(),
                message: "no embedding returned for query".to_string(),
            }
        })?;

        let hits = self
            .vector_store
            .search(&embedding, query.filter.as_ref(), query.top_k)
            .await
            .inspect_err(|e| error!(error = %e, "vector store search failed"))?;

        let threshold = self.config.similarity_threshold;
        let results = hits
            .into_iter()
            .filter(|hit| threshold.is_none_or(|t| hit.score >= t))
            .map(|mut hit| {
                hit.chunk.embedding = Vec::new();
                hit
            })
            .collect::<Vec<_>>();

        debug!(top_k = query.top_k, result_count = results.len(), "query executed");
        Ok(QueryResult { query: query.text, results })
    }

    /// Delete records selected by `request`.
    ///
    /// `delete_all` takes precedence over `filter`, which takes precedence
    /// over `ids`. Empty `ids` and empty filters count as absent.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::Validation`] if no selector is present. The
    ///   store is not called.
    /// - [`RetrievalError::InvalidFilter`] for a malformed filter.
    /// - [`RetrievalError::Index`] if the store fails.
    pub async fn delete(&self, request: DeleteRequest) -> Result<bool> {
        let store = &self.vector_store;
        if request.delete_all {
            store.delete_all().await.inspect_err(|e| error!(error = %e, "delete all failed"))?;
            info!("deleted all records");
            return Ok(true);
        }

        if let Some(predicate) = request.filter.filter(|f| !f.is_empty()) {
            let filter = predicate.compile()?;
            let removed = store
                .delete_by_filter(&filter)
                .await
                .inspect_err(|e| error!(error = %e, "delete by filter failed"))?;
            info!(removed, "deleted by filter");
            return Ok(true);
        }

        if let Some(ids) = request.ids.filter(|ids| !ids.is_empty()) {
            store
                .delete_by_document_ids(&ids)
                .await
                .inspect_err(|e| error!(error = %e, "delete by id failed"))?;
            info!(document_count = ids.len(), "deleted documents");
            return Ok(true);
        }

        Err(RetrievalError::Validation(
            "one of ids, filter, or delete_all is required".to_string(),
        ))
    }

    /// Number of chunks currently stored.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn chunk_count(&self) -> Result<usize> {
        self.vector_store.count().await
    }
}

/// Reject blank or repeated caller-supplied IDs.
fn validate_ids(documents: &[Document]) -> Result<()> {
    let mut seen = HashSet::new();
    for id in documents.iter().filter_map(|d| d.id.as_deref()) {
        if id.trim().is_empty() {
            return Err(RetrievalError::Validation("document id is blank".to_string()));
        }
        if !seen.insert(id) {
            return Err(RetrievalError::Validation(format!(
                "duplicate document id '{id}' in request"
            )));
        }
    }
    Ok(())
}

/// Builder for constructing a [`RetrievalPipeline`].
///
/// The embedding provider and vector store are required. The config
/// defaults to [`RetrievalConfig::default()`] and the chunker to the one the
/// config selects.
#[derive(Default)]
pub struct RetrievalPipelineBuilder {
    config: Option<RetrievalConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RetrievalPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RetrievalConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RetrievalPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if a required component is missing
    /// or the configuration is invalid.
    pub fn build(self) -> Result<RetrievalPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RetrievalError::Config("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RetrievalError::Config("vector_store is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| chunker_for(&config));

        Ok(RetrievalPipeline { config, embedding_provider, vector_store, chunker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashingEmbeddingProvider;
    use crate::inmemory::InMemoryVectorStore;

    fn pipeline() -> RetrievalPipeline {
        RetrievalPipeline::builder()
            .embedding_provider(Arc::new(HashingEmbeddingProvider::new(64)))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_components() {
        let err = RetrievalPipeline::builder().build().err().unwrap();
        assert!(matches!(err, RetrievalError::Config(_)));

        let err = RetrievalPipeline::builder()
            .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[tokio::test]
    async fn upsert_rejects_bad_requests_without_writing() {
        let pipeline = pipeline();
        assert!(matches!(pipeline.upsert(vec![]).await, Err(RetrievalError::Validation(_))));

        let doc = |id: &str| Document::new("text", DocumentMetadata::default()).with_id(id);
        let err = pipeline.upsert(vec![doc("a"), doc("a")]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));
        let err = pipeline.upsert(vec![doc(" ")]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));
        assert_eq!(pipeline.chunk_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_document_clears_previous_chunks() {
        let pipeline = pipeline();
        let doc = Document::new("alpha beta", DocumentMetadata::default()).with_id("d");
        pipeline.upsert(vec![doc]).await.unwrap();
        assert_eq!(pipeline.chunk_count().await.unwrap(), 1);

        let ids = pipeline
            .upsert(vec![Document::new("   ", DocumentMetadata::default()).with_id("d")])
            .await
            .unwrap();
        assert_eq!(ids, ["d"]);
        assert_eq!(pipeline.chunk_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn query_validates_everything_first() {
        let pipeline = pipeline();
        assert!(pipeline.query(vec![]).await.unwrap().is_empty());

        let err = pipeline.query(vec![Query::new("  ")]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));
        let err = pipeline.query(vec![Query::new("cat").with_top_k(0)]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));
        let err = pipeline.query(vec![Query::new("cat").with_top_k(101)]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));

        let bad = crate::filter::FilterPredicate::new().eq("color", "red");
        let err = pipeline.query(vec![Query::new("cat").with_filter(bad)]).await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn results_omit_embeddings_and_respect_threshold() {
        let pipeline = RetrievalPipeline::builder()
            .config(RetrievalConfig::builder().similarity_threshold(0.99).build().unwrap())
            .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .build()
            .unwrap();
        pipeline
            .upsert(vec![
                Document::new("rust compiler", DocumentMetadata::default()).with_id("exact"),
                Document::new("rust compiler errors explained", DocumentMetadata::default())
                    .with_id("partial"),
            ])
            .await
            .unwrap();

        let results = pipeline.query(vec![Query::new("Rust compiler")]).await.unwrap();
        let hits = &results[0].results;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.document_id, "exact");
        assert!(hits[0].chunk.embedding.is_empty());
    }

    #[tokio::test]
    async fn upsert_file_tags_source_file_on_bad_metadata() {
        let pipeline = pipeline();
        let id = pipeline.upsert_file("quarterly report", Some("not json")).await.unwrap();
        let filter = crate::filter::FilterPredicate::new().eq("source", "file");
        let results =
            pipeline.query(vec![Query::new("quarterly report").with_filter(filter)]).await.unwrap();
        assert_eq!(results[0].results[0].chunk.document_id, id);
    }

    #[tokio::test]
    async fn delete_requires_a_selector() {
        let pipeline = pipeline();
        let err = pipeline.delete(DeleteRequest::default()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));
        let empty = DeleteRequest { ids: Some(vec![]), ..Default::default() };
        assert!(pipeline.delete(empty).await.is_err());
        assert!(pipeline.delete(DeleteRequest::ids(["missing"])).await.unwrap());
    }
}
