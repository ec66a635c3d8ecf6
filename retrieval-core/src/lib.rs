//! # retrieval-core
//!
//! Document store abstraction and retrieval pipeline for natural-language
//! document search.
//!
//! ## Overview
//!
//! This crate turns documents into searchable, filterable, deletable vector
//! records and answers similarity queries. It sits behind a thin HTTP layer
//! and exposes three operations through [`RetrievalPipeline`]:
//!
//! - [`upsert`](RetrievalPipeline::upsert): chunk, embed, and store
//!   documents; re-upserting an ID replaces its chunks
//! - [`query`](RetrievalPipeline::query): filtered similarity search
//! - [`delete`](RetrievalPipeline::delete): by document ID, by filter, or
//!   everything
//!
//! The pieces are pluggable:
//!
//! - [`Chunker`]: [`FixedSizeChunker`], [`RecursiveChunker`]
//! - [`EmbeddingProvider`]: [`HashingEmbeddingProvider`], `OpenAIEmbeddingProvider` (feature `openai`)
//! - [`VectorStore`]: [`InMemoryVectorStore`] (optionally snapshotted to
//!   disk), `QdrantVectorStore` (feature `qdrant`), `PgVectorStore`
//!   (feature `pgvector`)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use retrieval_core::{
//!     DeleteRequest, Document, DocumentMetadata, FilterPredicate, HashingEmbeddingProvider,
//!     InMemoryVectorStore, Query, RetrievalPipeline, Source,
//! };
//!
//! # async fn demo() -> retrieval_core::Result<()> {
//! let pipeline = RetrievalPipeline::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! pipeline
//!     .upsert(vec![
//!         Document::new("Meeting notes about the launch", DocumentMetadata::with_source(Source::Email))
//!             .with_id("mail-1"),
//!     ])
//!     .await?;
//!
//! let filter = FilterPredicate::new().eq("source", Source::Email);
//! let results = pipeline.query(vec![Query::new("launch").with_filter(filter)]).await?;
//! assert_eq!(results[0].results[0].chunk.document_id, "mail-1");
//!
//! pipeline.delete(DeleteRequest::ids(["mail-1"])).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `openai` | OpenAI embeddings over `reqwest` |
//! | `qdrant` | Qdrant vector store over gRPC |
//! | `pgvector` | PostgreSQL + pgvector vector store over `sqlx` |
//! | `full` | All of the above |

pub mod api;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod hashing;
pub mod inmemory;
pub mod pipeline;
pub mod retry;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "pgvector")]
pub mod pgvector;

#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use api::{
    DeleteRequest, DeleteResponse, QueryRequest, QueryResponse, UpsertRequest, UpsertResponse,
};
pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, TextChunk, chunker_for};
pub use config::{
    ChunkingStrategy, EmbeddingRetryPolicy, RetrievalConfig, RetrievalConfigBuilder,
    VectorStoreConfig,
};
pub use document::{
    Document, DocumentChunk, DocumentMetadata, Query, QueryResult, ScoredChunk, Source, chunk_id,
};
pub use embedding::{EmbeddingProvider, validate_embeddings};
pub use error::{ErrorKind, Result, RetrievalError, UpsertFailure};
pub use filter::{
    CompiledFilter, Condition, DocumentMetadataFilter, FilterClause, FilterOp, FilterPredicate,
    FilterValue, MetadataField,
};
pub use hashing::HashingEmbeddingProvider;
pub use inmemory::InMemoryVectorStore;
pub use pipeline::{RetrievalPipeline, RetrievalPipelineBuilder};
pub use retry::embed_with_retry;
pub use vectorstore::{VectorStore, build_vector_store};

#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;

#[cfg(feature = "pgvector")]
pub use pgvector::PgVectorStore;

#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
