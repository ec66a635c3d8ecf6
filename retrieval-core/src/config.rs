//! Configuration for the retrieval pipeline and vector store selection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Which [`Chunker`](crate::Chunker) the pipeline builds by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// [`FixedSizeChunker`](crate::FixedSizeChunker).
    Fixed,
    /// [`RecursiveChunker`](crate::RecursiveChunker).
    #[default]
    Recursive,
}

/// Retry behaviour for embedding batches.
///
/// A failing batch is retried with exponential backoff up to `max_retries`
/// times. If it still fails it is split in half and each half is retried the
/// same way, down to single texts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingRetryPolicy {
    /// Retries per batch before splitting it.
    pub max_retries: usize,
    /// Initial backoff delay in milliseconds.
    pub min_delay_ms: u64,
    /// Upper bound on the backoff delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for EmbeddingRetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, min_delay_ms: 100, max_delay_ms: 2_000 }
    }
}

impl EmbeddingRetryPolicy {
    /// A policy that never retries or splits. Mostly useful in tests.
    pub fn none() -> Self {
        Self { max_retries: 0, min_delay_ms: 0, max_delay_ms: 0 }
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunking strategy used when no chunker is injected.
    pub chunking: ChunkingStrategy,
    /// Number of results returned when a query does not set `top_k`.
    pub default_top_k: usize,
    /// Largest `top_k` a query may request.
    pub max_top_k: usize,
    /// Minimum similarity score for results, if any.
    pub similarity_threshold: Option<f32>,
    /// Documents or queries processed concurrently within one request.
    pub max_concurrency: usize,
    /// Retry behaviour for embedding calls.
    pub embedding_retry: EmbeddingRetryPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 100,
            chunking: ChunkingStrategy::default(),
            default_top_k: 3,
            max_top_k: 100,
            similarity_threshold: None,
            max_concurrency: 8,
            embedding_retry: EmbeddingRetryPolicy::default(),
        }
    }
}

impl RetrievalConfig {
    /// Create a new builder for constructing a [`RetrievalConfig`].
    pub fn builder() -> RetrievalConfigBuilder {
        RetrievalConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `default_top_k == 0` or `default_top_k > max_top_k`
    /// - `max_concurrency == 0`
    /// - `similarity_threshold` is not finite
    /// - `embedding_retry.min_delay_ms > embedding_retry.max_delay_ms`
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RetrievalError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RetrievalError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.default_top_k == 0 {
            return Err(RetrievalError::Config(
                "default_top_k must be greater than zero".to_string(),
            ));
        }
        if self.default_top_k > self.max_top_k {
            return Err(RetrievalError::Config(format!(
                "default_top_k ({}) must not exceed max_top_k ({})",
                self.default_top_k, self.max_top_k
            )));
        }
        if self.max_concurrency == 0 {
            return Err(RetrievalError::Config(
                "max_concurrency must be greater than zero".to_string(),
            ));
        }
        if self.similarity_threshold.is_some_and(|t| !t.is_finite()) {
            return Err(RetrievalError::Config("similarity_threshold must be finite".to_string()));
        }
        let retry = &self.embedding_retry;
        if retry.min_delay_ms > retry.max_delay_ms {
            return Err(RetrievalError::Config(format!(
                "embedding_retry.min_delay_ms ({}) must not exceed max_delay_ms ({})",
                retry.min_delay_ms, retry.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RetrievalConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrievalConfigBuilder {
    config: RetrievalConfig,
}

impl RetrievalConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the chunking strategy.
    pub fn chunking(mut self, strategy: ChunkingStrategy) -> Self {
        self.config.chunking = strategy;
        self
    }

    /// Set the number of results returned when a query does not set `top_k`.
    pub fn default_top_k(mut self, k: usize) -> Self {
        self.config.default_top_k = k;
        self
    }

    /// Set the largest `top_k` a query may request.
    pub fn max_top_k(mut self, k: usize) -> Self {
        self.config.max_top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set how many documents or queries run concurrently within a request.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    /// Set the embedding retry policy.
    pub fn embedding_retry(mut self, policy: EmbeddingRetryPolicy) -> Self {
        self.config.embedding_retry = policy;
        self
    }

    /// Build the [`RetrievalConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RetrievalConfig::validate`].
    pub fn build(self) -> Result<RetrievalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Selects the vector store backend at construction time.
///
/// Use [`build_vector_store`](crate::build_vector_store) to turn this into a
/// [`VectorStore`](crate::VectorStore).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum VectorStoreConfig {
    /// [`InMemoryVectorStore`](crate::InMemoryVectorStore).
    #[default]
    Memory,
    /// In-memory store restored from and saved to a JSON snapshot.
    Snapshot { path: String },
    /// Qdrant over gRPC (feature `qdrant`).
    Qdrant { url: String, collection: String },
    /// PostgreSQL with pgvector (feature `pgvector`).
    PgVector { url: String, table: String },
}

impl VectorStoreConfig {
    /// Read the backend selection from the environment.
    ///
    /// `DATASTORE` chooses the backend (`memory`, `snapshot`, `qdrant`,
    /// `pgvector`; default `memory`). Backend settings come from
    /// `SNAPSHOT_PATH`, `QDRANT_URL`, `QDRANT_COLLECTION`, `PGVECTOR_URL`, and
    /// `PGVECTOR_TABLE`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] for an unknown `DATASTORE` or a
    /// missing required variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| {
                RetrievalError::Config(format!("{key} environment variable not set"))
            })
        };

        let datastore = lookup("DATASTORE").unwrap_or_else(|| "memory".to_string());
        match datastore.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "snapshot" => Ok(Self::Snapshot { path: required("SNAPSHOT_PATH")? }),
            "qdrant" => Ok(Self::Qdrant {
                url: lookup("QDRANT_URL").unwrap_or_else(|| "http://localhost:6334".to_string()),
                collection: lookup("QDRANT_COLLECTION").unwrap_or_else(|| "documents".to_string()),
            }),
            "pgvector" => Ok(Self::PgVector {
                url: required("PGVECTOR_URL")?,
                table: lookup("PGVECTOR_TABLE").unwrap_or_else(|| "documents".to_string()),
            }),
            other => Err(RetrievalError::Config(format!("unknown DATASTORE '{other}'"))),
        }
    }
}
