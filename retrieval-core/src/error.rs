//! Error types for the `retrieval-core` crate.

use thiserror::Error;

/// Errors that can occur in retrieval operations.
///
/// Each variant maps to one failure class so that the transport layer can
/// pick a response status per kind (see [`RetrievalError::status_code`])
/// instead of collapsing everything into a single internal error.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// A malformed document, query, or delete request.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The embedding backend failed or returned a malformed vector.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector index backend failed.
    #[error("Index error ({backend}): {message}")]
    Index {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A filter referenced an unknown field or carried a malformed value.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Some documents of a multi-document upsert failed.
    ///
    /// Documents listed in `succeeded` are fully written. A document in
    /// `failed` keeps its previous chunks, except on backends whose
    /// `replace_document` is not atomic (Qdrant), where it may have lost them.
    #[error("Upsert partially failed: {} succeeded, {} failed", .succeeded.len(), .failed.len())]
    PartialUpsert {
        /// IDs of the documents that were written, in request order.
        succeeded: Vec<String>,
        /// The documents that were not written.
        failed: Vec<UpsertFailure>,
    },
}

/// A single document that could not be ingested.
#[derive(Debug)]
pub struct UpsertFailure {
    /// Position of the document in the upsert request.
    pub index: usize,
    /// The document ID (caller-supplied or generated).
    pub document_id: String,
    /// Why ingestion failed.
    pub error: RetrievalError,
}

/// The failure class of a [`RetrievalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Embedding,
    Index,
    InvalidFilter,
    Config,
    PartialUpsert,
}

impl RetrievalError {
    pub(crate) fn embedding(provider: &str, message: impl Into<String>) -> Self {
        Self::Embedding { provider: provider.to_string(), message: message.into() }
    }

    pub(crate) fn index(backend: &str, message: impl Into<String>) -> Self {
        Self::Index { backend: backend.to_string(), message: message.into() }
    }

    /// Return the failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Embedding { .. } => ErrorKind::Embedding,
            Self::Index { .. } => ErrorKind::Index,
            Self::InvalidFilter(_) => ErrorKind::InvalidFilter,
            Self::Config(_) => ErrorKind::Config,
            Self::PartialUpsert { .. } => ErrorKind::PartialUpsert,
        }
    }

    /// Whether the caller caused this error (bad request or bad filter).
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::InvalidFilter)
    }

    /// Whether the pipeline retries this error internally.
    ///
    /// Only embedding failures are retried. Index writes are not assumed to
    /// be idempotent across backends and are surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Embedding { .. })
    }

    /// Suggested HTTP status code for the glue layer.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::InvalidFilter => 400,
            ErrorKind::PartialUpsert => 207,
            ErrorKind::Embedding => 502,
            ErrorKind::Index => 503,
            ErrorKind::Config => 500,
        }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;
