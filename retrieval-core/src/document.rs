//! Data types for documents, chunks, queries, and search results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::filter::FilterPredicate;

/// Where a document originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Email,
    File,
    Chat,
}

impl Source {
    /// All known sources.
    pub const ALL: [Source; 3] = [Source::Email, Source::File, Source::Chat];

    /// The wire name of this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Email => "email",
            Source::File => "file",
            Source::Chat => "chat",
        }
    }

    /// Parse a wire name, returning `None` for unknown sources.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to a [`Document`] and copied onto each of its chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl DocumentMetadata {
    /// Metadata carrying only a source.
    pub fn with_source(source: Source) -> Self {
        Self { source: Some(source), ..Self::default() }
    }

    /// Parse the metadata form field sent alongside an uploaded file.
    ///
    /// A missing or unparsable field falls back to `{source: file}` rather
    /// than rejecting the upload.
    pub fn from_file_form(raw: Option<&str>) -> Self {
        match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
                warn!(error = %e, "unparsable file metadata, defaulting to source=file");
                Self::with_source(Source::File)
            }),
            None => Self::with_source(Source::File),
        }
    }
}

/// A source document: text plus metadata.
///
/// When `id` is `None` the pipeline assigns a fresh UUID at upsert time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document without an ID.
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self { id: None, text: text.into(), metadata }
    }

    /// Set the document ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A passage of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    /// `{document_id}_{ordinal}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Stores may omit it from
    /// search results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Copy of the parent document's metadata at upsert time.
    pub metadata: DocumentMetadata,
}

/// Build the chunk ID for the chunk at `ordinal` within `document_id`.
pub fn chunk_id(document_id: &str, ordinal: usize) -> String {
    format!("{document_id}_{ordinal}")
}

/// A retrieved [`DocumentChunk`] paired with a similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: DocumentChunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// A natural-language query with an optional metadata filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Query {
    #[serde(alias = "text")]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterPredicate>,
    /// Number of results to return. Falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Query {
    /// Create a query with no filter and the default `top_k`.
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), filter: None, top_k: None }
    }

    /// Restrict results to chunks matching `filter`.
    pub fn with_filter(mut self, filter: FilterPredicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Override the number of results.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// The ranked results for one [`Query`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// The query text.
    pub query: String,
    /// Results ordered by descending score.
    pub results: Vec<ScoredChunk>,
}
