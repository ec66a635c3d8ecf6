//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Each chunk becomes one point whose ID is a UUID v5 of the chunk ID. The
//! payload holds the chunk ID and text, the full metadata as JSON, and flattened
//! copies of the filterable fields so that filters run inside Qdrant before
//! ranking.
//!
//! Limitations: `replace_document` deletes then upserts, so a concurrent
//! search may briefly see the document with no chunks, and an upsert that
//! fails after the delete leaves it with none; `delete_all` drops and
//! recreates the collection; score ties are ordered by write sequence only
//! among the points Qdrant returns.
//!
//! # Example
//!
//! ```rust,ignore
//! use retrieval_core::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334", "documents", 384)?;
//! store.ensure_collection().await?;
//! let results = store.search(&query_embedding, None, 5).await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition as QdrantCondition, CountPointsBuilder, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance, FieldType, Filter,
    PointStruct, Range, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::document::{DocumentChunk, DocumentMetadata, ScoredChunk};
use crate::error::{Result, RetrievalError};
use crate::filter::{CompiledFilter, Condition, MetadataField};
use crate::vectorstore::VectorStore;

const BACKEND: &str = "qdrant";

const TEXT_KEY: &str = "text";
const METADATA_KEY: &str = "metadata_json";
const CREATED_AT_KEY: &str = "created_at_ms";
const SEQ_KEY: &str = "seq";
const CHUNK_ID_KEY: &str = "chunk_id";

/// A [`VectorStore`] backed by a single [Qdrant](https://qdrant.tech/)
/// collection with cosine distance.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    dimensions: usize,
    next_seq: AtomicU64,
}

impl QdrantVectorStore {
    /// Create a store for `collection` on the Qdrant server at `url`.
    ///
    /// No request is made until [`ensure_collection`](Self::ensure_collection)
    /// or the first store operation.
    pub fn new(url: &str, collection: &str, dimensions: usize) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self::from_client(client, collection, dimensions))
    }

    /// Create a store from an existing client.
    pub fn from_client(client: Qdrant, collection: &str, dimensions: usize) -> Self {
        let seed = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
        Self {
            client,
            collection: collection.to_string(),
            dimensions,
            next_seq: AtomicU64::new(seed),
        }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RetrievalError {
        RetrievalError::index(BACKEND, e.to_string())
    }

    /// Create the collection and its payload indexes if it does not exist.
    pub async fn ensure_collection(&self) -> Result<()> {
        let exists =
            self.client.collection_exists(&self.collection).await.map_err(Self::map_err)?;
        if exists {
            debug!(collection = %self.collection, "qdrant collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimensions as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(Self::map_err)?;

        let keyword_fields = [
            MetadataField::DocumentId,
            MetadataField::Source,
            MetadataField::SourceId,
            MetadataField::Url,
            MetadataField::Author,
        ];
        for field in keyword_fields {
            self.create_index(field.as_str(), FieldType::Keyword).await?;
        }
        self.create_index(CREATED_AT_KEY, FieldType::Integer).await?;

        debug!(collection = %self.collection, dimensions = self.dimensions, "created qdrant collection");
        Ok(())
    }

    async fn create_index(&self, field: &str, field_type: FieldType) -> Result<()> {
        self.client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(&self.collection, field, field_type)
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    fn to_point(&self, chunk: &DocumentChunk) -> Result<PointStruct> {
        if chunk.embedding.len() != self.dimensions {
            return Err(RetrievalError::index(
                BACKEND,
                format!(
                    "chunk '{}' has dimension {}, collection has {}",
                    chunk.id,
                    chunk.embedding.len(),
                    self.dimensions
                ),
            ));
        }

        let metadata_json = serde_json::to_string(&chunk.metadata)
            .map_err(|e| RetrievalError::index(BACKEND, format!("metadata encode: {e}")))?;
        let meta = &chunk.metadata;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        let mut payload = serde_json::json!({
            CHUNK_ID_KEY: chunk.id,
            TEXT_KEY: chunk.text,
            METADATA_KEY: metadata_json,
            "document_id": chunk.document_id,
            SEQ_KEY: seq,
        });
        if let Some(map) = payload.as_object_mut() {
            let optional = [
                (MetadataField::Source, meta.source.map(|s| s.as_str().to_string())),
                (MetadataField::SourceId, meta.source_id.clone()),
                (MetadataField::Url, meta.url.clone()),
                (MetadataField::Author, meta.author.clone()),
            ];
            for (field, value) in optional {
                if let Some(value) = value {
                    map.insert(field.as_str().to_string(), value.into());
                }
            }
            if let Some(at) = meta.created_at {
                map.insert(CREATED_AT_KEY.to_string(), at.timestamp_millis().into());
            }
        }

        let payload = Payload::try_from(payload).map_err(Self::map_err)?;
        Ok(PointStruct::new(point_id(&chunk.id), chunk.embedding.clone(), payload))
    }

    async fn delete_matching(&self, filter: Filter) -> Result<()> {
        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(filter).wait(true))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn count_matching(&self, filter: Option<Filter>) -> Result<usize> {
        let mut request = CountPointsBuilder::new(&self.collection).exact(true);
        if let Some(filter) = filter {
            request = request.filter(filter);
        }
        let response = self.client.count(request).await.map_err(Self::map_err)?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or_default())
    }

    fn extract_string(value: &QdrantValue) -> Option<&str> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s),
            _ => None,
        }
    }

    fn extract_integer(value: &QdrantValue) -> Option<i64> {
        match &value.kind {
            Some(Kind::IntegerValue(n)) => Some(*n),
            _ => None,
        }
    }

    /// Rebuild a chunk from a search hit. Returns the hit's write sequence
    /// alongside.
    fn from_scored_point(point: ScoredPoint) -> (u64, ScoredChunk) {
        let get_string =
            |key: &str| point.payload.get(key).and_then(Self::extract_string).map(str::to_string);
        let document_id = get_string("document_id").unwrap_or_default();
        let text = get_string(TEXT_KEY).unwrap_or_default();
        let metadata = get_string(METADATA_KEY)
            .and_then(|raw| serde_json::from_str::<DocumentMetadata>(&raw).ok())
            .unwrap_or_else(|| {
                warn!(document_id = %document_id, "qdrant point has unreadable metadata");
                DocumentMetadata::default()
            });
        let seq = point
            .payload
            .get(SEQ_KEY)
            .and_then(Self::extract_integer)
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(u64::MAX);
        let id = get_string(CHUNK_ID_KEY).unwrap_or_default();

        let chunk = DocumentChunk { id, document_id, text, embedding: Vec::new(), metadata };
        (seq, ScoredChunk { chunk, score: point.score })
    }
}

/// Deterministic point ID for a chunk ID.
fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

/// Translate a compiled filter into a Qdrant `must` filter.
fn to_qdrant_filter(filter: &CompiledFilter) -> Filter {
    let conditions = filter.conditions().iter().map(|condition| match condition {
        Condition::TextIn { field, values } => {
            QdrantCondition::matches(field.as_str(), values.clone())
        }
        Condition::SourceIn(sources) => QdrantCondition::matches(
            MetadataField::Source.as_str(),
            sources.iter().map(|s| s.as_str().to_string()).collect::<Vec<_>>(),
        ),
        Condition::CreatedAtIn(instants) => QdrantCondition::matches(
            CREATED_AT_KEY,
            instants.iter().map(|at| at.timestamp_millis()).collect::<Vec<_>>(),
        ),
        Condition::CreatedAtGte(bound) => QdrantCondition::range(
            CREATED_AT_KEY,
            Range { gte: Some(bound.timestamp_millis() as f64), ..Default::default() },
        ),
        Condition::CreatedAtLte(bound) => QdrantCondition::range(
            CREATED_AT_KEY,
            Range { lte: Some(bound.timestamp_millis() as f64), ..Default::default() },
        ),
    });
    Filter::must(conditions)
}

fn document_filter(document_ids: &[String]) -> Filter {
    Filter::must([QdrantCondition::matches(
        MetadataField::DocumentId.as_str(),
        document_ids.to_vec(),
    )])
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn write(&self, chunks: &[DocumentChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points = chunks.iter().map(|chunk| self.to_point(chunk)).collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = chunks.len(), "upserted chunks to qdrant");
        Ok(())
    }

    async fn delete_by_document_ids(&self, document_ids: &[String]) -> Result<()> {
        if document_ids.is_empty() {
            return Ok(());
        }
        self.delete_matching(document_filter(document_ids)).await?;
        debug!(collection = %self.collection, documents = document_ids.len(), "deleted documents from qdrant");
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &CompiledFilter) -> Result<usize> {
        let filter = to_qdrant_filter(filter);
        let matching = self.count_matching(Some(filter.clone())).await?;
        if matching == 0 {
            return Ok(0);
        }
        self.delete_matching(filter).await?;
        debug!(collection = %self.collection, removed = matching, "deleted by filter from qdrant");
        Ok(matching)
    }

    async fn delete_all(&self) -> Result<()> {
        self.client.delete_collection(&self.collection).await.map_err(Self::map_err)?;
        debug!(collection = %self.collection, "dropped qdrant collection");
        self.ensure_collection().await
    }

    async fn search(
        &self,
        embedding: &[f32],
        filter: Option<&CompiledFilter>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if embedding.len() != self.dimensions {
            return Err(RetrievalError::index(
                BACKEND,
                format!(
                    "query has dimension {}, collection has {}",
                    embedding.len(),
                    self.dimensions
                ),
            ));
        }

        let mut request =
            SearchPointsBuilder::new(&self.collection, embedding.to_vec(), top_k as u64)
                .with_payload(true);
        if let Some(filter) = filter.filter(|f| !f.is_match_all()) {
            request = request.filter(to_qdrant_filter(filter));
        }

        let response = self.client.search_points(request).await.map_err(Self::map_err)?;

        let mut hits: Vec<(u64, ScoredChunk)> =
            response.result.into_iter().map(Self::from_scored_point).collect();
        hits.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn count(&self) -> Result<usize> {
        self.count_matching(None).await
    }
}
