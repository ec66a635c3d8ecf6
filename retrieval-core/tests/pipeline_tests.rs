//! End-to-end tests for the retrieval pipeline over the in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use retrieval_core::{
    CompiledFilter, DeleteRequest, Document, DocumentChunk, DocumentMetadata, EmbeddingProvider,
    EmbeddingRetryPolicy, FilterPredicate, HashingEmbeddingProvider, InMemoryVectorStore, Query,
    Result, RetrievalConfig, RetrievalError, RetrievalPipeline, ScoredChunk, Source, VectorStore,
    VectorStoreConfig,
};

fn config() -> RetrievalConfig {
    RetrievalConfig::builder()
        .chunk_size(64)
        .chunk_overlap(8)
        .embedding_retry(EmbeddingRetryPolicy::none())
        .build()
        .unwrap()
}

fn pipeline_with(
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
) -> RetrievalPipeline {
    RetrievalPipeline::builder()
        .config(config())
        .embedding_provider(provider)
        .vector_store(store)
        .build()
        .unwrap()
}

fn pipeline() -> (RetrievalPipeline, Arc<InMemoryVectorStore>) {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(Arc::new(HashingEmbeddingProvider::default()), store.clone());
    (pipeline, store)
}

fn doc(id: &str, text: &str, source: Source) -> Document {
    Document::new(text, DocumentMetadata::with_source(source)).with_id(id)
}

/// Wraps the in-memory store and counts every call that reaches it.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryVectorStore,
    calls: AtomicUsize,
}

impl CountingStore {
    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for CountingStore {
    fn backend(&self) -> &str {
        "counting"
    }

    async fn write(&self, chunks: &[DocumentChunk]) -> Result<()> {
        self.hit();
        self.inner.write(chunks).await
    }

    async fn delete_by_document_ids(&self, document_ids: &[String]) -> Result<()> {
        self.hit();
        self.inner.delete_by_document_ids(document_ids).await
    }

    async fn delete_by_filter(&self, filter: &CompiledFilter) -> Result<usize> {
        self.hit();
        self.inner.delete_by_filter(filter).await
    }

    async fn delete_all(&self) -> Result<()> {
        self.hit();
        self.inner.delete_all().await
    }

    async fn search(
        &self,
        embedding: &[f32],
        filter: Option<&CompiledFilter>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.hit();
        self.inner.search(embedding, filter, top_k).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

/// Hashing embeddings, but texts mentioning "poison" fail and texts
/// mentioning "slow" take longer.
struct Quirky(HashingEmbeddingProvider);

#[async_trait]
impl EmbeddingProvider for Quirky {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("slow") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if text.contains("poison") {
            return Err(RetrievalError::Embedding {
                provider: "quirky".into(),
                message: "refused".into(),
            });
        }
        self.0.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.0.dimensions()
    }
}

#[tokio::test]
async fn reupserting_the_same_document_is_idempotent() {
    let (pipeline, store) = pipeline();
    let text = "Rust ownership rules. Borrowing lets code use data without owning it. \
                Lifetimes tie references to scopes. Traits describe shared behaviour.";

    pipeline.upsert(vec![doc("guide", text, Source::File)]).await.unwrap();
    let first = store.count().await.unwrap();
    assert!(first > 1);

    pipeline.upsert(vec![doc("guide", text, Source::File)]).await.unwrap();
    assert_eq!(store.count().await.unwrap(), first);

    // A shorter revision leaves no chunks behind from the longer one.
    pipeline.upsert(vec![doc("guide", "Rust ownership rules.", Source::File)]).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn filtered_queries_only_return_matching_chunks() {
    let (pipeline, _) = pipeline();
    pipeline
        .upsert(vec![
            doc("m1", "quarterly budget review", Source::Email),
            doc("f1", "quarterly budget spreadsheet", Source::File),
            doc("c1", "budget chat about the quarter", Source::Chat),
            doc("m2", "holiday schedule", Source::Email),
        ])
        .await
        .unwrap();

    let filter = FilterPredicate::new().eq("source", Source::Email);
    let results = pipeline
        .query(vec![Query::new("quarterly budget").with_filter(filter).with_top_k(10)])
        .await
        .unwrap();
    let hits = &results[0].results;
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.chunk.metadata.source == Some(Source::Email)));
    assert_eq!(hits[0].chunk.document_id, "m1");
}

#[tokio::test]
async fn structured_filter_narrows_by_document_and_date() {
    let (pipeline, _) = pipeline();
    let mut early = doc("early", "release notes", Source::File);
    early.metadata.created_at = "2023-06-01T00:00:00Z".parse().ok();
    let mut late = doc("late", "release notes", Source::File);
    late.metadata.created_at = "2024-06-01T00:00:00Z".parse().ok();
    pipeline.upsert(vec![early, late]).await.unwrap();

    let filter: FilterPredicate = serde_json::from_str(r#"{"start_date": "2024-01-01"}"#).unwrap();
    let results =
        pipeline.query(vec![Query::new("release notes").with_filter(filter)]).await.unwrap();
    let ids: Vec<&str> = results[0].results.iter().map(|h| h.chunk.document_id.as_str()).collect();
    assert_eq!(ids, ["late"]);
}

#[tokio::test]
async fn delete_without_a_selector_never_reaches_the_store() {
    let store = Arc::new(CountingStore::default());
    let pipeline = pipeline_with(Arc::new(HashingEmbeddingProvider::default()), store.clone());

    let err = pipeline.delete(DeleteRequest::default()).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Validation(_)));
    assert_eq!(err.status_code(), 400);

    let empty = DeleteRequest { ids: Some(vec![]), filter: Some(FilterPredicate::new()), delete_all: false };
    assert!(pipeline.delete(empty).await.is_err());
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn delete_all_leaves_nothing_to_find() {
    let (pipeline, _) = pipeline();
    pipeline
        .upsert(vec![doc("a", "alpha", Source::Chat), doc("b", "beta", Source::File)])
        .await
        .unwrap();

    assert!(pipeline.delete(DeleteRequest::all()).await.unwrap());

    let results = pipeline.query(vec![Query::new("alpha").with_top_k(10)]).await.unwrap();
    assert!(results[0].results.is_empty());
    assert_eq!(pipeline.chunk_count().await.unwrap(), 0);
}

#[tokio::test]
async fn delete_all_wins_over_other_selectors() {
    let (pipeline, _) = pipeline();
    pipeline
        .upsert(vec![doc("a", "alpha", Source::Chat), doc("b", "beta", Source::File)])
        .await
        .unwrap();

    let request = DeleteRequest { ids: Some(vec!["a".into()]), filter: None, delete_all: true };
    pipeline.delete(request).await.unwrap();
    assert_eq!(pipeline.chunk_count().await.unwrap(), 0);
}

#[tokio::test]
async fn delete_by_filter_removes_only_matches() {
    let (pipeline, _) = pipeline();
    pipeline
        .upsert(vec![doc("a", "alpha", Source::Chat), doc("b", "beta", Source::File)])
        .await
        .unwrap();

    let request = DeleteRequest::filter(FilterPredicate::new().eq("source", Source::Chat));
    assert!(pipeline.delete(request).await.unwrap());

    let results = pipeline.query(vec![Query::new("alpha beta").with_top_k(10)]).await.unwrap();
    let ids: Vec<&str> = results[0].results.iter().map(|h| h.chunk.document_id.as_str()).collect();
    assert_eq!(ids, ["b"]);
}

#[tokio::test]
async fn upsert_returns_ids_in_input_order() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline =
        pipeline_with(Arc::new(Quirky(HashingEmbeddingProvider::default())), store.clone());

    // The first document is slower to embed, so the second finishes first.
    let ids = pipeline
        .upsert(vec![
            Document::new("a slow first document", DocumentMetadata::default()),
            Document::new("a quick second document", DocumentMetadata::default()),
        ])
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);

    for (id, word) in ids.iter().zip(["slow", "quick"]) {
        let filter = FilterPredicate::new().eq("document_id", id.as_str());
        let results = pipeline.query(vec![Query::new(word).with_filter(filter)]).await.unwrap();
        assert!(results[0].results[0].chunk.text.contains(word));
    }

    let explicit = pipeline
        .upsert(vec![
            doc("id1", "slow again", Source::File),
            doc("id2", "fast again", Source::File),
        ])
        .await
        .unwrap();
    assert_eq!(explicit, ["id1", "id2"]);
}

#[tokio::test]
async fn failed_documents_are_reported_and_not_written() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline =
        pipeline_with(Arc::new(Quirky(HashingEmbeddingProvider::default())), store.clone());

    let err = pipeline
        .upsert(vec![
            doc("good", "healthy text", Source::File),
            doc("bad", "poison text", Source::File),
            doc("fine", "more healthy text", Source::File),
        ])
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 207);
    let RetrievalError::PartialUpsert { succeeded, failed } = err else {
        panic!("expected a partial upsert");
    };
    assert_eq!(succeeded, ["good", "fine"]);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].index, 1);
    assert_eq!(failed[0].document_id, "bad");
    assert!(matches!(failed[0].error, RetrievalError::Embedding { .. }));
    assert_eq!(store.count().await.unwrap(), 2);

    let err = pipeline.upsert(vec![doc("bad", "poison", Source::File)]).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Embedding { .. }));
}

#[tokio::test]
async fn single_chunk_document_is_found_by_a_keyword() {
    let pipeline = RetrievalPipeline::builder()
        .config(RetrievalConfig::builder().chunk_size(512).build().unwrap())
        .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .build()
        .unwrap();

    let ids = pipeline
        .upsert(vec![Document::new(
            "A cat sat. A dog ran.",
            DocumentMetadata::with_source(Source::File),
        )])
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(pipeline.chunk_count().await.unwrap(), 1);

    let results = pipeline.query(vec![Query::new("cat").with_top_k(1)]).await.unwrap();
    let hits = &results[0].results;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.document_id, ids[0]);
    assert_eq!(hits[0].chunk.text, "A cat sat. A dog ran.");
    assert!(hits[0].score > 0.4, "score {}", hits[0].score);
}

#[tokio::test]
async fn deleted_documents_never_come_back() {
    let (pipeline, _) = pipeline();
    pipeline
        .upsert(vec![doc("a", "shared words here", Source::Chat), doc("b", "shared words too", Source::Chat)])
        .await
        .unwrap();

    pipeline.delete(DeleteRequest::ids(["a"])).await.unwrap();

    let results = pipeline.query(vec![Query::new("shared words").with_top_k(10)]).await.unwrap();
    assert!(!results[0].results.is_empty());
    assert!(results[0].results.iter().all(|h| h.chunk.document_id != "a"));
}

#[tokio::test]
async fn queries_return_in_input_order() {
    let (pipeline, _) = pipeline();
    pipeline
        .upsert(vec![doc("x", "xylophone music", Source::File), doc("z", "zebra stripes", Source::File)])
        .await
        .unwrap();

    let results = pipeline
        .query(vec![Query::new("zebra").with_top_k(1), Query::new("xylophone").with_top_k(1)])
        .await
        .unwrap();
    assert_eq!(results[0].query, "zebra");
    assert_eq!(results[0].results[0].chunk.document_id, "z");
    assert_eq!(results[1].results[0].chunk.document_id, "x");
}

#[tokio::test]
async fn upsert_file_parses_form_metadata() {
    let (pipeline, _) = pipeline();
    let id = pipeline
        .upsert_file("minutes of the board meeting", Some(r#"{"source": "email", "author": "ada"}"#))
        .await
        .unwrap();

    let filter = FilterPredicate::new().eq("author", "ada").eq("source", "email");
    let results = pipeline.query(vec![Query::new("board meeting").with_filter(filter)]).await.unwrap();
    assert_eq!(results[0].results[0].chunk.document_id, id);
}

#[tokio::test]
async fn snapshot_backend_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store_config =
        VectorStoreConfig::Snapshot { path: dir.path().join("index.json").display().to_string() };
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::default());

    let pipeline =
        RetrievalPipeline::connect(config(), &store_config, provider.clone()).await.unwrap();
    pipeline.upsert(vec![doc("kept", "persistent memory", Source::File)]).await.unwrap();
    drop(pipeline);

    let reopened = RetrievalPipeline::connect(config(), &store_config, provider).await.unwrap();
    let results = reopened.query(vec![Query::new("persistent")]).await.unwrap();
    assert_eq!(results[0].results[0].chunk.document_id, "kept");
}

#[tokio::test]
async fn upsert_that_cannot_be_persisted_is_not_visible() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("nested");
    std::fs::create_dir(&nested).unwrap();
    let store_config =
        VectorStoreConfig::Snapshot { path: nested.join("index.json").display().to_string() };
    let pipeline = RetrievalPipeline::connect(
        config(),
        &store_config,
        Arc::new(HashingEmbeddingProvider::default()),
    )
    .await
    .unwrap();
    std::fs::remove_dir_all(&nested).unwrap();

    let err = pipeline.upsert(vec![doc("d", "hello world", Source::Chat)]).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Index { .. }));
    assert_eq!(pipeline.chunk_count().await.unwrap(), 0);
    let results = pipeline.query(vec![Query::new("hello world")]).await.unwrap();
    assert!(results[0].results.is_empty());
}

#[tokio::test]
async fn chunks_carry_independent_metadata_copies() {
    let (pipeline, _) = pipeline();
    let metadata = DocumentMetadata {
        author: Some("ada".into()),
        ..DocumentMetadata::with_source(Source::File)
    };
    let text = "Compilers translate source code. Parsers build syntax trees from tokens. \
                Type checkers reject ill-formed programs. Code generators emit machine code.";
    pipeline.upsert(vec![Document::new(text, metadata).with_id("notes")]).await.unwrap();

    let by_doc = || {
        Query::new("code programs tokens")
            .with_top_k(10)
            .with_filter(FilterPredicate::new().eq("document_id", "notes"))
    };
    let mut first = pipeline.query(vec![by_doc()]).await.unwrap();
    let hits = &mut first[0].results;
    assert!(hits.len() > 1);
    hits[0].chunk.metadata.author = Some("mallory".into());
    hits[0].chunk.metadata.source = Some(Source::Chat);

    let again = pipeline.query(vec![by_doc()]).await.unwrap();
    assert_eq!(again[0].results.len(), hits.len());
    for hit in &again[0].results {
        assert_eq!(hit.chunk.metadata.author.as_deref(), Some("ada"));
        assert_eq!(hit.chunk.metadata.source, Some(Source::File));
    }
    assert_eq!(hits[1].chunk.metadata.author.as_deref(), Some("ada"));
}
