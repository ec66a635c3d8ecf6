//! Retrieval doc-test — validates pipeline examples from retrieval.md

use std::sync::Arc;

use retrieval_core::{
    DeleteRequest, Document, DocumentMetadata, EmbeddingProvider, FilterPredicate,
    HashingEmbeddingProvider, InMemoryVectorStore, Query, RetrievalConfig, RetrievalPipeline,
    Source, VectorStoreConfig,
};
use tracing_subscriber::EnvFilter;

/// Embeds by text length so that scores are easy to reason about.
struct LengthEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for LengthEmbedder {
    async fn embed(&self, text: &str) -> retrieval_core::Result<Vec<f32>> {
        let len = text.len() as f32;
        Ok(vec![1.0, len / 100.0])
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "length"
    }
}

fn email(id: &str, text: &str, author: &str) -> Document {
    let metadata = DocumentMetadata {
        author: Some(author.into()),
        ..DocumentMetadata::with_source(Source::Email)
    };
    Document::new(text, metadata).with_id(id)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    println!("=== Retrieval Pipeline Doc-Test ===\n");

    // From docs: Build a pipeline
    let pipeline = RetrievalPipeline::builder()
        .config(RetrievalConfig::builder().chunk_size(256).chunk_overlap(50).build()?)
        .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .build()?;
    println!("✓ Pipeline builder works");

    // From docs: Upsert documents
    let ids = pipeline
        .upsert(vec![
            email("launch", "The launch is planned for next Tuesday.", "ada"),
            email("budget", "The budget review moved to Friday.", "grace"),
            Document::new("Chat about the cat sitting on the mat.", Default::default()),
        ])
        .await?;
    assert_eq!(&ids[..2], ["launch", "budget"]);
    assert!(!ids[2].is_empty());
    println!("✓ upsert works — ids {ids:?}");

    // Re-upserting the same document is idempotent
    let before = pipeline.chunk_count().await?;
    pipeline.upsert(vec![email("launch", "The launch is planned for next Tuesday.", "ada")]).await?;
    assert_eq!(pipeline.chunk_count().await?, before);
    println!("✓ Re-upsert replaces instead of duplicating");

    // From docs: Query with a filter
    let results = pipeline
        .query(vec![
            Query::new("when is the launch").with_top_k(2),
            Query::new("review").with_filter(FilterPredicate::new().eq("author", "grace")),
        ])
        .await?;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].query, "when is the launch");
    assert!(results[0].results.len() <= 2);
    for hit in &results[0].results {
        assert!(hit.score.is_finite());
        assert!(hit.chunk.embedding.is_empty());
    }
    assert!(results[1].results.iter().all(|h| h.chunk.document_id == "budget"));
    println!("✓ query works — {} result sets", results.len());

    // From docs: Upload a file
    let file_id = pipeline.upsert_file("Quarterly numbers.", Some("not json")).await?;
    let files = pipeline
        .query(vec![Query::new("numbers").with_filter(FilterPredicate::new().eq("source", "file"))])
        .await?;
    assert_eq!(files[0].results[0].chunk.document_id, file_id);
    println!("✓ upsert_file tags unparseable metadata as source=file");

    // From docs: Delete by filter, then by id
    let by_author = FilterPredicate::new().eq("author", "grace");
    assert!(pipeline.delete(DeleteRequest::filter(by_author)).await?);
    assert!(pipeline.delete(DeleteRequest::ids(["launch"])).await?);
    let remaining = pipeline.query(vec![Query::new("launch budget").with_top_k(10)]).await?;
    let gone = ["launch", "budget"];
    assert!(remaining[0].results.iter().all(|h| !gone.contains(&h.chunk.document_id.as_str())));
    println!("✓ delete by filter and by id works");

    // An empty delete request is rejected
    assert!(pipeline.delete(DeleteRequest::default()).await.is_err());
    println!("✓ Empty delete request is rejected");

    // From docs: Delete everything
    assert!(pipeline.delete(DeleteRequest::all()).await?);
    assert_eq!(pipeline.chunk_count().await?, 0);
    println!("✓ delete_all empties the store");

    // From docs: Select the store from configuration
    let pipeline = RetrievalPipeline::connect(
        RetrievalConfig::default(),
        &VectorStoreConfig::Memory,
        Arc::new(LengthEmbedder),
    )
    .await?;
    assert_eq!(pipeline.vector_store().backend(), "InMemory");
    assert_eq!(pipeline.embedding_provider().name(), "length");
    pipeline.upsert(vec![Document::new("short", Default::default()).with_id("s")]).await?;
    let hits = pipeline.query(vec![Query::new("tiny")]).await?;
    assert_eq!(hits[0].results[0].chunk.document_id, "s");
    println!("✓ connect builds the configured store");

    println!("\n=== All pipeline tests passed! ===");
    Ok(())
}
