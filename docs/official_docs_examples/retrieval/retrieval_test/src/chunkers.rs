//! Retrieval doc-test — validates chunker examples from retrieval.md

use retrieval_core::{
    Chunker, ChunkingStrategy, Document, FixedSizeChunker, RecursiveChunker, RetrievalConfig,
    chunk_id, chunker_for,
};

fn sample_doc() -> Document {
    Document::new(
        "First paragraph about Rust programming.\n\n\
         Second paragraph about memory safety. Rust prevents dangling pointers.\n\n\
         Third paragraph about async. Tokio is the most popular runtime.",
        Default::default(),
    )
    .with_id("test")
}

fn main() {
    println!("=== Retrieval Chunkers Doc-Test ===\n");

    // From docs: FixedSizeChunker
    let chunker = FixedSizeChunker::new(64, 16);
    let chunks = chunker.chunk(&sample_doc());
    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.ordinal, i);
        assert!(!chunk.text.trim().is_empty());
        assert!(chunk.text.chars().count() <= 64);
    }
    println!("✓ FixedSizeChunker works — {} chunks", chunks.len());

    // From docs: RecursiveChunker keeps paragraphs together when they fit
    let chunker = RecursiveChunker::new(100, 0);
    let chunks = chunker.chunk(&sample_doc());
    assert!(chunks.len() >= 3);
    assert!(chunks[0].text.starts_with("First paragraph"));
    for chunk in &chunks {
        assert!(chunk.text.chars().count() <= 100);
    }
    println!("✓ RecursiveChunker works — {} chunks", chunks.len());

    // Chunking is deterministic, which keeps re-upserts idempotent
    assert_eq!(chunker.chunk(&sample_doc()), chunks);
    println!("✓ Chunking is deterministic");

    // From docs: chunker_for picks the configured strategy
    let config = RetrievalConfig::builder()
        .chunk_size(64)
        .chunk_overlap(16)
        .chunking(ChunkingStrategy::Fixed)
        .build()
        .expect("valid config should build");
    let from_config = chunker_for(&config).chunk(&sample_doc());
    assert_eq!(from_config, FixedSizeChunker::new(64, 16).chunk(&sample_doc()));
    println!("✓ chunker_for honours the configured strategy");

    // Chunk IDs follow the document_id_ordinal pattern
    assert_eq!(chunk_id("test", 0), "test_0");
    assert_eq!(chunk_id("test", 12), "test_12");
    println!("✓ Chunk IDs follow expected pattern");

    // Empty and whitespace-only documents produce no chunks
    let empty = Document::new("", Default::default());
    let blank = Document::new(" \n\n\t ", Default::default());
    assert!(FixedSizeChunker::new(100, 10).chunk(&empty).is_empty());
    assert!(RecursiveChunker::new(100, 10).chunk(&empty).is_empty());
    assert!(FixedSizeChunker::new(100, 10).chunk(&blank).is_empty());
    assert!(RecursiveChunker::new(100, 10).chunk(&blank).is_empty());
    println!("✓ Empty documents produce no chunks");

    println!("\n=== All chunker tests passed! ===");
}
