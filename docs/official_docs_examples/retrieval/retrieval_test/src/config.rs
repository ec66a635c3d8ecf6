//! Retrieval doc-test — validates config examples from retrieval.md

use retrieval_core::{
    ChunkingStrategy, EmbeddingRetryPolicy, RetrievalConfig, VectorStoreConfig,
};

fn main() {
    println!("=== Retrieval Config Doc-Test ===\n");

    // From docs: Builder with custom values
    let config = RetrievalConfig::builder()
        .chunk_size(256)
        .chunk_overlap(50)
        .chunking(ChunkingStrategy::Fixed)
        .default_top_k(5)
        .similarity_threshold(0.5)
        .build()
        .expect("valid config should build");

    assert_eq!(config.chunk_size, 256);
    assert_eq!(config.chunk_overlap, 50);
    assert_eq!(config.chunking, ChunkingStrategy::Fixed);
    assert_eq!(config.default_top_k, 5);
    assert_eq!(config.similarity_threshold, Some(0.5));
    println!("✓ Config builder with custom values works");

    // From docs: Default config
    let default = RetrievalConfig::default();
    assert_eq!(default.chunk_size, 512);
    assert_eq!(default.chunk_overlap, 100);
    assert_eq!(default.default_top_k, 3);
    assert_eq!(default.max_top_k, 100);
    assert_eq!(default.similarity_threshold, None);
    assert_eq!(default.embedding_retry, EmbeddingRetryPolicy::default());
    println!("✓ Default config has expected values");

    // From docs: Config loads from JSON with defaults for missing fields
    let from_json: RetrievalConfig =
        serde_json::from_str(r#"{ "chunk_size": 200, "chunking": "fixed" }"#)
            .expect("partial config should deserialize");
    assert_eq!(from_json.chunk_size, 200);
    assert_eq!(from_json.chunking, ChunkingStrategy::Fixed);
    assert_eq!(from_json.chunk_overlap, 100);
    println!("✓ Partial JSON config falls back to defaults");

    // Validation: overlap must be less than chunk_size
    let result = RetrievalConfig::builder().chunk_size(100).chunk_overlap(100).build();
    assert!(result.is_err());
    println!("✓ Rejects overlap >= chunk_size");

    // Validation: default_top_k must be within 1..=max_top_k
    assert!(RetrievalConfig::builder().default_top_k(0).build().is_err());
    assert!(RetrievalConfig::builder().default_top_k(20).max_top_k(10).build().is_err());
    println!("✓ Rejects default_top_k outside 1..=max_top_k");

    // From docs: Vector store selection
    let store: VectorStoreConfig =
        serde_json::from_str(r#"{ "backend": "snapshot", "path": "/tmp/store.json" }"#)
            .expect("store config should deserialize");
    assert_eq!(store, VectorStoreConfig::Snapshot { path: "/tmp/store.json".into() });
    assert_eq!(VectorStoreConfig::default(), VectorStoreConfig::Memory);
    println!("✓ Vector store config deserializes by backend tag");

    println!("\n=== All config tests passed! ===");
}
