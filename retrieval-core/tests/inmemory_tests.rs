//! Property tests for in-memory vector store search ordering and filtering.

use std::collections::HashSet;

use proptest::prelude::*;
use retrieval_core::document::{DocumentChunk, DocumentMetadata, Source};
use retrieval_core::filter::FilterPredicate;
use retrieval_core::inmemory::InMemoryVectorStore;
use retrieval_core::vectorstore::VectorStore;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn arb_metadata() -> impl Strategy<Value = DocumentMetadata> {
    (
        proptest::option::of(proptest::sample::select(Source::ALL.to_vec())),
        proptest::option::of(proptest::sample::select(vec!["ada", "grace", "linus"])),
    )
        .prop_map(|(source, author)| DocumentMetadata {
            source,
            author: author.map(str::to_string),
            ..DocumentMetadata::default()
        })
}

/// Generate a chunk with a normalized embedding and random metadata.
fn arb_chunk(dim: usize) -> impl Strategy<Value = DocumentChunk> {
    ("[a-z]{3,8}", "[a-z ]{5,30}", arb_normalized_embedding(dim), arb_metadata()).prop_map(
        |(document_id, text, embedding, metadata)| DocumentChunk {
            id: format!("{document_id}_0"),
            document_id,
            text,
            embedding,
            metadata,
        },
    )
}

/// Keep the first chunk per ID so that writes do not overwrite each other.
fn dedup(chunks: Vec<DocumentChunk>) -> Vec<DocumentChunk> {
    let mut seen = HashSet::new();
    chunks.into_iter().filter(|c| seen.insert(c.id.clone())).collect()
}

/// Searching SHALL return results ordered by descending cosine similarity,
/// and at most `top_k` of them.
mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let unique_chunks = dedup(chunks);
            let unique_count = unique_chunks.len();

            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.write(&unique_chunks).await.unwrap();
                store.search(&query, None, top_k).await.unwrap()
            });

            // Result count is at most top_k and at most the number of stored chunks
            prop_assert_eq!(results.len(), top_k.min(unique_count));

            // Results are ordered by descending score
            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }
    }
}

/// Every result SHALL satisfy the filter, and the filter SHALL be applied
/// before truncation: a search returns `min(top_k, matching)` results.
mod prop_inmemory_filter_correctness {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_satisfy_filter_and_fill_top_k(
            chunks in proptest::collection::vec(arb_chunk(DIM), 1..30),
            query in arb_normalized_embedding(DIM),
            source in proptest::sample::select(Source::ALL.to_vec()),
            authors in proptest::sample::subsequence(vec!["ada", "grace", "linus"], 1..=3),
            top_k in 1usize..10,
        ) {
            let unique_chunks = dedup(chunks);
            let predicate = FilterPredicate::new()
                .eq("source", source)
                .one_of("author", authors.clone());
            let filter = predicate.compile().unwrap();
            let matching = unique_chunks.iter().filter(|c| filter.matches_chunk(c)).count();

            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.write(&unique_chunks).await.unwrap();
                store.search(&query, Some(&filter), top_k).await.unwrap()
            });

            prop_assert_eq!(results.len(), top_k.min(matching));
            for hit in &results {
                let meta = &hit.chunk.metadata;
                prop_assert_eq!(meta.source, Some(source));
                let author = meta.author.as_deref().unwrap_or_default();
                prop_assert!(authors.contains(&author));
            }
        }
    }
}

#[tokio::test]
async fn equal_scores_return_in_insertion_order() {
    let store = InMemoryVectorStore::new();
    for (i, id) in ["first", "second", "third", "fourth"].into_iter().enumerate() {
        let chunk = DocumentChunk {
            id: format!("{id}_0"),
            document_id: id.to_string(),
            text: format!("passage {i}"),
            embedding: vec![0.0, 1.0, 0.0],
            metadata: DocumentMetadata::default(),
        };
        store.write(&[chunk]).await.unwrap();
    }

    let hits = store.search(&[0.0, 1.0, 0.0], None, 3).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.chunk.document_id.as_str()).collect();
    assert_eq!(ids, ["first", "second", "third"]);
}
