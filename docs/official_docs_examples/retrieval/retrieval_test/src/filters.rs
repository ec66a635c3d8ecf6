//! Retrieval doc-test — validates metadata filter examples from retrieval.md

use retrieval_core::{DocumentMetadata, FilterPredicate, Source};

fn main() {
    println!("=== Retrieval Filters Doc-Test ===\n");

    let metadata = DocumentMetadata {
        source: Some(Source::Email),
        author: Some("ada".into()),
        created_at: Some("2024-03-01T12:00:00Z".parse().expect("valid timestamp")),
        ..DocumentMetadata::default()
    };

    // From docs: Builder clauses combine with AND
    let filter = FilterPredicate::new()
        .one_of("source", vec![Source::Email, Source::Chat])
        .gte("created_at", "2024-01-01T00:00:00Z");
    assert!(filter.matches("mail-1", &metadata).expect("filter compiles"));
    println!("✓ Builder filter matches");

    // An empty filter matches every record
    assert!(FilterPredicate::new().matches("anything", &DocumentMetadata::default()).unwrap());
    println!("✓ Empty filter matches everything");

    // Absent fields never satisfy a condition
    let by_url = FilterPredicate::new().eq("url", "https://example.com");
    assert!(!by_url.matches("mail-1", &metadata).unwrap());
    println!("✓ Missing fields do not match");

    // From docs: The structured request filter
    let structured: FilterPredicate = serde_json::from_str(
        r#"{ "source": "email", "author": "ada", "end_date": "2024-12-31T23:59:59Z" }"#,
    )
    .expect("structured filter should deserialize");
    assert_eq!(structured.clauses().len(), 3);
    assert!(structured.matches("mail-1", &metadata).unwrap());
    println!("✓ Structured filter deserializes into clauses");

    // From docs: The clause-list filter
    let clauses: FilterPredicate = serde_json::from_str(
        r#"[{ "field": "document_id", "op": "in", "value": ["mail-1", "mail-2"] }]"#,
    )
    .expect("clause list should deserialize");
    assert!(clauses.matches("mail-1", &metadata).unwrap());
    assert!(!clauses.matches("mail-3", &metadata).unwrap());
    println!("✓ Clause-list filter works");

    // Invalid filters are rejected when compiled
    assert!(FilterPredicate::new().eq("colour", "blue").compile().is_err());
    assert!(FilterPredicate::new().eq("source", "fax").compile().is_err());
    assert!(FilterPredicate::new().gte("created_at", "yesterday").compile().is_err());
    assert!(FilterPredicate::new().one_of::<&str>("author", vec![]).compile().is_err());
    println!("✓ Invalid filters are rejected");

    println!("\n=== All filter tests passed! ===");
}
