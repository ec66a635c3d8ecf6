//! Request and response bodies for the upsert, query, and delete endpoints.
//!
//! These mirror the JSON contract of the HTTP layer so that it can hand
//! deserialized bodies straight to [`RetrievalPipeline`](crate::RetrievalPipeline).

use serde::{Deserialize, Serialize};

use crate::document::{Document, Query, QueryResult};
use crate::filter::FilterPredicate;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpsertRequest {
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpsertResponse {
    /// Document IDs in request order.
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    pub queries: Vec<Query>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    /// One result per query, in request order.
    pub results: Vec<QueryResult>,
}

/// Which records to delete.
///
/// At least one selector must be present: a non-empty `ids` list, a
/// non-empty `filter`, or `delete_all: true`. When several are given,
/// `delete_all` wins over `filter`, which wins over `ids`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeleteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterPredicate>,
    #[serde(default)]
    pub delete_all: bool,
}

impl DeleteRequest {
    /// Delete the given documents.
    pub fn ids(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { ids: Some(ids.into_iter().map(Into::into).collect()), ..Self::default() }
    }

    /// Delete every chunk matching `filter`.
    pub fn filter(filter: FilterPredicate) -> Self {
        Self { filter: Some(filter), ..Self::default() }
    }

    /// Delete everything.
    pub fn all() -> Self {
        Self { delete_all: true, ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResponse {
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Source;

    #[test]
    fn delete_request_accepts_structured_filter() {
        let request: DeleteRequest = serde_json::from_str(
            r#"{"filter": {"source": "chat", "author": "ada"}, "delete_all": false}"#,
        )
        .unwrap();
        let filter = request.filter.unwrap();
        let compiled = filter.compile().unwrap();
        let meta = crate::document::DocumentMetadata {
            source: Some(Source::Chat),
            author: Some("ada".into()),
            ..Default::default()
        };
        assert!(compiled.matches("doc", &meta));
        assert!(request.ids.is_none());
    }

    #[test]
    fn delete_request_defaults_to_no_selector() {
        let request: DeleteRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, DeleteRequest::default());
    }

    #[test]
    fn upsert_request_parses_documents() {
        let request: UpsertRequest = serde_json::from_str(
            r#"{"documents": [{"id": "a", "text": "hello", "metadata": {"source": "file"}},
                              {"text": "no id"}]}"#,
        )
        .unwrap();
        assert_eq!(request.documents.len(), 2);
        assert_eq!(request.documents[0].id.as_deref(), Some("a"));
        assert!(request.documents[1].id.is_none());
    }
}
