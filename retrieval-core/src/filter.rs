//! Metadata filter predicates.
//!
//! A [`FilterPredicate`] is a conjunction of [`FilterClause`]s as received
//! from callers. Before use it is compiled into a [`CompiledFilter`], which
//! resolves field names, parses timestamps and sources, and rejects anything
//! it does not understand with [`RetrievalError::InvalidFilter`]. Unknown
//! fields are never silently ignored.
//!
//! Vector stores evaluate [`CompiledFilter::matches`] in memory, or translate
//! its [`Condition`]s into their native filter language.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{DocumentChunk, DocumentMetadata, Source};
use crate::error::{Result, RetrievalError};

/// Comparison operator of a [`FilterClause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
    In,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterOp::Eq => "eq",
            FilterOp::Gte => "gte",
            FilterOp::Lte => "lte",
            FilterOp::In => "in",
        };
        f.write_str(name)
    }
}

/// The right-hand side of a [`FilterClause`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Unix seconds, for timestamp fields.
    Integer(i64),
    Text(String),
    List(Vec<FilterValue>),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<Source> for FilterValue {
    fn from(value: Source) -> Self {
        FilterValue::Text(value.as_str().to_string())
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        FilterValue::Text(value.to_rfc3339())
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// One `field op value` constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// A conjunction of [`FilterClause`]s. An empty predicate matches everything.
///
/// Deserializes from either a clause list or the structured
/// [`DocumentMetadataFilter`] object; always serializes as a clause list.
///
/// # Example
///
/// ```rust
/// use retrieval_core::{FilterPredicate, Source};
///
/// let filter = FilterPredicate::new()
///     .one_of("source", vec![Source::Email, Source::Chat])
///     .gte("created_at", "2024-01-01T00:00:00Z");
/// assert!(filter.compile().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "FilterRepr", into = "Vec<FilterClause>")]
pub struct FilterPredicate {
    clauses: Vec<FilterClause>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterRepr {
    Clauses(Vec<FilterClause>),
    Metadata(DocumentMetadataFilter),
}

impl From<FilterRepr> for FilterPredicate {
    fn from(repr: FilterRepr) -> Self {
        match repr {
            FilterRepr::Clauses(clauses) => Self { clauses },
            FilterRepr::Metadata(filter) => filter.into(),
        }
    }
}

impl From<FilterPredicate> for Vec<FilterClause> {
    fn from(predicate: FilterPredicate) -> Self {
        predicate.clauses
    }
}

impl FilterPredicate {
    /// Create an empty predicate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a predicate from raw clauses.
    pub fn from_clauses(clauses: Vec<FilterClause>) -> Self {
        Self { clauses }
    }

    /// Add a clause.
    pub fn clause(mut self, field: &str, op: FilterOp, value: impl Into<FilterValue>) -> Self {
        self.clauses.push(FilterClause { field: field.to_string(), op, value: value.into() });
        self
    }

    /// Require `field == value`.
    pub fn eq(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.clause(field, FilterOp::Eq, value)
    }

    /// Require `field >= value`.
    pub fn gte(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.clause(field, FilterOp::Gte, value)
    }

    /// Require `field <= value`.
    pub fn lte(self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.clause(field, FilterOp::Lte, value)
    }

    /// Require `field` to equal one of `values`.
    pub fn one_of<T: Into<FilterValue>>(self, field: &str, values: Vec<T>) -> Self {
        self.clause(field, FilterOp::In, values)
    }

    /// The raw clauses.
    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    /// Whether the predicate has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Resolve and validate every clause.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::InvalidFilter`] for unknown fields, operators
    /// a field does not support, wrongly shaped values, unparsable timestamps,
    /// unknown sources, and empty `in` lists.
    pub fn compile(&self) -> Result<CompiledFilter> {
        let conditions =
            self.clauses.iter().map(compile_clause).collect::<Result<Vec<Condition>>>()?;
        Ok(CompiledFilter { conditions })
    }

    /// Compile and evaluate against a single record.
    pub fn matches(&self, document_id: &str, metadata: &DocumentMetadata) -> Result<bool> {
        Ok(self.compile()?.matches(document_id, metadata))
    }
}

/// The structured filter object of the original request contract.
///
/// Every set field becomes one clause; `start_date`/`end_date` bound
/// `created_at` inclusively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentMetadataFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl From<DocumentMetadataFilter> for FilterPredicate {
    fn from(filter: DocumentMetadataFilter) -> Self {
        let mut predicate = FilterPredicate::new();
        if let Some(id) = filter.document_id {
            predicate = predicate.eq("document_id", id);
        }
        if let Some(source) = filter.source {
            predicate = predicate.eq("source", source);
        }
        if let Some(source_id) = filter.source_id {
            predicate = predicate.eq("source_id", source_id);
        }
        if let Some(author) = filter.author {
            predicate = predicate.eq("author", author);
        }
        if let Some(start) = filter.start_date {
            predicate = predicate.gte("created_at", start);
        }
        if let Some(end) = filter.end_date {
            predicate = predicate.lte("created_at", end);
        }
        predicate
    }
}

/// A filterable record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataField {
    DocumentId,
    Source,
    SourceId,
    Url,
    Author,
    CreatedAt,
}

impl MetadataField {
    /// The field name used in clauses and in backend payloads/columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataField::DocumentId => "document_id",
            MetadataField::Source => "source",
            MetadataField::SourceId => "source_id",
            MetadataField::Url => "url",
            MetadataField::Author => "author",
            MetadataField::CreatedAt => "created_at",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        [
            MetadataField::DocumentId,
            MetadataField::Source,
            MetadataField::SourceId,
            MetadataField::Url,
            MetadataField::Author,
            MetadataField::CreatedAt,
        ]
        .into_iter()
        .find(|f| f.as_str() == name)
    }
}

/// A validated constraint, ready for evaluation or translation.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A string field equals one of `values`.
    TextIn { field: MetadataField, values: Vec<String> },
    /// `source` is one of the given sources.
    SourceIn(Vec<Source>),
    /// `created_at` equals one of the given instants.
    CreatedAtIn(Vec<DateTime<Utc>>),
    /// `created_at >= bound`.
    CreatedAtGte(DateTime<Utc>),
    /// `created_at <= bound`.
    CreatedAtLte(DateTime<Utc>),
}

impl Condition {
    fn matches(&self, document_id: &str, metadata: &DocumentMetadata) -> bool {
        match self {
            Condition::TextIn { field, values } => {
                let actual = match field {
                    MetadataField::DocumentId => Some(document_id),
                    MetadataField::SourceId => metadata.source_id.as_deref(),
                    MetadataField::Url => metadata.url.as_deref(),
                    MetadataField::Author => metadata.author.as_deref(),
                    MetadataField::Source | MetadataField::CreatedAt => None,
                };
                actual.is_some_and(|actual| values.iter().any(|v| v == actual))
            }
            Condition::SourceIn(sources) => {
                metadata.source.is_some_and(|source| sources.contains(&source))
            }
            Condition::CreatedAtIn(instants) => {
                metadata.created_at.is_some_and(|at| instants.contains(&at))
            }
            Condition::CreatedAtGte(bound) => metadata.created_at.is_some_and(|at| at >= *bound),
            Condition::CreatedAtLte(bound) => metadata.created_at.is_some_and(|at| at <= *bound),
        }
    }
}

/// A validated [`FilterPredicate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    conditions: Vec<Condition>,
}

impl CompiledFilter {
    /// A filter that matches every record.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// The validated conditions, all of which must hold.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Whether this filter matches every record.
    pub fn is_match_all(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a record. A field missing on the record fails its
    /// condition.
    pub fn matches(&self, document_id: &str, metadata: &DocumentMetadata) -> bool {
        self.conditions.iter().all(|c| c.matches(document_id, metadata))
    }

    /// Evaluate against a stored chunk.
    pub fn matches_chunk(&self, chunk: &DocumentChunk) -> bool {
        self.matches(&chunk.document_id, &chunk.metadata)
    }
}

fn compile_clause(clause: &FilterClause) -> Result<Condition> {
    let field = MetadataField::parse(&clause.field).ok_or_else(|| {
        RetrievalError::InvalidFilter(format!("unknown filter field '{}'", clause.field))
    })?;

    match (field, clause.op) {
        (MetadataField::CreatedAt, FilterOp::Gte) => {
            Ok(Condition::CreatedAtGte(parse_timestamp(scalar(clause)?)?))
        }
        (MetadataField::CreatedAt, FilterOp::Lte) => {
            Ok(Condition::CreatedAtLte(parse_timestamp(scalar(clause)?)?))
        }
        (_, FilterOp::Gte | FilterOp::Lte) => Err(RetrievalError::InvalidFilter(format!(
            "operator '{}' is only supported on 'created_at', not '{}'",
            clause.op, clause.field
        ))),
        (MetadataField::CreatedAt, _) => {
            let instants =
                operands(clause)?.into_iter().map(parse_timestamp).collect::<Result<_>>()?;
            Ok(Condition::CreatedAtIn(instants))
        }
        (MetadataField::Source, _) => {
            let sources = operands(clause)?
                .into_iter()
                .map(|value| {
                    let name = text(value, clause)?;
                    Source::parse(name).ok_or_else(|| {
                        RetrievalError::InvalidFilter(format!("unknown source '{name}'"))
                    })
                })
                .collect::<Result<_>>()?;
            Ok(Condition::SourceIn(sources))
        }
        (field, _) => {
            let values = operands(clause)?
                .into_iter()
                .map(|value| text(value, clause).map(str::to_string))
                .collect::<Result<_>>()?;
            Ok(Condition::TextIn { field, values })
        }
    }
}

/// The single operand of an `eq`/`gte`/`lte` clause.
fn scalar(clause: &FilterClause) -> Result<&FilterValue> {
    match &clause.value {
        FilterValue::List(_) => Err(RetrievalError::InvalidFilter(format!(
            "operator '{}' on '{}' takes a single value, not a list",
            clause.op, clause.field
        ))),
        value => Ok(value),
    }
}

/// The operands of an `eq` (one) or `in` (one or more) clause.
fn operands(clause: &FilterClause) -> Result<Vec<&FilterValue>> {
    match (clause.op, &clause.value) {
        (FilterOp::In, FilterValue::List(values)) if values.is_empty() => {
            Err(RetrievalError::InvalidFilter(format!(
                "'in' on '{}' needs at least one value",
                clause.field
            )))
        }
        (FilterOp::In, FilterValue::List(values)) => {
            if values.iter().any(|v| matches!(v, FilterValue::List(_))) {
                return Err(RetrievalError::InvalidFilter(format!(
                    "'in' on '{}' does not accept nested lists",
                    clause.field
                )));
            }
            Ok(values.iter().collect())
        }
        (FilterOp::In, _) => Err(RetrievalError::InvalidFilter(format!(
            "'in' on '{}' takes a list of values",
            clause.field
        ))),
        _ => Ok(vec![scalar(clause)?]),
    }
}

fn text<'a>(value: &'a FilterValue, clause: &FilterClause) -> Result<&'a str> {
    match value {
        FilterValue::Text(s) => Ok(s),
        _ => Err(RetrievalError::InvalidFilter(format!(
            "field '{}' takes string values",
            clause.field
        ))),
    }
}

/// Accepts RFC 3339, a bare `YYYY-MM-DD` date (midnight UTC), or Unix seconds.
fn parse_timestamp(value: &FilterValue) -> Result<DateTime<Utc>> {
    match value {
        FilterValue::Integer(secs) => DateTime::<Utc>::from_timestamp(*secs, 0).ok_or_else(|| {
            RetrievalError::InvalidFilter(format!("timestamp {secs} is out of range"))
        }),
        FilterValue::Text(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| naive.and_utc())
                    .ok_or(())
            })
            .map_err(|_| RetrievalError::InvalidFilter(format!("unparsable timestamp '{s}'"))),
        FilterValue::List(_) => {
            Err(RetrievalError::InvalidFilter("timestamp must be a single value".to_string()))
        }
    }
}
