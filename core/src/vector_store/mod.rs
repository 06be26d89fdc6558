//! Filtered vector index.
//!
//! A [`Collection`] is a named set of documents and their embeddings with an
//! explicit lifecycle ([`CollectionState`]). Searches run against immutable
//! snapshots, so a search racing a recreate sees either the old or the new
//! contents, never a partially dropped collection. [`VectorDb`] hands out
//! collections persisted under a filesystem root.

mod collection;
mod db;
mod persist;

pub use collection::Collection;
pub use db::VectorDb;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use thiserror::Error;

use crate::document::{Document, Metadata, MetadataValue, SourceKind, SOURCE_KIND_KEY};
use crate::embeddings::embedding::Embedding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionState {
    Uninitialized,
    Ready,
    Rebuilding,
    Destroyed,
}

impl Display for CollectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Rebuilding => "rebuilding",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VectorStoreError {
    #[error("Id `{0}` is already present")]
    IdConflict(String),
    #[error("Got {documents} documents, {embeddings} embeddings and {ids} ids")]
    LengthMismatch {
        documents: usize,
        embeddings: usize,
        ids: usize,
    },
    #[error("Id `{id}` does not match the document's source id `{source_id}`")]
    IdMismatch { id: String, source_id: String },
    #[error("Expected vectors of dimension {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("top_k must be a positive integer")]
    InvalidTopK,
    #[error("Invalid collection name `{0}`")]
    InvalidCollectionName(String),
    #[error("Collection is {0}")]
    NotReady(CollectionState),
    #[error("Index unavailable: {0}")]
    Unavailable(String),
}

/// Conjunction of metadata equality constraints.
///
/// ```rust
/// use nutrirag::document::SourceKind;
/// use nutrirag::vector_store::Filter;
///
/// let filter = Filter::source_kind(SourceKind::Nutrition).eq("Food", "Apple");
/// assert_eq!(filter.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    constraints: BTreeMap<String, MetadataValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only documents of the given source kind
    pub fn source_kind(kind: SourceKind) -> Self {
        Self::new().eq(SOURCE_KIND_KEY, kind.as_str())
    }

    /// Adds a `key == value` constraint, replacing any previous one on `key`.
    #[must_use]
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// True when every constraint holds; a key missing from `metadata` fails.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.constraints.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .is_some_and(|actual| actual.matches(expected))
        })
    }
}

impl From<Metadata> for Filter {
    fn from(constraints: Metadata) -> Self {
        Self { constraints }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Cosine similarity, higher is better. `None` when the index cannot report it.
    pub score: Option<f64>,
}

/// Hits ordered best match first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> {
        self.hits.iter()
    }
}

impl IntoIterator for SearchResult {
    type Item = SearchHit;
    type IntoIter = std::vec::IntoIter<SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    async fn state(&self) -> CollectionState;

    /// `Uninitialized -> Ready`; a no-op on a ready collection.
    async fn create(&self) -> Result<(), VectorStoreError>;

    /// Drops every document and embedding, `Ready -> Rebuilding -> Ready`.
    async fn recreate(&self) -> Result<(), VectorStoreError>;

    /// Terminal.
    async fn destroy(&self) -> Result<(), VectorStoreError>;

    /// Inserts documents under `ids`; documents are searchable once this returns.
    ///
    /// # Errors
    /// Lengths must agree and every id must be new, both within the call and
    /// against the collection, otherwise nothing is inserted.
    async fn insert(
        &self,
        documents: Vec<Document>,
        embeddings: Vec<Vec<f64>>,
        ids: Vec<String>,
    ) -> Result<(), VectorStoreError>;

    /// At most `top_k` documents passing `filter`, most similar first.
    async fn search(
        &self,
        query: &[f64],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<SearchResult, VectorStoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Embedding>, VectorStoreError>;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Cosine similarity of two vectors; 0 when either has zero magnitude.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub(crate) fn validate_collection_name(name: &str) -> Result<(), VectorStoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(VectorStoreError::InvalidCollectionName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-12);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_filter_matches_conjunction() {
        let metadata = Metadata::from([
            (SOURCE_KIND_KEY.to_string(), "nutrition".into()),
            ("Calories".to_string(), MetadataValue::Integer(95)),
        ]);
        assert!(Filter::new().matches(&metadata));
        assert!(Filter::source_kind(SourceKind::Nutrition).matches(&metadata));
        assert!(Filter::source_kind(SourceKind::Nutrition)
            .eq("Calories", 95.0)
            .matches(&metadata));
        assert!(!Filter::source_kind(SourceKind::Chat).matches(&metadata));
        assert!(!Filter::new().eq("Protein", 1i64).matches(&metadata));
    }

    #[test]
    fn test_filter_from_json() {
        let filter: Filter = serde_json::from_str(r#"{"source_kind": "profile"}"#).unwrap();
        assert_eq!(filter, Filter::source_kind(SourceKind::Profile));
    }

    #[test]
    fn test_collection_names() {
        assert!(validate_collection_name("nutrition_assistant-2").is_ok());
        for name in ["", "a b", "../x", "x.json"] {
            assert!(validate_collection_name(name).is_err(), "{name}");
        }
    }
}
