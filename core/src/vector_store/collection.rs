use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::persist::{Snapshot, SnapshotFile};
use super::{
    cosine_similarity, validate_collection_name, CollectionState, Filter, SearchHit, SearchResult,
    VectorStore, VectorStoreError,
};
use crate::document::Document;
use crate::embeddings::embedding::Embedding;

/// Immutable contents of a collection at one point in time
#[derive(Debug, Default)]
struct Records {
    dimension: Option<usize>,
    entries: BTreeMap<String, Arc<Embedding>>,
}

impl Records {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            dimension: snapshot.dimension,
            entries: snapshot
                .entries
                .into_iter()
                .map(|e| (e.id.clone(), Arc::new(e)))
                .collect(),
        }
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            dimension: self.dimension,
            entries: self.entries.values().map(|e| (**e).clone()).collect(),
        }
    }
}

struct Inner {
    state: CollectionState,
    records: Arc<Records>,
}

/// A named collection of embedded documents.
///
/// Writers (insert, create, recreate, destroy) are serialized by a per-collection
/// gate and publish a whole new [`Records`] snapshot when done. Readers clone the
/// current snapshot and never wait on a writer's work.
///
/// Each insert copies the id map of the current snapshot (entries themselves are
/// shared) and, for a persisted collection, rewrites the whole snapshot file.
/// Writes therefore cost time linear in the collection size, which suits
/// corpora of a few thousand documents indexed in batches, not a stream of
/// single-document inserts.
pub struct Collection {
    name: String,
    write_gate: Mutex<()>,
    inner: RwLock<Inner>,
    snapshot_file: Option<SnapshotFile>,
}

impl Collection {
    /// A collection living only in memory.
    ///
    /// # Errors
    /// Fails if `name` is not made of ASCII letters, digits, `_` and `-`.
    pub fn in_memory(name: impl Into<String>) -> Result<Self, VectorStoreError> {
        let name = name.into();
        validate_collection_name(&name)?;
        Ok(Self {
            name,
            write_gate: Mutex::new(()),
            inner: RwLock::new(Inner {
                state: CollectionState::Uninitialized,
                records: Arc::default(),
            }),
            snapshot_file: None,
        })
    }

    /// A collection persisted under `root`. A previously persisted snapshot is
    /// loaded and the collection starts out ready.
    pub async fn open(root: &Path, name: impl Into<String>) -> Result<Self, VectorStoreError> {
        let mut collection = Self::in_memory(name)?;
        let file = SnapshotFile::new(root, &collection.name);
        if let Some(snapshot) = file.load().await? {
            let records = Records::from_snapshot(snapshot);
            info!(
                collection = %collection.name,
                documents = records.entries.len(),
                "loaded persisted collection"
            );
            collection.inner = RwLock::new(Inner {
                state: CollectionState::Ready,
                records: Arc::new(records),
            });
        }
        collection.snapshot_file = Some(file);
        Ok(collection)
    }

    async fn snapshot(&self) -> (CollectionState, Arc<Records>) {
        let inner = self.inner.read().await;
        (inner.state, Arc::clone(&inner.records))
    }

    async fn persist(&self, records: &Records) -> Result<(), VectorStoreError> {
        match &self.snapshot_file {
            Some(file) => file.store(&records.to_snapshot()).await,
            None => Ok(()),
        }
    }

    async fn publish(&self, state: CollectionState, records: Records) {
        let mut inner = self.inner.write().await;
        inner.state = state;
        inner.records = Arc::new(records);
    }

    fn validate_insert(
        records: &Records,
        documents: &[Document],
        embeddings: &[Vec<f64>],
        ids: &[String],
    ) -> Result<Option<usize>, VectorStoreError> {
        if documents.len() != embeddings.len() || documents.len() != ids.len() {
            return Err(VectorStoreError::LengthMismatch {
                documents: documents.len(),
                embeddings: embeddings.len(),
                ids: ids.len(),
            });
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for (id, document) in ids.iter().zip(documents) {
            if id != document.source_id() {
                return Err(VectorStoreError::IdMismatch {
                    id: id.clone(),
                    source_id: document.source_id().to_string(),
                });
            }
            if !seen.insert(id.as_str()) || records.entries.contains_key(id) {
                return Err(VectorStoreError::IdConflict(id.clone()));
            }
        }
        let mut dimension = records.dimension;
        for embedding in embeddings {
            let expected = *dimension.get_or_insert(embedding.len());
            if embedding.is_empty() || embedding.len() != expected {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    got: embedding.len(),
                });
            }
        }
        Ok(dimension)
    }
}

#[async_trait]
impl VectorStore for Collection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn state(&self) -> CollectionState {
        self.inner.read().await.state
    }

    async fn create(&self) -> Result<(), VectorStoreError> {
        let _gate = self.write_gate.lock().await;
        match self.state().await {
            CollectionState::Ready => Ok(()),
            CollectionState::Destroyed => Err(VectorStoreError::NotReady(CollectionState::Destroyed)),
            _ => {
                let records = Records::default();
                self.persist(&records).await?;
                self.publish(CollectionState::Ready, records).await;
                info!(collection = %self.name, "created collection");
                Ok(())
            }
        }
    }

    async fn recreate(&self) -> Result<(), VectorStoreError> {
        let _gate = self.write_gate.lock().await;
        let previous = {
            let mut inner = self.inner.write().await;
            if inner.state == CollectionState::Destroyed {
                return Err(VectorStoreError::NotReady(CollectionState::Destroyed));
            }
            std::mem::replace(&mut inner.state, CollectionState::Rebuilding)
        };

        let records = Records::default();
        if let Err(e) = self.persist(&records).await {
            self.inner.write().await.state = previous;
            warn!(collection = %self.name, error = %e, "failed to recreate collection");
            return Err(e);
        }
        self.publish(CollectionState::Ready, records).await;
        info!(collection = %self.name, "recreated collection");
        Ok(())
    }

    async fn destroy(&self) -> Result<(), VectorStoreError> {
        let _gate = self.write_gate.lock().await;
        if let Some(file) = &self.snapshot_file {
            file.remove().await?;
        }
        self.publish(CollectionState::Destroyed, Records::default()).await;
        info!(collection = %self.name, "destroyed collection");
        Ok(())
    }

    async fn insert(
        &self,
        documents: Vec<Document>,
        embeddings: Vec<Vec<f64>>,
        ids: Vec<String>,
    ) -> Result<(), VectorStoreError> {
        let _gate = self.write_gate.lock().await;
        let (state, current) = self.snapshot().await;
        if state != CollectionState::Ready {
            return Err(VectorStoreError::NotReady(state));
        }
        let dimension = Self::validate_insert(&current, &documents, &embeddings, &ids)
            .inspect_err(|e| {
                warn!(collection = %self.name, count = documents.len(), error = %e, "rejected insert");
            })?;
        if documents.is_empty() {
            return Ok(());
        }

        let count = documents.len();
        let mut entries = current.entries.clone();
        for ((id, embedded_data), document) in ids.into_iter().zip(embeddings).zip(documents) {
            entries.insert(
                id.clone(),
                Arc::new(Embedding {
                    id,
                    embedded_data,
                    document,
                }),
            );
        }
        let records = Records { dimension, entries };
        self.persist(&records).await?;
        self.publish(CollectionState::Ready, records).await;
        debug!(collection = %self.name, count, "inserted documents");
        Ok(())
    }

    async fn search(
        &self,
        query: &[f64],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<SearchResult, VectorStoreError> {
        if top_k == 0 {
            return Err(VectorStoreError::InvalidTopK);
        }
        let (state, records) = self.snapshot().await;
        if matches!(state, CollectionState::Uninitialized | CollectionState::Destroyed)
            || records.entries.is_empty()
        {
            return Ok(SearchResult::default());
        }
        if let Some(expected) = records.dimension {
            if query.len() != expected {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        }

        let mut scored: Vec<(f64, &Embedding)> = records
            .entries
            .values()
            .filter(|e| filter.map_or(true, |f| f.matches(e.document.metadata())))
            .map(|e| (cosine_similarity(query, &e.embedded_data), e.as_ref()))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(top_k);

        Ok(SearchResult {
            hits: scored
                .into_iter()
                .map(|(score, e)| SearchHit {
                    id: e.id.clone(),
                    text: e.document.text().to_string(),
                    metadata: e.document.metadata().clone(),
                    score: Some(score),
                })
                .collect(),
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Embedding>, VectorStoreError> {
        let (_, records) = self.snapshot().await;
        Ok(records.entries.get(id).map(|e| (**e).clone()))
    }

    async fn len(&self) -> usize {
        self.snapshot().await.1.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Metadata, SourceKind};

    fn doc(kind: SourceKind, id: &str, text: &str) -> Document {
        Document::new(kind, id, text, Metadata::new()).unwrap()
    }

    fn batch(items: &[(SourceKind, &str, Vec<f64>)]) -> (Vec<Document>, Vec<Vec<f64>>, Vec<String>) {
        let documents = items
            .iter()
            .map(|(kind, id, _)| doc(*kind, id, &format!("text of {id}")))
            .collect();
        let embeddings = items.iter().map(|(_, _, v)| v.clone()).collect();
        let ids = items.iter().map(|(_, id, _)| (*id).to_string()).collect();
        (documents, embeddings, ids)
    }

    async fn ready() -> Collection {
        let collection = Collection::in_memory("test").unwrap();
        collection.create().await.unwrap();
        collection
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let collection = Collection::in_memory("test").unwrap();
        assert_eq!(collection.state().await, CollectionState::Uninitialized);
        assert!(collection.search(&[1.0], 3, None).await.unwrap().is_empty());
        let (d, e, i) = batch(&[(SourceKind::Chat, "a", vec![1.0])]);
        assert_eq!(
            collection.insert(d, e, i).await,
            Err(VectorStoreError::NotReady(CollectionState::Uninitialized))
        );

        collection.create().await.unwrap();
        assert_eq!(collection.state().await, CollectionState::Ready);
        collection.recreate().await.unwrap();
        assert_eq!(collection.state().await, CollectionState::Ready);

        collection.destroy().await.unwrap();
        assert_eq!(collection.state().await, CollectionState::Destroyed);
        assert!(collection.search(&[1.0], 3, None).await.unwrap().is_empty());
        assert_eq!(
            collection.recreate().await,
            Err(VectorStoreError::NotReady(CollectionState::Destroyed))
        );
    }

    #[tokio::test]
    async fn test_search_orders_and_truncates() {
        let collection = ready().await;
        let (d, e, i) = batch(&[
            (SourceKind::Nutrition, "far", vec![0.0, 1.0]),
            (SourceKind::Nutrition, "near", vec![1.0, 0.1]),
            (SourceKind::Nutrition, "mid", vec![1.0, 1.0]),
        ]);
        collection.insert(d, e, i).await.unwrap();

        let result = collection.search(&[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<_> = result.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        let scores: Vec<f64> = result.iter().filter_map(|h| h.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));

        assert_eq!(
            collection.search(&[1.0, 0.0], 0, None).await,
            Err(VectorStoreError::InvalidTopK)
        );
        assert!(matches!(
            collection.search(&[1.0], 1, None).await,
            Err(VectorStoreError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }

    #[tokio::test]
    async fn test_filter_applies_before_ranking() {
        let collection = ready().await;
        let (d, e, i) = batch(&[
            (SourceKind::Profile, "profile_u1", vec![1.0, 0.0]),
            (SourceKind::Chat, "u1_chat_0_user", vec![1.0, 0.0]),
            (SourceKind::Nutrition, "food_0", vec![0.0, 1.0]),
            (SourceKind::Nutrition, "food_1", vec![0.2, 1.0]),
        ]);
        collection.insert(d, e, i).await.unwrap();

        let filter = Filter::source_kind(SourceKind::Nutrition);
        let result = collection.search(&[1.0, 0.0], 2, Some(&filter)).await.unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|h| filter.matches(&h.metadata)));
        assert_eq!(result.hits[0].id, "food_1");
    }

    #[tokio::test]
    async fn test_conflicting_insert_changes_nothing() {
        let collection = ready().await;
        let (d, e, i) = batch(&[(SourceKind::Chat, "a", vec![1.0])]);
        collection.insert(d, e, i).await.unwrap();

        let (d, e, i) = batch(&[(SourceKind::Chat, "b", vec![1.0]), (SourceKind::Chat, "a", vec![1.0])]);
        assert_eq!(
            collection.insert(d, e, i).await,
            Err(VectorStoreError::IdConflict("a".to_string()))
        );
        let (d, e, i) = batch(&[(SourceKind::Chat, "c", vec![1.0]), (SourceKind::Chat, "c", vec![1.0])]);
        assert_eq!(
            collection.insert(d, e, i).await,
            Err(VectorStoreError::IdConflict("c".to_string()))
        );
        assert_eq!(collection.len().await, 1);
        assert_eq!(collection.get_by_id("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_validates_shapes() {
        let collection = ready().await;
        let (d, mut e, i) = batch(&[(SourceKind::Chat, "a", vec![1.0]), (SourceKind::Chat, "b", vec![1.0])]);
        e.pop();
        assert!(matches!(
            collection.insert(d, e, i).await,
            Err(VectorStoreError::LengthMismatch { documents: 2, embeddings: 1, ids: 2 })
        ));

        let (d, e, _) = batch(&[(SourceKind::Chat, "a", vec![1.0])]);
        assert!(matches!(
            collection.insert(d, e, vec!["z".to_string()]).await,
            Err(VectorStoreError::IdMismatch { .. })
        ));

        let (d, e, i) = batch(&[(SourceKind::Chat, "a", vec![1.0]), (SourceKind::Chat, "b", vec![1.0, 2.0])]);
        assert!(matches!(
            collection.insert(d, e, i).await,
            Err(VectorStoreError::DimensionMismatch { expected: 1, got: 2 })
        ));
        assert!(collection.is_empty().await);
    }

    #[tokio::test]
    async fn test_recreate_and_reinsert_is_idempotent() {
        let collection = ready().await;
        let items = [
            (SourceKind::Chat, "a", vec![1.0, 0.0]),
            (SourceKind::Chat, "b", vec![0.0, 1.0]),
        ];
        let (d, e, i) = batch(&items);
        collection.insert(d, e, i).await.unwrap();
        let first = collection.search(&[1.0, 1.0], 10, None).await.unwrap();

        collection.recreate().await.unwrap();
        assert!(collection.is_empty().await);
        let (d, e, i) = batch(&items);
        collection.insert(d, e, i).await.unwrap();
        assert_eq!(collection.search(&[1.0, 1.0], 10, None).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_concurrent_search_sees_whole_snapshots() {
        let collection = Arc::new(ready().await);
        let items: Vec<_> = (0..50u32)
            .map(|n| (SourceKind::Chat, format!("id_{n}"), vec![1.0, f64::from(n)]))
            .collect();
        let borrowed: Vec<_> = items.iter().map(|(k, id, v)| (*k, id.as_str(), v.clone())).collect();
        let (d, e, i) = batch(&borrowed);
        collection.insert(d, e, i).await.unwrap();

        let reader = {
            let collection = Arc::clone(&collection);
            tokio::spawn(async move {
                for _ in 0..100 {
                    let len = collection.search(&[1.0, 1.0], 100, None).await.unwrap().len();
                    assert!(len == 0 || len == 50, "observed partial collection of {len}");
                    tokio::task::yield_now().await;
                }
            })
        };
        collection.recreate().await.unwrap();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_open_reloads_persisted_documents() {
        let dir = tempfile::tempdir().unwrap();
        {
            let collection = Collection::open(dir.path(), "persisted").await.unwrap();
            assert_eq!(collection.state().await, CollectionState::Uninitialized);
            collection.create().await.unwrap();
            let (d, e, i) = batch(&[(SourceKind::Profile, "profile_u1", vec![0.5, 0.5])]);
            collection.insert(d, e, i).await.unwrap();
        }
        let collection = Collection::open(dir.path(), "persisted").await.unwrap();
        assert_eq!(collection.state().await, CollectionState::Ready);
        let stored = collection.get_by_id("profile_u1").await.unwrap().unwrap();
        assert_eq!(stored.embedded_data, vec![0.5, 0.5]);
        assert_eq!(stored.document.source_kind(), SourceKind::Profile);

        collection.destroy().await.unwrap();
        let collection = Collection::open(dir.path(), "persisted").await.unwrap();
        assert_eq!(collection.state().await, CollectionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_successive_inserts_persist_cumulatively() {
        let dir = tempfile::tempdir().unwrap();
        let collection = Collection::open(dir.path(), "growing").await.unwrap();
        collection.create().await.unwrap();
        for id in ["a", "b", "c"] {
            let (d, e, i) = batch(&[(SourceKind::Nutrition, id, vec![1.0, 0.0])]);
            collection.insert(d, e, i).await.unwrap();
        }
        let (_, before) = collection.snapshot().await;
        let (d, e, i) = batch(&[(SourceKind::Nutrition, "d", vec![0.0, 1.0])]);
        collection.insert(d, e, i).await.unwrap();
        assert_eq!(before.entries.len(), 3);
        assert!(Arc::ptr_eq(
            &before.entries["a"],
            &collection.snapshot().await.1.entries["a"]
        ));

        let reopened = Collection::open(dir.path(), "growing").await.unwrap();
        assert_eq!(reopened.len().await, 4);
        let hits = reopened.search(&[0.0, 1.0], 1, None).await.unwrap();
        assert_eq!(hits.hits[0].id, "d");
    }
}
