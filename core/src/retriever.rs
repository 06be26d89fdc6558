//! Indexing and query orchestration.
//!
//! [`Retriever::index_all_sources`] runs every source kind through
//! load, process and embed concurrently, then inserts the batches one after
//! the other in [`SourceKind::ALL`] order. The first batch that cannot be
//! embedded or inserted stops the run; batches inserted before it stay.

use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::{RetrieverConfig, DEFAULT_COLLECTION_NAME, DEFAULT_TOP_K};
use crate::document::SourceKind;
use crate::embeddings::{EmbedderError, EmbeddingModel};
use crate::error::{Error, Result};
use crate::loader::builtins::{NutritionRow, NutritionTableLoader};
use crate::loader::{SourceLoader, UserContext, UserRecordStore, DEFAULT_CHAT_CONTEXT_LIMIT};
use crate::processor::{
    ChatProcessor, NutritionProcessor, ProcessOutcome, Processor, ProfileProcessor,
};
use crate::providers::embeddings::HashingEmbedding;
use crate::vector_store::{Collection, Filter, SearchResult, VectorDb, VectorStore, VectorStoreError};

/// Per source kind document counts of an indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub inserted: BTreeMap<SourceKind, usize>,
    pub skipped: BTreeMap<SourceKind, usize>,
}

impl IndexReport {
    pub fn inserted(&self, kind: SourceKind) -> usize {
        self.inserted.get(&kind).copied().unwrap_or(0)
    }

    pub fn skipped(&self, kind: SourceKind) -> usize {
        self.skipped.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_inserted(&self) -> usize {
        self.inserted.values().sum()
    }
}

/// A run that stopped at a failing batch, with the counts of what it did before.
#[derive(Debug, Error)]
#[error("Indexing stopped: {error}")]
pub struct IndexRunError {
    pub report: IndexReport,
    #[source]
    pub error: Error,
}

struct PreparedBatch {
    source_kind: SourceKind,
    outcome: ProcessOutcome,
    embeddings: std::result::Result<Vec<Vec<f64>>, EmbedderError>,
}

pub struct RetrieverBuilder {
    records: Arc<dyn UserRecordStore>,
    embedder: Option<Arc<dyn EmbeddingModel>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    nutrition_tables: Option<NutritionTableLoader>,
    nutrition_processor: NutritionProcessor,
    chat_context_limit: usize,
    default_top_k: usize,
    recreate_on_start: bool,
}

impl RetrieverBuilder {
    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingModel>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Defaults to an in-memory collection named `nutrition_assistant`.
    #[must_use]
    pub fn vector_store(mut self, vector_store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(vector_store);
        self
    }

    #[must_use]
    pub fn nutrition_tables(mut self, loader: NutritionTableLoader) -> Self {
        self.nutrition_tables = Some(loader);
        self
    }

    #[must_use]
    pub fn nutrition_processor(mut self, processor: NutritionProcessor) -> Self {
        self.nutrition_processor = processor;
        self
    }

    #[must_use]
    pub fn chat_context_limit(mut self, limit: usize) -> Self {
        self.chat_context_limit = limit;
        self
    }

    #[must_use]
    pub fn default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    /// Whether `build` drops whatever the collection already holds (default `true`).
    #[must_use]
    pub fn recreate_on_start(mut self, recreate: bool) -> Self {
        self.recreate_on_start = recreate;
        self
    }

    /// Prepares the collection and returns the retriever.
    ///
    /// # Errors
    /// Fails if the collection cannot be created or recreated.
    pub async fn build(self) -> Result<Retriever> {
        if self.default_top_k == 0 {
            return Err(VectorStoreError::InvalidTopK.into());
        }
        let store: Arc<dyn VectorStore> = match self.vector_store {
            Some(store) => store,
            None => Arc::new(Collection::in_memory(DEFAULT_COLLECTION_NAME)?),
        };
        if self.recreate_on_start {
            store.recreate().await?;
        } else {
            store.create().await?;
        }
        let documents = store.len().await;
        info!(
            collection = store.name(),
            recreated = self.recreate_on_start,
            documents,
            "retriever ready"
        );
        Ok(Retriever {
            loader: SourceLoader::new(self.records).with_chat_context_limit(self.chat_context_limit),
            nutrition_tables: self.nutrition_tables,
            nutrition_processor: self.nutrition_processor,
            profile_processor: ProfileProcessor::new(),
            chat_processor: ChatProcessor::new(),
            embedder: self
                .embedder
                .unwrap_or_else(|| Arc::new(HashingEmbedding::default())),
            store,
            default_top_k: self.default_top_k,
        })
    }
}

/// Indexes nutrition tables, profiles and chats into one collection and
/// answers filtered similarity queries over it.
pub struct Retriever {
    loader: SourceLoader,
    nutrition_tables: Option<NutritionTableLoader>,
    nutrition_processor: NutritionProcessor,
    profile_processor: ProfileProcessor,
    chat_processor: ChatProcessor,
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<dyn VectorStore>,
    default_top_k: usize,
}

impl Retriever {
    pub fn builder(records: Arc<dyn UserRecordStore>) -> RetrieverBuilder {
        RetrieverBuilder {
            records,
            embedder: None,
            vector_store: None,
            nutrition_tables: None,
            nutrition_processor: NutritionProcessor::new(),
            chat_context_limit: DEFAULT_CHAT_CONTEXT_LIMIT,
            default_top_k: DEFAULT_TOP_K,
            recreate_on_start: true,
        }
    }

    /// Builds a retriever from its configuration.
    ///
    /// # Errors
    /// Invalid configuration, missing API keys, bad table patterns or an
    /// unusable persist path.
    pub async fn from_config(
        config: &RetrieverConfig,
        records: Arc<dyn UserRecordStore>,
    ) -> Result<Self> {
        config.validate()?;
        let vector_store: Arc<dyn VectorStore> = match &config.persist_path {
            Some(path) => VectorDb::open(path)
                .await?
                .collection(&config.collection_name)
                .await?,
            None => Arc::new(Collection::in_memory(config.collection_name.clone())?),
        };
        let mut builder = Self::builder(records)
            .embedder(config.embedding.build()?)
            .vector_store(vector_store)
            .nutrition_processor(config.nutrition_processor()?)
            .chat_context_limit(config.chat_context_limit)
            .default_top_k(config.default_top_k)
            .recreate_on_start(config.recreate_on_start);
        if !config.nutrition_tables.is_empty() {
            builder = builder.nutrition_tables(
                NutritionTableLoader::builder(config.nutrition_tables.clone())?.build(),
            );
        }
        builder.build().await
    }

    pub fn collection(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    async fn load_nutrition(&self) -> Vec<NutritionRow> {
        match &self.nutrition_tables {
            Some(tables) => tables.load().await,
            None => vec![],
        }
    }

    async fn prepare<P: Processor>(
        &self,
        processor: &P,
        records: impl Future<Output = Vec<P::Record>>,
    ) -> PreparedBatch {
        let records = records.await;
        let outcome = processor.process(&records);
        let source_kind = processor.source_kind();
        let texts: Vec<String> = outcome
            .documents
            .iter()
            .map(|d| d.text().to_string())
            .collect();
        let embeddings = if texts.is_empty() {
            Ok(vec![])
        } else {
            debug!(%source_kind, batch_size = texts.len(), "embedding batch");
            self.embedder.encode(&texts).await
        };
        PreparedBatch {
            source_kind,
            outcome,
            embeddings,
        }
    }

    async fn insert_batch(&self, batch: PreparedBatch) -> Result<usize> {
        let PreparedBatch {
            source_kind,
            outcome,
            embeddings,
        } = batch;
        let batch_size = outcome.documents.len();
        if batch_size == 0 {
            return Ok(0);
        }
        let embeddings = embeddings.map_err(|source| Error::EmbeddingUnavailable {
            source_kind,
            batch_size,
            source,
        })?;
        let ids = outcome
            .documents
            .iter()
            .map(|d| d.source_id().to_string())
            .collect();
        self.store
            .insert(outcome.documents, embeddings, ids)
            .await
            .map_err(|e| Error::insert_failed(source_kind, batch_size, e))?;
        Ok(batch_size)
    }

    /// Loads, processes, embeds and inserts every source kind.
    ///
    /// Ids must not already be in the collection; re-indexing goes through
    /// [`Retriever::rebuild`].
    ///
    /// # Errors
    /// The first batch failing to embed or insert stops the run. The error
    /// carries the counts of the batches committed before it.
    pub async fn index_all_sources(&self) -> std::result::Result<IndexReport, IndexRunError> {
        let (nutrition, profiles, chats) = tokio::join!(
            self.prepare(&self.nutrition_processor, self.load_nutrition()),
            self.prepare(&self.profile_processor, self.loader.load_all_profiles()),
            self.prepare(&self.chat_processor, self.loader.load_all_chats()),
        );

        let mut report = IndexReport::default();
        for batch in [&nutrition, &profiles, &chats] {
            report.inserted.insert(batch.source_kind, 0);
            report.skipped.insert(batch.source_kind, batch.outcome.skipped);
        }

        for batch in [nutrition, profiles, chats] {
            let source_kind = batch.source_kind;
            let skipped = batch.outcome.skipped;
            let batch_size = batch.outcome.documents.len();
            match self.insert_batch(batch).await {
                Ok(inserted) => {
                    report.inserted.insert(source_kind, inserted);
                    info!(%source_kind, inserted, skipped, "indexed source");
                }
                Err(e) => {
                    error!(%source_kind, batch_size, error = %e, "aborting indexing run");
                    return Err(IndexRunError { report, error: e });
                }
            }
        }
        info!(
            collection = self.store.name(),
            inserted = report.total_inserted(),
            "indexing run complete"
        );
        Ok(report)
    }

    /// Drops the collection and indexes every source again.
    pub async fn rebuild(&self) -> std::result::Result<IndexReport, IndexRunError> {
        self.store.recreate().await.map_err(|e| IndexRunError {
            report: IndexReport::default(),
            error: e.into(),
        })?;
        self.index_all_sources().await
    }

    /// The `top_k` documents most similar to `query` that pass `filter`.
    ///
    /// # Errors
    /// `top_k` of zero, a failed query embedding or an unusable index.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<SearchResult> {
        if top_k == 0 {
            return Err(VectorStoreError::InvalidTopK.into());
        }
        let vector = self
            .embedder
            .encode_query(query)
            .await
            .map_err(Error::QueryEmbedding)?;
        let result = self.store.search(&vector, top_k, filter).await?;
        debug!(top_k, hits = result.len(), filtered = filter.is_some(), "retrieved");
        Ok(result)
    }

    /// Profile, nutrition and recent chats of one user, for prompting.
    pub async fn load_user_context(&self, user_id: &str) -> UserContext {
        self.loader.load_user_specific(user_id).await
    }
}
