use thiserror::Error;

use crate::{
    config::ConfigError, document::SourceKind, embeddings::EmbedderError, loader::LoaderError,
    processor::ProcessError, vector_store::VectorStoreError,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Embedding unavailable for {batch_size} {source_kind} documents: {source}")]
    EmbeddingUnavailable {
        source_kind: SourceKind,
        batch_size: usize,
        source: EmbedderError,
    },
    #[error("Id conflict on `{id}` while inserting {batch_size} {source_kind} documents")]
    IdConflict {
        source_kind: SourceKind,
        batch_size: usize,
        id: String,
    },
    #[error("Index unavailable while inserting {batch_size} {source_kind} documents: {source}")]
    IndexUnavailable {
        source_kind: SourceKind,
        batch_size: usize,
        source: VectorStoreError,
    },
    #[error("Failed to embed query: {0}")]
    QueryEmbedding(EmbedderError),
    #[error("VectorStore error: {0}")]
    VectorStore(#[from] VectorStoreError),
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),
    #[error("Processor error: {0}")]
    Process(#[from] ProcessError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Wraps an index error raised while inserting a batch.
    pub(crate) fn insert_failed(source_kind: SourceKind, batch_size: usize, e: VectorStoreError) -> Self {
        match e {
            VectorStoreError::IdConflict(id) => Self::IdConflict {
                source_kind,
                batch_size,
                id,
            },
            source => Self::IndexUnavailable {
                source_kind,
                batch_size,
                source,
            },
        }
    }

    /// The source kind of the failed batch, for batch-level errors.
    pub fn source_kind(&self) -> Option<SourceKind> {
        match self {
            Self::EmbeddingUnavailable { source_kind, .. }
            | Self::IdConflict { source_kind, .. }
            | Self::IndexUnavailable { source_kind, .. } => Some(*source_kind),
            _ => None,
        }
    }
}
