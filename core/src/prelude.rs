pub use crate::config::{EmbeddingConfig, RetrieverConfig};
pub use crate::document::{Document, Metadata, MetadataValue, SourceKind};
pub use crate::embeddings::EmbeddingModel;
pub use crate::error::{Error, Result};
pub use crate::loader::builtins::{InMemoryUserStore, JsonUserStore, NutritionTableLoader};
pub use crate::loader::{Profile, UserContext, UserRecordStore};
pub use crate::processor::Processor;
pub use crate::providers::embeddings::{HashingEmbedding, OpenAIEmbedding};
pub use crate::retriever::{IndexReport, Retriever};
pub use crate::vector_store::{Collection, Filter, SearchResult, VectorDb, VectorStore};
