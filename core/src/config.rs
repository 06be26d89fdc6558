//! JSON configuration of a [`Retriever`](crate::retriever::Retriever).
//!
//! Every field is optional:
//! ```json
//! {
//!     "collection_name": "nutrition_assistant",
//!     "persist_path": "./nutrition_index",
//!     "nutrition_tables": ["data/nutrition/*.csv"],
//!     "default_top_k": 5,
//!     "chat_context_limit": 5,
//!     "recreate_on_start": true,
//!     "embedding": { "provider": "hashing", "dimensions": 384 }
//! }
//! ```
//! A `null` `persist_path` keeps the collection in memory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

use crate::embeddings::EmbeddingModel;
use crate::loader::DEFAULT_CHAT_CONTEXT_LIMIT;
use crate::processor::NutritionProcessor;
use crate::providers::embeddings::{
    HashingEmbedding, OpenAIEmbedding, DEFAULT_HASHING_DIMENSIONS, DEFAULT_OPENAI_EMBEDDING_MODEL,
    DEFAULT_OPENAI_EMBEDDING_URL,
};
use crate::vector_store::validate_collection_name;

pub const DEFAULT_COLLECTION_NAME: &str = "nutrition_assistant";
pub const DEFAULT_PERSIST_PATH: &str = "./nutrition_index";
pub const DEFAULT_TOP_K: usize = 5;
const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to deserialize json config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to read config file `{path}`: {reason}")]
    Io { path: String, reason: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Failed to fetch env var `{var}`: {reason}")]
    MissingApiKey { var: String, reason: String },
}

fn default_collection_name() -> String {
    DEFAULT_COLLECTION_NAME.to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_persist_path() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_PERSIST_PATH))
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_chat_context_limit() -> usize {
    DEFAULT_CHAT_CONTEXT_LIMIT
}

fn default_true() -> bool {
    true
}

fn default_dimensions() -> usize {
    DEFAULT_HASHING_DIMENSIONS
}

/// Which embedding provider to use, tagged by `provider`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase", deny_unknown_fields)]
pub enum EmbeddingConfig {
    Hashing {
        #[serde(default = "default_dimensions")]
        dimensions: usize,
    },
    #[serde(rename = "openai")]
    OpenAI {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        api_url: Option<String>,
        /// Name of the environment variable holding the API key
        #[serde(default)]
        api_key_var: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::Hashing {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

impl EmbeddingConfig {
    /// Instantiates the provider. OpenAI keys are read from the environment here.
    pub fn build(&self) -> Result<Arc<dyn EmbeddingModel>, ConfigError> {
        match self {
            Self::Hashing { dimensions } => Ok(Arc::new(HashingEmbedding::new(*dimensions))),
            Self::OpenAI {
                model,
                api_url,
                api_key_var,
                timeout_secs,
            } => {
                let var = api_key_var.as_deref().unwrap_or(API_KEY_ENV_VAR);
                let api_key = std::env::var(var).map_err(|e| {
                    error!(var, error = %e, "missing embedding api key");
                    ConfigError::MissingApiKey {
                        var: var.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let model = OpenAIEmbedding::new(
                    api_key,
                    api_url
                        .clone()
                        .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING_URL.to_string()),
                    model
                        .clone()
                        .unwrap_or_else(|| DEFAULT_OPENAI_EMBEDDING_MODEL.to_string()),
                )
                .with_timeout(Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)));
                Ok(Arc::new(model))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrieverConfig {
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(default = "default_persist_path")]
    pub persist_path: Option<PathBuf>,
    /// Glob patterns of nutrition CSV tables
    #[serde(default)]
    pub nutrition_tables: Vec<String>,
    #[serde(default)]
    pub nutrition_template: Option<String>,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_chat_context_limit")]
    pub chat_context_limit: usize,
    #[serde(default = "default_true")]
    pub recreate_on_start: bool,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            collection_name: default_collection_name(),
            persist_path: default_persist_path(),
            nutrition_tables: vec![],
            nutrition_template: None,
            default_top_k: DEFAULT_TOP_K,
            chat_context_limit: DEFAULT_CHAT_CONTEXT_LIMIT,
            recreate_on_start: true,
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl RetrieverConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).inspect_err(|e| {
            error!(error = %e, "failed to deserialize json config");
        })?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_collection_name(&self.collection_name)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.default_top_k == 0 {
            return Err(ConfigError::Invalid(
                "default_top_k must be a positive integer".to_string(),
            ));
        }
        for pattern in &self.nutrition_tables {
            glob::Pattern::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("nutrition table `{pattern}`: {e}")))?;
        }
        self.nutrition_processor()?;
        Ok(())
    }

    /// The nutrition processor for the configured template
    pub fn nutrition_processor(&self) -> Result<NutritionProcessor, ConfigError> {
        match &self.nutrition_template {
            Some(template) => NutritionProcessor::with_template(template)
                .map_err(|e| ConfigError::Invalid(e.to_string())),
            None => Ok(NutritionProcessor::new()),
        }
    }
}
