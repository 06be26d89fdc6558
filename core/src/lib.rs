//! # nutrirag - Core API Documentation
//!
//! nutrirag is the retrieval core of a nutrition assistant. It turns nutrition
//! tables, user profiles and chat transcripts into searchable documents and
//! answers similarity queries narrowed by metadata filters.
//!
//! ## Features
//!
//! - **One data contract** for three unrelated record schemas:
//!   - **Loaders**: per-user records from a [`UserRecordStore`](loader::UserRecordStore), nutrition rows from CSV tables
//!   - **Processors**: nutrition rows, profiles and chat turns rendered into [`Document`](document::Document)s
//!   - **Embedders**: a deterministic local hashing model and OpenAI-compatible endpoints
//!   - **Vector Store**: persistent, filterable collections with snapshot-consistent rebuilds
//! - **Partial-failure tolerance**: a corrupt user file or a malformed row is skipped
//!   and logged, never aborting the run
//!
//! ## Examples
//!
//! ### Indexing and querying
//!
//! ```rust,no_run
//! use nutrirag::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let users = Arc::new(JsonUserStore::from_index("data/users/index.json"));
//!     let tables = NutritionTableLoader::builder(vec!["data/nutrition/*.csv".to_string()])?.build();
//!
//!     let retriever = Retriever::builder(users)
//!         .nutrition_tables(tables)
//!         .build()
//!         .await?;
//!
//!     let report = retriever.index_all_sources().await.map_err(|e| e.error)?;
//!     println!("indexed {} documents", report.total_inserted());
//!
//!     let filter = Filter::source_kind(SourceKind::Nutrition);
//!     for hit in retriever.retrieve("high protein", 3, Some(&filter)).await? {
//!         println!("{:?} {}", hit.score, hit.text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### From a config file
//!
//! ```rust,no_run
//! use nutrirag::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = RetrieverConfig::from_file("nutrirag.json").await?;
//!     let users = Arc::new(JsonUserStore::from_patterns(vec!["data/users/*.json".to_string()])?);
//!     let retriever = Retriever::from_config(&config, users).await?;
//!
//!     let context = retriever.load_user_context("u1").await;
//!     println!("{} recent chats", context.recent_chats.len());
//!     Ok(())
//! }
//! ```

/// JSON configuration for building a retriever
pub mod config;

/// Document model shared by every other module
///
/// Provides the (text, metadata) unit stored and retrieved by the index.
pub mod document;

/// Text embeddings support
pub mod embeddings;

/// Error types for all library operations
pub mod error;

/// Access to user records and nutrition tables
pub mod loader;

/// Convenience prelude exports
pub mod prelude;

/// Turning raw records into documents
pub mod processor;

/// Builtin embedding providers
pub mod providers;

/// Indexing and query orchestration
pub mod retriever;

/// Vector storage and retrieval
pub mod vector_store;
