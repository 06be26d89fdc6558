use dashmap::DashMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::persist::SnapshotFile;
use super::{validate_collection_name, Collection, CollectionState, VectorStore, VectorStoreError};

/// Persistent store of named collections under one filesystem root.
pub struct VectorDb {
    root: PathBuf,
    collections: DashMap<String, Arc<Collection>>,
}

impl VectorDb {
    /// Opens (creating if needed) the directory at `root`.
    ///
    /// # Errors
    /// [`VectorStoreError::Unavailable`] if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, VectorStoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| VectorStoreError::Unavailable(format!("{}: {e}", root.display())))?;
        Ok(Self {
            root,
            collections: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The collection called `name`, loading its snapshot on first access.
    /// The same instance is returned on every call.
    pub async fn collection(&self, name: &str) -> Result<Arc<Collection>, VectorStoreError> {
        if let Some(collection) = self.collections.get(name) {
            return Ok(Arc::clone(collection.value()));
        }
        let opened = Arc::new(Collection::open(&self.root, name).await?);
        Ok(Arc::clone(
            self.collections
                .entry(name.to_string())
                .or_insert(opened)
                .value(),
        ))
    }

    pub async fn create_collection(&self, name: &str) -> Result<Arc<Collection>, VectorStoreError> {
        let collection = self.collection(name).await?;
        collection.create().await?;
        Ok(collection)
    }

    /// Drops and recreates `name`, creating it if it never existed.
    pub async fn recreate_collection(&self, name: &str) -> Result<Arc<Collection>, VectorStoreError> {
        let collection = self.collection(name).await?;
        collection.recreate().await?;
        Ok(collection)
    }

    /// Destroys `name` and forgets it; a later [`VectorDb::collection`] starts fresh.
    pub async fn delete_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        validate_collection_name(name)?;
        match self.collections.remove(name) {
            Some((_, collection)) => collection.destroy().await,
            None => SnapshotFile::new(&self.root, name).remove().await,
        }
    }

    /// Names of every live or persisted collection, sorted
    pub async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        let mut names: BTreeSet<String> = SnapshotFile::list(&self.root).await?.into_iter().collect();
        let open: Vec<Arc<Collection>> = self
            .collections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for collection in open {
            if matches!(
                collection.state().await,
                CollectionState::Ready | CollectionState::Rebuilding
            ) {
                names.insert(collection.name().to_string());
            }
        }
        Ok(names.into_iter().collect())
    }
}
