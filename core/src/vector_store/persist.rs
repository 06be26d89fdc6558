use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::VectorStoreError;
use crate::embeddings::embedding::Embedding;

const SNAPSHOT_EXTENSION: &str = "json";

/// On-disk form of a collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct Snapshot {
    pub(super) dimension: Option<usize>,
    pub(super) entries: Vec<Embedding>,
}

/// `{root}/{collection}.json`, replaced atomically through a temporary file
#[derive(Debug, Clone)]
pub(super) struct SnapshotFile {
    path: PathBuf,
}

fn unavailable(path: &Path, e: impl std::fmt::Display) -> VectorStoreError {
    VectorStoreError::Unavailable(format!("{}: {e}", path.display()))
}

impl SnapshotFile {
    pub(super) fn new(root: &Path, name: &str) -> Self {
        Self {
            path: root.join(format!("{name}.{SNAPSHOT_EXTENSION}")),
        }
    }

    /// Collection names with a snapshot under `root`
    pub(super) async fn list(root: &Path) -> Result<Vec<String>, VectorStoreError> {
        let mut names = vec![];
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(unavailable(root, e)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| unavailable(root, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        Ok(names)
    }

    /// `Ok(None)` when nothing has been persisted yet.
    pub(super) async fn load(&self) -> Result<Option<Snapshot>, VectorStoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable(&self.path, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| unavailable(&self.path, e))
    }

    pub(super) async fn store(&self, snapshot: &Snapshot) -> Result<(), VectorStoreError> {
        let raw = serde_json::to_vec(snapshot).map_err(|e| unavailable(&self.path, e))?;
        let tmp = self.path.with_extension(format!("{SNAPSHOT_EXTENSION}.tmp"));
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| unavailable(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| unavailable(&self.path, e))
    }

    pub(super) async fn remove(&self) -> Result<(), VectorStoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(&self.path, e)),
        }
    }
}
