use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use super::utils::resolve_input_to_files;
use crate::loader::{
    ChatTurn, LoaderError, NutritionSummary, Profile, StoredChat, UserParts, UserRecordStore,
};

enum Directory {
    /// JSON object mapping user ids to user file paths
    IndexFile(PathBuf),
    /// Glob patterns over user files, the file stem being the user id
    Patterns(Vec<String>),
}

/// A [`UserRecordStore`] reading one JSON document per user.
///
/// Each user file holds the profile fields at the top level, an optional
/// `nutrition` object and a `chats` array of `{timestamp, user, bot}` objects:
/// ```json
/// {
///     "user_id": "u1",
///     "name": "Ana",
///     "age": 31,
///     "weight": 64.5,
///     "goal": "lose weight",
///     "nutrition": { "bmr": 1400, "tdee": 1900 },
///     "chats": [{ "timestamp": "2024-05-01T10:00:00", "user": "Hi", "bot": "Hello!" }]
/// }
/// ```
///
/// The profile, the nutrition summary and the chats are decoded separately, so
/// a malformed `nutrition` value does not hide the profile. Profile numbers
/// given as strings (`"age": "31"`) are accepted, and unreadable chat entries
/// are skipped on their own.
///
/// Users are discovered either through an index file or through glob patterns.
/// The directory is resolved by [`list_known_user_ids`](UserRecordStore::list_known_user_ids)
/// and reused by the per-user getters, which only resolve it again for a user
/// they have not seen yet.
pub struct JsonUserStore {
    directory: Directory,
    files: RwLock<Arc<BTreeMap<String, PathBuf>>>,
}

/// A user file that parsed as a JSON object
struct UserFile {
    path: PathBuf,
    value: Value,
}

impl UserFile {
    fn corrupt(&self, user_id: &str, part: &str, reason: impl std::fmt::Display) -> LoaderError {
        LoaderError::Corrupt {
            user_id: user_id.to_string(),
            reason: format!("{} ({part}): {reason}", self.path.display()),
        }
    }

    fn profile(&self, user_id: &str) -> Result<Option<Profile>, LoaderError> {
        let profile =
            Profile::deserialize(&self.value).map_err(|e| self.corrupt(user_id, "profile", e))?;
        Ok(profile.for_user(user_id))
    }

    fn nutrition(&self, user_id: &str) -> Result<Option<NutritionSummary>, LoaderError> {
        match self.value.get("nutrition") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(summary)) => Ok(Some(summary.clone())),
            Some(other) => Err(self.corrupt(
                user_id,
                "nutrition",
                format!("expected an object, found `{other}`"),
            )),
        }
    }

    fn chats(&self, user_id: &str, limit: Option<usize>) -> Result<Vec<ChatTurn>, LoaderError> {
        let entries = match self.value.get("chats") {
            None | Some(Value::Null) => return Ok(vec![]),
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(self.corrupt(
                    user_id,
                    "chats",
                    format!("expected an array, found `{other}`"),
                ))
            }
        };
        let chats: Vec<(usize, StoredChat)> = entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| match StoredChat::deserialize(entry) {
                Ok(chat) => Some((position, chat)),
                Err(e) => {
                    warn!(user_id, position, error = %e, "skipping unreadable chat entry");
                    None
                }
            })
            .collect();
        let skip = limit.map_or(0, |limit| chats.len().saturating_sub(limit));
        Ok(chats
            .into_iter()
            .skip(skip)
            .map(|(position, chat)| ChatTurn::from_stored(user_id, position, chat))
            .collect())
    }
}

impl JsonUserStore {
    fn with_directory(directory: Directory) -> Self {
        Self {
            directory,
            files: RwLock::default(),
        }
    }

    /// Uses an index file (`{"u1": "users/u1.json", ...}`). Relative user file
    /// paths are resolved against the index file's directory.
    pub fn from_index(index_path: impl Into<PathBuf>) -> Self {
        Self::with_directory(Directory::IndexFile(index_path.into()))
    }

    /// Uses every file matching the glob patterns, keyed by file stem.
    ///
    /// # Errors
    /// Fails if any of the patterns is not a valid glob pattern.
    pub fn from_patterns(patterns: Vec<String>) -> Result<Self, LoaderError> {
        for pattern in &patterns {
            glob::Pattern::new(pattern)?;
        }
        Ok(Self::with_directory(Directory::Patterns(patterns)))
    }

    async fn resolve_user_files(&self) -> Result<BTreeMap<String, PathBuf>, LoaderError> {
        match &self.directory {
            Directory::IndexFile(index_path) => {
                let raw = tokio::fs::read_to_string(index_path)
                    .await
                    .map_err(|e| LoaderError::IndexUnavailable(e.to_string()))?;
                let index: BTreeMap<String, PathBuf> = serde_json::from_str(&raw)
                    .map_err(|e| LoaderError::IndexUnavailable(e.to_string()))?;
                let base = index_path.parent().unwrap_or_else(|| Path::new(""));
                Ok(index
                    .into_iter()
                    .map(|(user_id, path)| {
                        let path = if path.is_relative() { base.join(path) } else { path };
                        (user_id, path)
                    })
                    .collect())
            }
            Directory::Patterns(patterns) => {
                let patterns = patterns.clone();
                let files = tokio::task::spawn_blocking(move || resolve_input_to_files(&patterns))
                    .await
                    .map_err(|e| LoaderError::IndexUnavailable(e.to_string()))?;
                Ok(files
                    .into_iter()
                    .filter_map(|path| {
                        let stem = path.file_stem()?.to_str()?.to_string();
                        Some((stem, path))
                    })
                    .collect())
            }
        }
    }

    /// Resolves the directory again and keeps the result for the getters.
    async fn refresh_user_files(&self) -> Result<Arc<BTreeMap<String, PathBuf>>, LoaderError> {
        let files = Arc::new(self.resolve_user_files().await?);
        *self.files.write().await = files.clone();
        Ok(files)
    }

    async fn user_file(&self, user_id: &str) -> Result<Option<PathBuf>, LoaderError> {
        let known = self.files.read().await.clone();
        if let Some(path) = known.get(user_id) {
            return Ok(Some(path.clone()));
        }
        Ok(self.refresh_user_files().await?.get(user_id).cloned())
    }

    /// Reads and parses a user's file; `Ok(None)` when the user is not registered.
    async fn load_user_data(&self, user_id: &str) -> Result<Option<UserFile>, LoaderError> {
        let Some(path) = self.user_file(user_id).await? else {
            return Ok(None);
        };
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LoaderError::SourceUnavailable {
                user_id: user_id.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| LoaderError::Corrupt {
            user_id: user_id.to_string(),
            reason: format!("{}: {e}", path.display()),
        })?;
        if !value.is_object() {
            return Err(LoaderError::Corrupt {
                user_id: user_id.to_string(),
                reason: format!("{}: expected a JSON object", path.display()),
            });
        }
        Ok(Some(UserFile { path, value }))
    }
}

#[async_trait]
impl UserRecordStore for JsonUserStore {
    async fn list_known_user_ids(&self) -> Result<Vec<String>, LoaderError> {
        Ok(self.refresh_user_files().await?.keys().cloned().collect())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, LoaderError> {
        match self.load_user_data(user_id).await? {
            Some(file) => file.profile(user_id),
            None => Ok(None),
        }
    }

    async fn get_nutrition(&self, user_id: &str) -> Result<Option<NutritionSummary>, LoaderError> {
        match self.load_user_data(user_id).await? {
            Some(file) => file.nutrition(user_id),
            None => Ok(None),
        }
    }

    async fn get_chats(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatTurn>, LoaderError> {
        match self.load_user_data(user_id).await? {
            Some(file) => file.chats(user_id, limit),
            None => Ok(vec![]),
        }
    }

    async fn get_user_parts(&self, user_id: &str) -> UserParts {
        match self.load_user_data(user_id).await {
            Ok(Some(file)) => UserParts {
                profile: file.profile(user_id),
                nutrition: file.nutrition(user_id),
                chats: file.chats(user_id, None),
            },
            Ok(None) => UserParts {
                profile: Ok(None),
                nutrition: Ok(None),
                chats: Ok(vec![]),
            },
            Err(e) => UserParts {
                profile: Err(e.duplicate()),
                nutrition: Err(e.duplicate()),
                chats: Err(e),
            },
        }
    }
}
