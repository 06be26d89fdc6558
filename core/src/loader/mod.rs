//! Access to the external user-record store.
//!
//! The [`UserRecordStore`] trait is the boundary to wherever profiles, nutrition
//! computations and chat logs are persisted. [`SourceLoader`] walks every known
//! user through that boundary, skipping (and logging) users whose records are
//! missing or corrupt so that a single bad user never blocks the rest of the corpus.

pub mod builtins;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::document::{Metadata, MetadataValue};

/// Default number of trailing chat turns included in a [`UserContext`]
pub const DEFAULT_CHAT_CONTEXT_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Record store unavailable for user `{user_id}`: {reason}")]
    SourceUnavailable { user_id: String, reason: String },
    #[error("Corrupt record for user `{user_id}`: {reason}")]
    Corrupt { user_id: String, reason: String },
    #[error("User index unavailable: {0}")]
    IndexUnavailable(String),
    #[error("Invalid glob-pattern")]
    InvalidGlobPattern(#[from] glob::PatternError),
    #[error("Failed to read table `{path}`: {reason}")]
    Table { path: String, reason: String },
}

impl LoaderError {
    /// A copy of this error, for reporting one failed read against every record part.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::SourceUnavailable { user_id, reason } => Self::SourceUnavailable {
                user_id: user_id.clone(),
                reason: reason.clone(),
            },
            Self::Corrupt { user_id, reason } => Self::Corrupt {
                user_id: user_id.clone(),
                reason: reason.clone(),
            },
            Self::IndexUnavailable(reason) => Self::IndexUnavailable(reason.clone()),
            Self::InvalidGlobPattern(e) => Self::IndexUnavailable(e.to_string()),
            Self::Table { path, reason } => Self::Table {
                path: path.clone(),
                reason: reason.clone(),
            },
        }
    }
}

fn default_language() -> Option<String> {
    Some("en".to_string())
}

/// The trimmed text of a field, or `None` when it is missing or blank.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// A measurement, or `None` when it is missing or not strictly positive.
pub(crate) fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

/// Decoders for hand-edited record files, where numbers arrive as strings and
/// the other way around. A value that cannot be read as the target type is
/// treated as absent instead of failing the whole record.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub(super) fn float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(value.filter(|v| v.is_finite()))
    }

    /// Whole numbers; fractional input is truncated.
    pub(super) fn whole<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(float(deserializer)?
            .filter(|v| *v >= 0.0 && *v <= f64::from(u32::MAX))
            .map(|v| v.trunc() as u32))
    }

    pub(super) fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(string(deserializer)?.unwrap_or_default())
    }
}

/// Profile fields the retrieval core knows how to render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, deserialize_with = "lenient::string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::whole")]
    pub age: Option<u32>,
    /// kilograms
    #[serde(default, deserialize_with = "lenient::float")]
    pub weight: Option<f64>,
    /// centimeters
    #[serde(default, deserialize_with = "lenient::float")]
    pub height: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub goal: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub activity_level: Option<String>,
    #[serde(default = "default_language", deserialize_with = "lenient::string")]
    pub language: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            user_id: None,
            name: None,
            age: None,
            weight: None,
            height: None,
            goal: None,
            activity_level: None,
            language: default_language(),
        }
    }
}

impl Profile {
    /// True when none of the descriptive fields would be rendered: blank text
    /// and zero measurements count as missing.
    pub fn is_empty(&self) -> bool {
        present(&self.user_id).is_none()
            && present(&self.name).is_none()
            && self.age.filter(|a| *a > 0).is_none()
            && positive(self.weight).is_none()
            && positive(self.height).is_none()
            && present(&self.goal).is_none()
            && present(&self.activity_level).is_none()
    }

    /// The profile as stored for `user_id`, or `None` when nothing would be rendered.
    pub(crate) fn for_user(mut self, user_id: &str) -> Option<Self> {
        if self.is_empty() {
            return None;
        }
        self.user_id.get_or_insert_with(|| user_id.to_string());
        Some(self)
    }

    /// Every present field as metadata; absent fields are left out.
    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        let mut put = |key: &str, value: Option<MetadataValue>| {
            if let Some(value) = value {
                metadata.insert(key.to_string(), value);
            }
        };
        put("user_id", self.user_id.clone().map(Into::into));
        put("name", self.name.clone().map(Into::into));
        put("age", self.age.map(Into::into));
        put("weight", self.weight.map(Into::into));
        put("height", self.height.map(Into::into));
        put("goal", self.goal.clone().map(Into::into));
        put("activity_level", self.activity_level.clone().map(Into::into));
        put("language", self.language.clone().map(Into::into));
        metadata
    }
}

/// Nutrition computations for one user (BMR, TDEE, goal calories, macros, ...)
pub type NutritionSummary = serde_json::Map<String, serde_json::Value>;

/// A chat exchange as the record store persists it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChat {
    #[serde(default, deserialize_with = "lenient::text")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub user: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub bot: String,
}

/// A user utterance paired with the bot reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub message_id: Option<String>,
    pub user_id: Option<String>,
    pub timestamp: String,
    pub user: String,
    pub bot: String,
}

impl ChatTurn {
    /// Builds the turn for the `position`-th stored chat of `user_id`.
    pub fn from_stored(user_id: &str, position: usize, chat: StoredChat) -> Self {
        Self {
            message_id: Some(format!("{user_id}_chat_{position}")),
            user_id: Some(user_id.to_string()),
            timestamp: chat.timestamp,
            user: chat.user,
            bot: chat.bot,
        }
    }
}

/// The per-user record layout shared by the builtin stores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(default)]
    pub nutrition: Option<NutritionSummary>,
    #[serde(default)]
    pub chats: Vec<StoredChat>,
}

/// Every part of one user's record, each readable or not on its own
#[derive(Debug)]
pub struct UserParts {
    pub profile: Result<Option<Profile>, LoaderError>,
    pub nutrition: Result<Option<NutritionSummary>, LoaderError>,
    pub chats: Result<Vec<ChatTurn>, LoaderError>,
}

/// Boundary to the store holding raw per-user records.
///
/// Implementations return `Ok(None)`/empty for records that do not exist and
/// `Err` for records that exist but cannot be read.
#[async_trait]
pub trait UserRecordStore: Send + Sync {
    async fn list_known_user_ids(&self) -> Result<Vec<String>, LoaderError>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, LoaderError>;

    async fn get_nutrition(&self, user_id: &str) -> Result<Option<NutritionSummary>, LoaderError>;

    /// Chats in most-recent-last order; `limit` keeps only the tail.
    async fn get_chats(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatTurn>, LoaderError>;

    /// Profile, nutrition and all chats of one user.
    ///
    /// Stores that keep a user in a single record should override this to read
    /// it once, so the parts come from the same version of the record.
    async fn get_user_parts(&self, user_id: &str) -> UserParts {
        UserParts {
            profile: self.get_profile(user_id).await,
            nutrition: self.get_nutrition(user_id).await,
            chats: self.get_chats(user_id, None).await,
        }
    }
}

/// Everything known about a single user, for the conversation layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserContext {
    pub user_id: String,
    pub profile: Option<Profile>,
    pub nutrition: Option<NutritionSummary>,
    pub chats: Vec<ChatTurn>,
    pub recent_chats: Vec<ChatTurn>,
}

/// Loads records for all known users, tolerating per-user failures
#[derive(Clone)]
pub struct SourceLoader {
    store: Arc<dyn UserRecordStore>,
    chat_context_limit: usize,
}

impl SourceLoader {
    pub fn new(store: Arc<dyn UserRecordStore>) -> Self {
        Self {
            store,
            chat_context_limit: DEFAULT_CHAT_CONTEXT_LIMIT,
        }
    }

    /// Number of trailing turns kept in [`UserContext::recent_chats`]
    #[must_use]
    pub fn with_chat_context_limit(mut self, limit: usize) -> Self {
        self.chat_context_limit = limit;
        self
    }

    async fn known_users(&self) -> Vec<String> {
        match self.store.list_known_user_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "failed to list known users, nothing to load");
                vec![]
            }
        }
    }

    pub async fn load_all_profiles(&self) -> Vec<Profile> {
        let users = self.known_users().await;
        let mut profiles = Vec::with_capacity(users.len());
        let mut skipped = 0usize;
        for user_id in users.iter().map(String::as_str) {
            match self.store.get_profile(user_id).await {
                Ok(Some(profile)) => profiles.push(profile),
                Ok(None) => {
                    skipped += 1;
                    warn!(user_id, reason = "no profile on record", "skipping user");
                }
                Err(e) => {
                    skipped += 1;
                    warn!(user_id, reason = %e, "skipping user");
                }
            }
        }
        info!(loaded = profiles.len(), skipped, "loaded user profiles");
        profiles
    }

    pub async fn load_all_chats(&self) -> Vec<ChatTurn> {
        let users = self.known_users().await;
        let mut turns = vec![];
        let mut skipped = 0usize;
        for user_id in users.iter().map(String::as_str) {
            match self.store.get_chats(user_id, None).await {
                Ok(chats) => turns.extend(chats),
                Err(e) => {
                    skipped += 1;
                    warn!(user_id, reason = %e, "skipping user chats");
                }
            }
        }
        info!(loaded = turns.len(), skipped, "loaded chat turns");
        turns
    }

    /// Profile, nutrition and chats of one user. Unreadable parts come back empty.
    pub async fn load_user_specific(&self, user_id: &str) -> UserContext {
        let parts = self.store.get_user_parts(user_id).await;
        let profile = parts.profile.unwrap_or_else(|e| {
            warn!(user_id, reason = %e, "profile unavailable");
            None
        });
        let nutrition = parts.nutrition.unwrap_or_else(|e| {
            warn!(user_id, reason = %e, "nutrition unavailable");
            None
        });
        let chats = parts.chats.unwrap_or_else(|e| {
            warn!(user_id, reason = %e, "chats unavailable");
            vec![]
        });
        let tail = chats.len().saturating_sub(self.chat_context_limit);
        let recent_chats = chats[tail..].to_vec();
        UserContext {
            user_id: user_id.to_string(),
            profile,
            nutrition,
            chats,
            recent_chats,
        }
    }
}
