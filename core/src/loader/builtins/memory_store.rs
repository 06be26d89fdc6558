use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use crate::loader::{
    ChatTurn, LoaderError, NutritionSummary, Profile, UserRecord, UserRecordStore,
};

/// A [`UserRecordStore`] backed by a map of user records.
///
/// Users can be registered as unavailable, in which case they are listed but
/// every fetch fails with [`LoaderError::SourceUnavailable`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserStore {
    users: BTreeMap<String, UserRecord>,
    unavailable: BTreeSet<String>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>, record: UserRecord) -> Self {
        self.users.insert(user_id.into(), record);
        self
    }

    #[must_use]
    pub fn with_unavailable_user(mut self, user_id: impl Into<String>) -> Self {
        self.unavailable.insert(user_id.into());
        self
    }

    fn record(&self, user_id: &str) -> Result<Option<&UserRecord>, LoaderError> {
        if self.unavailable.contains(user_id) {
            return Err(LoaderError::SourceUnavailable {
                user_id: user_id.to_string(),
                reason: "record store unreachable".to_string(),
            });
        }
        Ok(self.users.get(user_id))
    }
}

#[async_trait]
impl UserRecordStore for InMemoryUserStore {
    async fn list_known_user_ids(&self) -> Result<Vec<String>, LoaderError> {
        let ids: BTreeSet<&String> = self.users.keys().chain(&self.unavailable).collect();
        Ok(ids.into_iter().cloned().collect())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, LoaderError> {
        Ok(self
            .record(user_id)?
            .and_then(|record| record.profile.clone().for_user(user_id)))
    }

    async fn get_nutrition(&self, user_id: &str) -> Result<Option<NutritionSummary>, LoaderError> {
        Ok(self.record(user_id)?.and_then(|record| record.nutrition.clone()))
    }

    async fn get_chats(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatTurn>, LoaderError> {
        let Some(record) = self.record(user_id)? else {
            return Ok(vec![]);
        };
        let skip = limit.map_or(0, |limit| record.chats.len().saturating_sub(limit));
        Ok(record
            .chats
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, chat)| ChatTurn::from_stored(user_id, i, chat.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::StoredChat;

    #[tokio::test]
    async fn test_get_chats_limit_keeps_tail_and_positions() {
        let record = UserRecord {
            chats: (0..4)
                .map(|i| StoredChat {
                    user: format!("q{i}"),
                    ..StoredChat::default()
                })
                .collect(),
            ..UserRecord::default()
        };
        let store = InMemoryUserStore::new().with_user("u1", record);

        let tail = store.get_chats("u1", Some(2)).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].user, "q2");
        assert_eq!(tail[0].message_id.as_deref(), Some("u1_chat_2"));

        let all = store.get_chats("u1", None).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(store.get_chats("missing", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_profile_is_absent() {
        let blank = UserRecord {
            profile: Profile {
                name: Some(String::new()),
                age: Some(0),
                ..Profile::default()
            },
            ..UserRecord::default()
        };
        let store = InMemoryUserStore::new()
            .with_user("u1", UserRecord::default())
            .with_unavailable_user("u2")
            .with_user("u3", blank);
        assert_eq!(store.get_profile("u1").await.unwrap(), None);
        assert_eq!(store.get_profile("u3").await.unwrap(), None);
        assert!(matches!(
            store.get_profile("u2").await,
            Err(LoaderError::SourceUnavailable { .. })
        ));
        assert_eq!(
            store.list_known_user_ids().await.unwrap(),
            vec!["u1".to_string(), "u2".to_string(), "u3".to_string()]
        );
    }
}
