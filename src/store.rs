/*!
Persisted spotify credentials, one record per user id
*/
use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::BadgeError;
use crate::models::{TokenUpdate, UserTokenRecord};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the record for `user_id`, `UserNotFound` if there isn't one
    async fn get(&self, user_id: &str) -> Result<UserTokenRecord, BadgeError>;

    /// Write the `Some` fields of `update`, leaving everything else as is.
    /// Concurrent updates for the same user are last-writer-wins.
    async fn merge_update(&self, user_id: &str, update: &TokenUpdate) -> Result<(), BadgeError>;

    /// The id of the only stored user, `None` if there are zero or several
    async fn sole_user_id(&self) -> Result<Option<String>, BadgeError>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn get(&self, user_id: &str) -> Result<UserTokenRecord, BadgeError> {
        sqlx::query_as::<_, UserTokenRecord>(
            "
            select id, access_token, refresh_token, token_expired_timestamp
            from spot.users
            where id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| BadgeError::UserNotFound(user_id.to_string()))
    }

    async fn merge_update(&self, user_id: &str, update: &TokenUpdate) -> Result<(), BadgeError> {
        let result = sqlx::query(
            "
            update spot.users set
                access_token = coalesce($1, access_token),
                token_expired_timestamp = coalesce($2, token_expired_timestamp),
                modified = now()
            where id = $3
            ",
        )
        .bind(update.access_token.as_deref())
        .bind(update.token_expired_timestamp)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(BadgeError::UserNotFound(user_id.to_string()));
        }
        Ok(())
    }

    async fn sole_user_id(&self) -> Result<Option<String>, BadgeError> {
        let ids: Vec<(String,)> = sqlx::query_as("select id from spot.users order by id limit 2")
            .fetch_all(&self.pool)
            .await?;
        Ok(match ids.as_slice() {
            [(id,)] => Some(id.clone()),
            _ => None,
        })
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use async_mutex::Mutex;
    use std::collections::BTreeMap;

    /// In-process store used by tests
    #[derive(Default)]
    pub struct MemoryStore {
        pub users: Mutex<BTreeMap<String, UserTokenRecord>>,
        // when set, every call fails with `StorageUnavailable`
        pub offline: bool,
    }

    impl MemoryStore {
        pub fn with(records: Vec<UserTokenRecord>) -> Self {
            Self {
                users: Mutex::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
                offline: false,
            }
        }

        pub async fn record(&self, user_id: &str) -> Option<UserTokenRecord> {
            self.users.lock().await.get(user_id).cloned()
        }

        fn check(&self) -> Result<(), BadgeError> {
            if self.offline {
                return Err(BadgeError::StorageUnavailable("offline".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn get(&self, user_id: &str) -> Result<UserTokenRecord, BadgeError> {
            self.check()?;
            self.record(user_id)
                .await
                .ok_or_else(|| BadgeError::UserNotFound(user_id.to_string()))
        }

        async fn merge_update(
            &self,
            user_id: &str,
            update: &TokenUpdate,
        ) -> Result<(), BadgeError> {
            self.check()?;
            let mut users = self.users.lock().await;
            let record = users
                .get_mut(user_id)
                .ok_or_else(|| BadgeError::UserNotFound(user_id.to_string()))?;
            if let Some(ref token) = update.access_token {
                record.access_token = token.clone();
            }
            if let Some(expires) = update.token_expired_timestamp {
                record.token_expired_timestamp = expires;
            }
            Ok(())
        }

        async fn sole_user_id(&self) -> Result<Option<String>, BadgeError> {
            self.check()?;
            let users = self.users.lock().await;
            if users.len() == 1 {
                return Ok(users.keys().next().cloned());
            }
            Ok(None)
        }
    }

    pub fn record(id: &str, access: &str, expires: i64) -> UserTokenRecord {
        UserTokenRecord {
            id: id.to_string(),
            access_token: access.to_string(),
            refresh_token: "r".to_string(),
            token_expired_timestamp: expires,
        }
    }

    #[async_std::test]
    async fn merge_update_preserves_unspecified_fields() {
        let store = MemoryStore::with(vec![record("u1", "t", 10)]);
        store
            .merge_update(
                "u1",
                &TokenUpdate {
                    access_token: Some("new".to_string()),
                    token_expired_timestamp: None,
                },
            )
            .await
            .unwrap();
        let r = store.get("u1").await.unwrap();
        assert_eq!(r.access_token, "new");
        assert_eq!(r.token_expired_timestamp, 10);
        assert_eq!(r.refresh_token, "r");
    }

    #[async_std::test]
    async fn missing_user_is_not_found() {
        let store = MemoryStore::with(vec![]);
        assert_eq!(
            store.get("nope").await,
            Err(BadgeError::UserNotFound("nope".to_string()))
        );
    }

    #[async_std::test]
    async fn sole_user_only_with_exactly_one_record() {
        let none = MemoryStore::with(vec![]);
        assert_eq!(none.sole_user_id().await.unwrap(), None);
        let one = MemoryStore::with(vec![record("u1", "t", 0)]);
        assert_eq!(one.sole_user_id().await.unwrap(), Some("u1".to_string()));
        let two = MemoryStore::with(vec![record("u1", "t", 0), record("u2", "t", 0)]);
        assert_eq!(two.sole_user_id().await.unwrap(), None);
    }
}
