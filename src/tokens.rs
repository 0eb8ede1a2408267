/*!
Keeping a user's spotify access token usable.

Expiry is decided purely from the stored `token_expired_timestamp`
and the local clock. Stored expiries are pulled in by
`EXPIRY_MARGIN_SECONDS` so we refresh slightly early rather than late.
*/
use crate::error::BadgeError;
use crate::models::{TokenUpdate, UserTokenRecord};
use crate::spotify::SpotifyApi;
use crate::store::CredentialStore;
use crate::LOG;

pub const EXPIRY_MARGIN_SECONDS: i64 = 30;

pub fn expiry_timestamp(now: i64, expires_in: u64) -> i64 {
    now + expires_in as i64 - EXPIRY_MARGIN_SECONDS
}

/// Return a usable access token, refreshing it first if the stored one has expired
pub async fn ensure_access_token(
    store: &dyn CredentialStore,
    spotify: &dyn SpotifyApi,
    record: &mut UserTokenRecord,
    now: i64,
) -> Result<String, BadgeError> {
    if record.token_expired_timestamp > now {
        return Ok(record.access_token.clone());
    }
    slog::info!(
        LOG, "access token expired, refreshing";
        "user_id" => &record.id,
        "expired_at" => record.token_expired_timestamp,
    );
    force_refresh(store, spotify, record, now).await
}

/// Refresh unconditionally and persist the new token before returning it.
/// The refresh token itself is never replaced.
pub async fn force_refresh(
    store: &dyn CredentialStore,
    spotify: &dyn SpotifyApi,
    record: &mut UserTokenRecord,
    now: i64,
) -> Result<String, BadgeError> {
    let access = spotify.refresh_access_token(&record.refresh_token).await?;
    let expires = expiry_timestamp(now, access.expires_in);
    store
        .merge_update(
            &record.id,
            &TokenUpdate {
                access_token: Some(access.access_token.clone()),
                token_expired_timestamp: Some(expires),
            },
        )
        .await?;
    slog::info!(
        LOG, "refreshed access token";
        "user_id" => &record.id,
        "expires" => expires,
    );
    record.access_token = access.access_token;
    record.token_expired_timestamp = expires;
    Ok(record.access_token.clone())
}


#[cfg(test)]
mod tests {
    use super::fake::FakeSpotify;
    use super::*;
    use crate::store::memory::{record, MemoryStore};

    #[test]
    fn expiry_keeps_a_safety_margin() {
        assert_eq!(expiry_timestamp(1_000, 3600), 1_000 + 3600 - 30);
    }

    #[async_std::test]
    async fn unexpired_token_is_returned_untouched() {
        let store = MemoryStore::with(vec![record("u1", "t", 1_060)]);
        let spotify = FakeSpotify::new(vec![]);
        let mut rec = store.get("u1").await.unwrap();
        let token = ensure_access_token(&store, &spotify, &mut rec, 1_000)
            .await
            .unwrap();
        assert_eq!(token, "t");
        assert_eq!(spotify.refreshes(), 0);
    }

    #[async_std::test]
    async fn expired_token_is_refreshed_and_persisted() {
        // expiry equal to now counts as expired
        let store = MemoryStore::with(vec![record("u1", "old", 1_000)]);
        let spotify = FakeSpotify::new(vec![]);
        let mut rec = store.get("u1").await.unwrap();
        let token = ensure_access_token(&store, &spotify, &mut rec, 1_000)
            .await
            .unwrap();
        assert_eq!(token, "new");
        assert_eq!(spotify.refreshes(), 1);
        let stored = store.record("u1").await.unwrap();
        assert_eq!(stored.access_token, "new");
        assert_eq!(stored.token_expired_timestamp, 1_000 + 3600 - 30);
        assert_eq!(stored.refresh_token, "r");
        assert_eq!(rec, stored);
    }

    #[async_std::test]
    async fn failed_refresh_leaves_record_alone() {
        let store = MemoryStore::with(vec![record("u1", "old", 0)]);
        let mut spotify = FakeSpotify::new(vec![]);
        spotify.refresh = Err(BadgeError::upstream(Some(400), "invalid_grant"));
        let mut rec = store.get("u1").await.unwrap();
        let err = ensure_access_token(&store, &spotify, &mut rec, 1_000)
            .await
            .unwrap_err();
        assert_eq!(err, BadgeError::upstream(Some(400), "invalid_grant"));
        assert_eq!(store.record("u1").await.unwrap().access_token, "old");
    }
}
