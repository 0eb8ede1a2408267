/*!
Fetching a user's recently played tracks, refreshing credentials as needed
*/
use crate::error::BadgeError;
use crate::spotify::{PlayItem, SpotifyApi};
use crate::store::CredentialStore;
use crate::{tokens, utils, LOG};

/// Work out whose badge to render.
///
/// An explicit id is reduced to its alphanumeric characters. Without
/// one we fall back to the only stored user, if there is exactly one.
pub async fn resolve_user_id(
    store: &dyn CredentialStore,
    explicit: Option<&str>,
) -> Result<String, BadgeError> {
    if let Some(raw) = explicit {
        let uid = utils::sanitize_uid(raw);
        if uid.is_empty() {
            return Err(BadgeError::NoUserSpecified);
        }
        return Ok(uid);
    }
    store
        .sole_user_id()
        .await?
        .ok_or(BadgeError::NoUserSpecified)
}

/// Load credentials, make sure they're fresh and ask spotify for recent plays.
///
/// If spotify rejects a token we thought was still good, it's refreshed
/// once and the fetch retried once. A second rejection is returned as is.
pub async fn get_recent_tracks(
    store: &dyn CredentialStore,
    spotify: &dyn SpotifyApi,
    user_id: &str,
    limit: u8,
    now: i64,
) -> Result<Vec<PlayItem>, BadgeError> {
    let mut record = store.get(user_id).await?;
    let token = tokens::ensure_access_token(store, spotify, &mut record, now).await?;
    match spotify.recently_played(&token, limit).await {
        Err(BadgeError::InvalidToken) => {
            slog::warn!(
                LOG, "spotify rejected unexpired access token, forcing refresh";
                "user_id" => user_id,
                "expires" => record.token_expired_timestamp,
            );
            let token = tokens::force_refresh(store, spotify, &mut record, now).await?;
            spotify.recently_played(&token, limit).await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::{PlayItem, Track};
    use crate::store::memory::{record, MemoryStore};
    use crate::tokens::fake::FakeSpotify;

    fn item(name: &str) -> PlayItem {
        PlayItem {
            track: Some(Track {
                name: name.to_string(),
                ..Track::default()
            }),
            played_at: None,
        }
    }

    #[async_std::test]
    async fn explicit_uid_is_sanitized() {
        let store = MemoryStore::with(vec![]);
        assert_eq!(
            resolve_user_id(&store, Some("u-1!")).await.unwrap(),
            "u1".to_string()
        );
        assert_eq!(
            resolve_user_id(&store, Some("../")).await,
            Err(BadgeError::NoUserSpecified)
        );
    }

    #[async_std::test]
    async fn missing_uid_uses_the_only_user() {
        let one = MemoryStore::with(vec![record("solo", "t", 0)]);
        assert_eq!(resolve_user_id(&one, None).await.unwrap(), "solo");

        let none = MemoryStore::with(vec![]);
        assert_eq!(
            resolve_user_id(&none, None).await,
            Err(BadgeError::NoUserSpecified)
        );

        let many = MemoryStore::with(vec![record("a", "t", 0), record("b", "t", 0)]);
        assert_eq!(
            resolve_user_id(&many, None).await,
            Err(BadgeError::NoUserSpecified)
        );
    }

    #[async_std::test]
    async fn valid_token_fetches_once() {
        let store = MemoryStore::with(vec![record("u1", "t", 1_060)]);
        let spotify = FakeSpotify::new(vec![Ok(vec![item("a"), item("b")])]);
        let items = get_recent_tracks(&store, &spotify, "u1", 2, 1_000)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(spotify.refreshes(), 0);
        assert_eq!(spotify.fetches(), 1);
        assert_eq!(*spotify.tokens_seen.lock().await, vec!["t".to_string()]);
        assert_eq!(*spotify.limits_seen.lock().await, vec![2]);
    }

    #[async_std::test]
    async fn expired_token_is_refreshed_before_fetch() {
        let store = MemoryStore::with(vec![record("u1", "old", 900)]);
        let spotify = FakeSpotify::new(vec![Ok(vec![item("a")])]);
        get_recent_tracks(&store, &spotify, "u1", 5, 1_000)
            .await
            .unwrap();
        assert_eq!(spotify.refreshes(), 1);
        assert_eq!(*spotify.tokens_seen.lock().await, vec!["new".to_string()]);
        let stored = store.record("u1").await.unwrap();
        assert_eq!(stored.access_token, "new");
        assert_eq!(stored.token_expired_timestamp, 1_000 + 3600 - 30);
    }

    #[async_std::test]
    async fn rejected_token_is_refreshed_and_retried_once() {
        let store = MemoryStore::with(vec![record("u1", "old", 1_060)]);
        let spotify = FakeSpotify::new(vec![Err(BadgeError::InvalidToken), Ok(vec![item("a")])]);
        let items = get_recent_tracks(&store, &spotify, "u1", 5, 1_000)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(spotify.refreshes(), 1);
        assert_eq!(spotify.fetches(), 2);
        assert_eq!(
            *spotify.tokens_seen.lock().await,
            vec!["old".to_string(), "new".to_string()]
        );
        assert_eq!(store.record("u1").await.unwrap().access_token, "new");
    }

    #[async_std::test]
    async fn second_rejection_is_not_retried() {
        let store = MemoryStore::with(vec![record("u1", "old", 1_060)]);
        let spotify = FakeSpotify::new(vec![Err(BadgeError::InvalidToken)]);
        let err = get_recent_tracks(&store, &spotify, "u1", 5, 1_000)
            .await
            .unwrap_err();
        assert_eq!(err, BadgeError::InvalidToken);
        assert_eq!(spotify.refreshes(), 1);
        assert_eq!(spotify.fetches(), 2);
    }

    #[async_std::test]
    async fn other_errors_are_not_retried() {
        let store = MemoryStore::with(vec![record("u1", "t", 1_060)]);
        let spotify = FakeSpotify::new(vec![Err(BadgeError::RateLimited)]);
        let err = get_recent_tracks(&store, &spotify, "u1", 5, 1_000)
            .await
            .unwrap_err();
        assert_eq!(err, BadgeError::RateLimited);
        assert_eq!(spotify.refreshes(), 0);
        assert_eq!(spotify.fetches(), 1);
    }

    #[async_std::test]
    async fn unknown_user_never_reaches_spotify() {
        let store = MemoryStore::with(vec![]);
        let spotify = FakeSpotify::new(vec![]);
        let err = get_recent_tracks(&store, &spotify, "ghost", 5, 1_000)
            .await
            .unwrap_err();
        assert_eq!(err, BadgeError::UserNotFound("ghost".to_string()));
        assert_eq!(spotify.fetches(), 0);
    }
}
