use async_trait::async_trait;
use std::time::Duration;

use crate::error::BadgeError;
use crate::{Config, LOG};

fn default_expires_in() -> u64 {
    3600
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct SpotifyAccess {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    // spotify only sometimes hands out a new refresh token, we keep using the old one
    pub refresh_token: Option<String>,
}

#[derive(serde::Serialize)]
struct RefreshParams {
    grant_type: String,
    refresh_token: String,
}

impl RefreshParams {
    fn from_token(token: &str) -> Self {
        RefreshParams {
            grant_type: "refresh_token".to_string(),
            refresh_token: token.to_string(),
        }
    }
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct RecentlyPlayed {
    #[serde(default)]
    pub items: Vec<PlayItem>,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct PlayItem {
    #[serde(default)]
    pub track: Option<Track>,
    #[serde(default)]
    pub played_at: Option<String>,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct Track {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Option<Album>,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct Artist {
    #[serde(default)]
    pub name: String,
}

#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct Album {
    #[serde(default)]
    pub images: Vec<AlbumImage>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct AlbumImage {
    pub url: String,
}

/// The parts of the spotify API the badge needs
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    /// Mint a new access token from a user's refresh token
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<SpotifyAccess, BadgeError>;

    /// Most recent plays first, at most `limit` of them
    async fn recently_played(&self, access_token: &str, limit: u8)
        -> Result<Vec<PlayItem>, BadgeError>;
}

/// Map a non-success status to the matching error, `None` for 2xx
pub fn classify_status(status: u16, body: String) -> Option<BadgeError> {
    match status {
        200..=299 => None,
        401 => Some(BadgeError::InvalidToken),
        429 => Some(BadgeError::RateLimited),
        _ => Some(BadgeError::upstream(Some(status), body)),
    }
}

pub struct SpotifyClient {
    client_id: String,
    secret_id: String,
    accounts_url: String,
    api_url: String,
    timeout: Duration,
}

impl SpotifyClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client_id: config.spotify_client_id.clone(),
            secret_id: config.spotify_secret_id.clone(),
            accounts_url: config.spotify_accounts_url.clone(),
            api_url: config.spotify_api_url.clone(),
            timeout: config.upstream_timeout,
        }
    }

    fn basic_auth(&self) -> String {
        basic_auth(&self.client_id, &self.secret_id)
    }

    async fn send(&self, req: surf::RequestBuilder) -> Result<surf::Response, BadgeError> {
        match async_std::future::timeout(self.timeout, req.send()).await {
            Err(_) => Err(BadgeError::UpstreamTimeout),
            Ok(Err(e)) if e.status() == surf::StatusCode::RequestTimeout => {
                Err(BadgeError::UpstreamTimeout)
            }
            Ok(Err(e)) => Err(BadgeError::upstream(None, format!("request error {}", e))),
            Ok(Ok(resp)) => Ok(resp),
        }
    }

    /// Turn non-2xx responses into errors, passing successful ones through
    async fn check(&self, mut resp: surf::Response) -> Result<surf::Response, BadgeError> {
        let status = resp.status() as u16;
        if (200..300).contains(&status) {
            return Ok(resp);
        }
        let body = resp.body_string().await.unwrap_or_default();
        slog::warn!(
            LOG, "spotify request failed";
            "status" => status,
            "body" => &body,
        );
        match classify_status(status, body) {
            Some(e) => Err(e),
            None => Ok(resp),
        }
    }
}

pub fn basic_auth(client_id: &str, secret_id: &str) -> String {
    base64::encode(format!("{}:{}", client_id, secret_id).as_bytes())
}

#[async_trait]
impl SpotifyApi for SpotifyClient {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<SpotifyAccess, BadgeError> {
        let body = surf::Body::from_form(&RefreshParams::from_token(refresh_token))
            .map_err(|e| BadgeError::upstream(None, format!("form error {}", e)))?;
        let req = surf::post(format!("{}/api/token", self.accounts_url))
            .body(body)
            .header("authorization", format!("Basic {}", self.basic_auth()));
        let resp = self.send(req).await?;
        let mut resp = self.check(resp).await?;
        let status = resp.status() as u16;
        let access: SpotifyAccess = resp.body_json().await.map_err(|e| {
            BadgeError::upstream(Some(status), format!("account refresh json error {}", e))
        })?;
        Ok(access)
    }

    async fn recently_played(
        &self,
        access_token: &str,
        limit: u8,
    ) -> Result<Vec<PlayItem>, BadgeError> {
        let req = surf::get(format!(
            "{}/me/player/recently-played?limit={}",
            self.api_url, limit
        ))
        .header("authorization", format!("Bearer {}", access_token));
        let resp = self.send(req).await?;
        if resp.status() == surf::StatusCode::NoContent {
            return Ok(vec![]);
        }
        let mut resp = self.check(resp).await?;
        let status = resp.status() as u16;
        let recent: RecentlyPlayed = resp.body_json().await.map_err(|e| {
            BadgeError::upstream(Some(status), format!("recently played json error {}", e))
        })?;
        Ok(recent.items)
    }
}
