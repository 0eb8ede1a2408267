/*!
Failures that can happen while building a badge.

None of these become an http error status, they are all
rendered into the badge itself (see `render::render_error`).
*/
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum BadgeError {
    /// No `uid` given and the store doesn't hold exactly one user
    NoUserSpecified,
    UserNotFound(String),
    StorageUnavailable(String),
    /// Spotify rejected a token we believed to still be valid
    InvalidToken,
    RateLimited,
    UpstreamTimeout,
    /// Any other non-2xx answer from spotify. `status` is `None` when
    /// the request never produced a usable response.
    UpstreamError { status: Option<u16>, body: String },
}

impl BadgeError {
    pub fn upstream<S: Into<String>>(status: Option<u16>, body: S) -> Self {
        BadgeError::UpstreamError {
            status,
            body: body.into(),
        }
    }

    /// Short message that is safe to show in the rendered badge
    pub fn user_message(&self) -> String {
        match self {
            BadgeError::NoUserSpecified => "Please provide ?uid=...".to_string(),
            BadgeError::UserNotFound(id) => format!("User not found: {}", id),
            BadgeError::StorageUnavailable(_) => {
                "Token storage is unavailable, try again later".to_string()
            }
            BadgeError::InvalidToken => {
                "Spotify rejected the access token, please log in again".to_string()
            }
            BadgeError::RateLimited => "Spotify rate limit reached, try again later".to_string(),
            BadgeError::UpstreamTimeout => "Spotify took too long to respond".to_string(),
            BadgeError::UpstreamError {
                status: Some(status),
                ..
            } => format!("Spotify error ({})", status),
            BadgeError::UpstreamError { status: None, .. } => {
                "Could not reach Spotify".to_string()
            }
        }
    }

    /// Stable short name used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            BadgeError::NoUserSpecified => "no_user_specified",
            BadgeError::UserNotFound(_) => "user_not_found",
            BadgeError::StorageUnavailable(_) => "storage_unavailable",
            BadgeError::InvalidToken => "invalid_token",
            BadgeError::RateLimited => "rate_limited",
            BadgeError::UpstreamTimeout => "upstream_timeout",
            BadgeError::UpstreamError { .. } => "upstream_error",
        }
    }
}

impl fmt::Display for BadgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadgeError::NoUserSpecified => write!(f, "no user id specified"),
            BadgeError::UserNotFound(id) => write!(f, "user {} not found", id),
            BadgeError::StorageUnavailable(msg) => write!(f, "storage unavailable: {}", msg),
            BadgeError::InvalidToken => write!(f, "invalid or expired access token"),
            BadgeError::RateLimited => write!(f, "rate limited by spotify"),
            BadgeError::UpstreamTimeout => write!(f, "spotify request timed out"),
            BadgeError::UpstreamError { status, body } => {
                write!(f, "spotify error status={:?} body={}", status, body)
            }
        }
    }
}

impl std::error::Error for BadgeError {}

impl From<sqlx::Error> for BadgeError {
    fn from(e: sqlx::Error) -> Self {
        BadgeError::StorageUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_message_mentions_rate_limit() {
        let msg = BadgeError::RateLimited.user_message().to_lowercase();
        assert!(msg.contains("rate limit"));
    }

    #[test]
    fn upstream_message_includes_status() {
        let e = BadgeError::upstream(Some(503), "unavailable");
        assert_eq!(e.user_message(), "Spotify error (503)");
        assert_eq!(
            BadgeError::upstream(None, "dns").user_message(),
            "Could not reach Spotify"
        );
    }

    #[test]
    fn database_errors_are_storage_unavailable() {
        let e = BadgeError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(e.kind(), "storage_unavailable");
        assert!(!e.user_message().contains("pool"));
    }
}
