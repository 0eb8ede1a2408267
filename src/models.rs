#[derive(sqlx::FromRow, Debug, Clone, PartialEq)]
pub struct UserTokenRecord {
    // alphanumeric user identifier, primary key
    pub id: String,
    // current spotify bearer token
    pub access_token: String,
    // long lived token used to mint new access tokens. This
    // never leaves the service.
    pub refresh_token: String,
    // timestamp in seconds from epoch after which `access_token`
    // must be treated as expired. Always stored slightly earlier
    // than what spotify reports.
    pub token_expired_timestamp: i64,
}

/// Partial update of a user record, `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenUpdate {
    pub access_token: Option<String>,
    pub token_expired_timestamp: Option<i64>,
}

/// A single recently played track, ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPlayEvent {
    pub title: String,
    pub artist_names: Vec<String>,
    pub cover_image_url: Option<String>,
    // raw ISO-8601 timestamp as reported by spotify
    pub played_at: Option<String>,
}

impl TrackPlayEvent {
    pub fn artists(&self) -> String {
        self.artist_names.join(", ")
    }
}
