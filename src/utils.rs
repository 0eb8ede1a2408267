pub const DEFAULT_LIMIT: u8 = 5;
pub const MAX_LIMIT: u8 = 10;

pub const DEFAULT_WIDTH: u32 = 700;
pub const DEFAULT_PNG_WIDTH: u32 = 920;
pub const MIN_WIDTH: u32 = 320;
pub const MAX_WIDTH: u32 = 1200;

#[cfg(test)]
pub fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Number of tracks to show, always in `[1, MAX_LIMIT]`.
/// Missing or non-numeric input gets the default.
pub fn parse_limit(raw: Option<&str>) -> u8 {
    match raw.map(|s| s.trim().parse::<i64>()) {
        Some(Ok(n)) => n.max(1).min(MAX_LIMIT as i64) as u8,
        _ => DEFAULT_LIMIT,
    }
}

/// Badge width in pixels, always in `[MIN_WIDTH, MAX_WIDTH]`.
/// Missing or non-numeric input gets `default`.
pub fn parse_width(raw: Option<&str>, default: u32) -> u32 {
    match raw.map(|s| s.trim().parse::<i64>()) {
        Some(Ok(n)) => n.max(MIN_WIDTH as i64).min(MAX_WIDTH as i64) as u32,
        _ => default,
    }
}

/// Strip everything but ascii letters and digits from a user id
pub fn sanitize_uid(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}
