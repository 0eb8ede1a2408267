/*!
Turning spotify play items into badge markup.

Everything here except `render_badge` is a pure function of its
inputs, the same tracks/theme/width/now always produce byte-identical
markup (and so the same ETag).
*/
use chrono::{DateTime, Utc};

use crate::error::BadgeError;
use crate::images::Inliner;
use crate::models::TrackPlayEvent;
use crate::spotify::PlayItem;

const FONT: &str =
    "-apple-system,BlinkMacSystemFont,Segoe UI,Roboto,Ubuntu,Cantarell,Noto Sans,sans-serif";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Theme {
    /// Compact text list
    Plain,
    /// Spotify styled cards with inlined covers
    Spotify,
}

impl Theme {
    /// Unknown or missing themes get the plain rendering
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("spotify") => Theme::Spotify,
            _ => Theme::Plain,
        }
    }
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Cut `s` to at most `max` characters, marking the cut with an ellipsis
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Items without a track (podcast episodes and the like) are skipped
pub fn to_play_events(items: &[PlayItem], limit: u8) -> Vec<TrackPlayEvent> {
    items
        .iter()
        .filter_map(|item| {
            let track = item.track.as_ref()?;
            Some(TrackPlayEvent {
                title: track.name.clone(),
                artist_names: track.artists.iter().map(|a| a.name.clone()).collect(),
                cover_image_url: track
                    .album
                    .as_ref()
                    .and_then(|a| a.images.first())
                    .map(|i| i.url.clone()),
                played_at: item.played_at.clone(),
            })
        })
        .take(limit as usize)
        .collect()
}

/// "N min. ago" style text, unparsable timestamps are just "now"
pub fn humanize_ago(played_at: &str, now: DateTime<Utc>) -> String {
    let played = match played_at.trim().parse::<DateTime<Utc>>() {
        Ok(t) => t,
        Err(_) => return "now".to_string(),
    };
    let elapsed = (now - played).num_seconds();
    if elapsed < 90 {
        "1 min. ago".to_string()
    } else if elapsed < 3600 {
        format!("{} min. ago", elapsed / 60)
    } else if elapsed < 86400 {
        format!("{} hr. ago", elapsed / 3600)
    } else {
        format!("{} d. ago", elapsed / 86400)
    }
}

/// A track plus its inlined cover, if we managed to fetch one
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub event: TrackPlayEvent,
    pub cover: Option<String>,
}

pub fn render_plain(events: &[TrackPlayEvent], width: u32) -> String {
    let (line_h, pad) = (22, 16);
    let mut lines = vec![format!(
        r#"<text x="0" y="{}" font-size="18" font-weight="bold">Recently played</text>"#,
        pad
    )];
    let mut y = pad + 26;
    if events.is_empty() {
        lines.push(format!(
            r#"<text x="0" y="{}" font-size="14">No recent tracks</text>"#,
            y
        ));
        y += line_h;
    }
    for (i, event) in events.iter().enumerate() {
        let artists = event.artists();
        let line = if artists.is_empty() {
            format!("{}. {}", i + 1, escape(&event.title))
        } else {
            format!("{}. {} — {}", i + 1, escape(&event.title), escape(&artists))
        };
        lines.push(format!(
            r#"<text x="0" y="{}" font-size="14">{}</text>"#,
            y, line
        ));
        y += line_h;
    }
    let height = (y + pad).max(80);
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
<style>text {{ font-family: {font}; fill: #e6edf3; }}</style>
<rect width="100%" height="100%" fill="#0d1117"/>
<g transform="translate(16,8)">{body}</g></svg>"##,
        w = width,
        h = height,
        font = FONT,
        body = lines.join("\n"),
    )
}

pub fn render_spotify(cards: &[Card], width: u32, now: DateTime<Utc>) -> String {
    let (header_h, row_h, cover, pad) = (48, 64, 48, 16);
    // rough characters-per-line budget for 14px text next to the cover
    let max_chars = ((width as usize).saturating_sub(180) / 8).max(12);
    let mut rows = vec![];
    if cards.is_empty() {
        rows.push(format!(
            r#"<text x="{}" y="{}" class="artist">No recent tracks</text>"#,
            pad,
            header_h + 24
        ));
    }
    for (i, card) in cards.iter().enumerate() {
        let y = header_h + i as u32 * row_h;
        let art = match card.cover {
            Some(ref uri) => format!(
                r#"<image href="{}" x="0" y="0" width="{c}" height="{c}" preserveAspectRatio="xMidYMid slice"/>"#,
                escape(uri),
                c = cover
            ),
            None => format!(
                r##"<rect x="0" y="0" width="{c}" height="{c}" rx="4" fill="#282828"/>"##,
                c = cover
            ),
        };
        let ago = match card.event.played_at {
            Some(ref played_at) => format!(
                r#"<text x="{}" y="20" class="ago" text-anchor="end">{}</text>"#,
                width - 2 * pad,
                escape(&humanize_ago(played_at, now))
            ),
            None => String::new(),
        };
        rows.push(format!(
            r#"<g transform="translate({pad},{y})">{art}<text x="{tx}" y="20" class="title">{title}</text><text x="{tx}" y="38" class="artist">{artists}</text>{ago}</g>"#,
            pad = pad,
            y = y,
            art = art,
            tx = cover + 12,
            title = escape(&truncate(&card.event.title, max_chars)),
            artists = escape(&truncate(&card.event.artists(), max_chars)),
            ago = ago,
        ));
    }
    let rows_h = if cards.is_empty() { row_h } else { cards.len() as u32 * row_h };
    let height = (header_h + rows_h + 8).max(100);
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
<style>text {{ font-family: {font}; }} .header {{ font-size: 18px; font-weight: 700; fill: #ffffff; }} .title {{ font-size: 14px; font-weight: 600; fill: #ffffff; }} .artist {{ font-size: 13px; fill: #b3b3b3; }} .ago {{ font-size: 12px; fill: #1db954; }}</style>
<rect width="100%" height="100%" rx="12" fill="#121212"/>
<text x="{pad}" y="30" class="header"><tspan fill="#1db954">Spotify</tspan> · Recently Played</text>
{rows}</svg>"##,
        w = width,
        h = height,
        font = FONT,
        pad = pad,
        rows = rows.join("\n"),
    )
}

/// A placeholder badge describing what went wrong
pub fn render_error(err: &BadgeError, width: u32) -> String {
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="80" viewBox="0 0 {w} 80">
<style>text {{ font-family: {font}; fill: #e6edf3; }}</style>
<rect width="100%" height="100%" fill="#0d1117"/>
<g transform="translate(16,8)"><text x="0" y="16" font-size="18" font-weight="bold">Recently played</text>
<text x="0" y="44" font-size="14">{msg}</text></g></svg>"##,
        w = width,
        font = FONT,
        msg = escape(&err.user_message()),
    )
}

/// Render `events` with `theme`, fetching covers when the theme wants them
pub async fn render_badge(
    events: Vec<TrackPlayEvent>,
    theme: Theme,
    width: u32,
    now: DateTime<Utc>,
    images: &Inliner,
) -> String {
    match theme {
        Theme::Plain => render_plain(&events, width),
        Theme::Spotify => {
            let mut cards = Vec::with_capacity(events.len());
            for event in events {
                let cover = match event.cover_image_url {
                    Some(ref url) => images.fetch_data_uri(url).await,
                    None => None,
                };
                cards.push(Card { event, cover });
            }
            render_spotify(&cards, width, now)
        }
    }
}
