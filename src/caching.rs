/*!
ETag + Cache-Control handling for rendered badges
*/
use crate::crypto;

pub const CACHE_CONTROL: &str = "public, max-age=60, stale-while-revalidate=30";
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml; charset=utf-8";
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Strong validator: the quoted sha256 of the markup
pub fn etag(markup: &str) -> String {
    format!("\"{}\"", crypto::hash_hex(markup.as_bytes()))
}

/// Weak validator for representations derived from `markup`
/// (the png). Same markup, same tag, whatever the rasterizer does.
pub fn weak_etag(markup: &str) -> String {
    format!("W/\"{}\"", base64::encode(crypto::sha1(markup.as_bytes())))
}

fn opaque_tag(tag: &str) -> &str {
    tag.trim_start_matches("W/")
}

/// Whether an `If-None-Match` header value matches `etag`.
/// Handles lists of tags, weak tags and `*`.
pub fn is_not_modified(if_none_match: Option<&str>, etag: &str) -> bool {
    match if_none_match {
        None => false,
        Some(header) => header
            .split(',')
            .map(str::trim)
            .any(|tag| tag == "*" || opaque_tag(tag) == opaque_tag(etag)),
    }
}

pub fn not_modified(etag: &str) -> tide::Response {
    tide::Response::builder(304)
        .header("etag", etag)
        .header("cache-control", CACHE_CONTROL)
        .build()
}

/// A cacheable `200` carrying `body` and its validator
pub fn cacheable(body: impl Into<tide::Body>, content_type: &str, etag: &str) -> tide::Response {
    tide::Response::builder(200)
        .body(body)
        .header("content-type", content_type)
        .header("etag", etag)
        .header("cache-control", CACHE_CONTROL)
        .build()
}

/// Build the response for `markup`, answering `304` when the
/// client already holds this exact content.
pub fn svg_response(markup: String, if_none_match: Option<&str>) -> tide::Response {
    let etag = etag(&markup);
    if is_not_modified(if_none_match, &etag) {
        return not_modified(&etag);
    }
    cacheable(markup, SVG_CONTENT_TYPE, &etag)
}
