/*!
Fetching album covers and inlining them as `data:` URIs.

Badges are embedded in places that won't load external images,
so the richer theme needs covers baked into the markup.
*/
use async_mutex::Mutex;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{se, LOG};

pub const CACHE_TTL: Duration = Duration::from_secs(600);
pub const CACHE_MAX_ENTRIES: usize = 256;

struct CacheEntry {
    expires_at: Instant,
    data_uri: String,
}

/// Small fixed-capacity map of url -> data uri with per-entry expiry.
/// Overflow evicts whichever entry expires first.
pub struct ImageCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl ImageCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries,
        }
    }

    pub fn get(&self, url: &str, now: Instant) -> Option<String> {
        self.entries
            .get(url)
            .filter(|e| e.expires_at > now)
            .map(|e| e.data_uri.clone())
    }

    pub fn insert(&mut self, url: String, data_uri: String, now: Instant) {
        self.entries.insert(
            url,
            CacheEntry {
                expires_at: now + self.ttl,
                data_uri,
            },
        );
        if self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct FetchedImage {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn get(&self, url: &str) -> crate::Result<FetchedImage>;
}

pub struct HttpImageSource {
    timeout: Duration,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn get(&self, url: &str) -> crate::Result<FetchedImage> {
        let mut resp = async_std::future::timeout(self.timeout, surf::get(url).send())
            .await
            .map_err(|_| se!("image request timed out {}", url))?
            .map_err(|e| se!("image request error {} {}", url, e))?;
        let status = resp.status() as u16;
        let content_type = resp.header("content-type").map(|v| v.as_str().to_string());
        let bytes = resp
            .body_bytes()
            .await
            .map_err(|e| se!("image body error {} {}", url, e))?;
        Ok(FetchedImage {
            status,
            content_type,
            bytes,
        })
    }
}

pub fn to_data_uri(content_type: Option<&str>, bytes: &[u8]) -> String {
    let ctype = content_type
        .and_then(|c| c.split(';').next())
        .map(str::trim)
        .filter(|c| c.starts_with("image/"))
        .unwrap_or("image/jpeg");
    format!("data:{};base64,{}", ctype, base64::encode(bytes))
}

pub struct Inliner {
    cache: Mutex<ImageCache>,
    source: Arc<dyn ImageSource>,
}

impl Inliner {
    pub fn new(source: Arc<dyn ImageSource>) -> Self {
        Self {
            cache: Mutex::new(ImageCache::new(CACHE_TTL, CACHE_MAX_ENTRIES)),
            source,
        }
    }

    /// The image at `url` as a `data:` URI, `None` if it couldn't be fetched.
    /// A 5xx answer gets one retry. Failures aren't cached.
    pub async fn fetch_data_uri(&self, url: &str) -> Option<String> {
        if url.is_empty() {
            return None;
        }
        if let Some(hit) = self.cache.lock().await.get(url, Instant::now()) {
            return Some(hit);
        }
        for attempt in 0..2 {
            let image = match self.source.get(url).await {
                Ok(image) => image,
                Err(e) => {
                    slog::debug!(LOG, "cover fetch failed"; "url" => url, "error" => e.to_string());
                    return None;
                }
            };
            if image.status >= 500 && attempt == 0 {
                continue;
            }
            if image.status != 200 {
                slog::debug!(LOG, "cover fetch rejected"; "url" => url, "status" => image.status);
                return None;
            }
            let data_uri = to_data_uri(image.content_type.as_deref(), &image.bytes);
            self.cache
                .lock()
                .await
                .insert(url.to_string(), data_uri.clone(), Instant::now());
            return Some(data_uri);
        }
        None
    }
}
