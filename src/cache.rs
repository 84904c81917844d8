use crate::error::ScrapeError;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::time::Duration;
#[cfg(feature = "cache")]
use tracing::debug;

#[cfg(feature = "cache")]
use dashmap::DashMap;
#[cfg(feature = "cache")]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(feature = "cache")]
use std::sync::Arc;
#[cfg(feature = "cache")]
use tokio::time::Instant;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const KEY_PREFIX: &str = "scrape:";

/// `MemoryCache` sweeps expired entries once per this many writes.
#[cfg(feature = "cache")]
const SWEEP_EVERY: usize = 1024;

/// Cache key for a normalized URL. Case and surrounding whitespace do not matter.
pub fn cache_key(url: &str) -> String {
    let normalized = url.trim().to_lowercase();
    format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(normalized.as_bytes()))
}

/// Recovers the (lower-cased) URL from a key built by [`cache_key`].
pub fn decode_cache_key(key: &str) -> Option<String> {
    let encoded = key.strip_prefix(KEY_PREFIX)?;
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// Key/value store with per-entry expiry, shaped after a Redis `GET`/`SET EX` pair.
///
/// Values are serialized JSON; callers treat undecodable values as misses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ScrapeError>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), ScrapeError>;
}

/// Caches nothing. Every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl CacheStore for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, ScrapeError> {
        Ok(None)
    }

    async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), ScrapeError> {
        Ok(())
    }
}

#[cfg(feature = "cache")]
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, (String, Instant)>>,
    writes: Arc<AtomicUsize>,
}

#[cfg(feature = "cache")]
impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires)| *expires > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Purged expired cache entries");
        }
        removed
    }
}

#[cfg(feature = "cache")]
#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, ScrapeError> {
        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(entry) if entry.1 > now => Some(entry.0.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        if hit.is_none() {
            self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
        }
        Ok(hit)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), ScrapeError> {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired();
        }
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}
