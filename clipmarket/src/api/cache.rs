//! Read-through response cache with per-entry time-to-live.

use super::envelope::ApiResponse;
use crate::observer::lock;
use std::{
    any::Any,
    collections::HashMap,
    future::Future,
    sync::Mutex,
    time::Duration,
};
use tokio::time::Instant;

/// Time-to-live used when callers have no better figure
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    data: Box<dyn Any + Send + Sync>,
    /// `None` when the TTL reaches past the clock's range
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

/// In-memory `key -> {data, expires_at}` map.
///
/// Expired entries are evicted when they are next looked up; there is no
/// background sweep, so [`ResponseCache::len`] may count expired entries.
#[derive(Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`, if present, unexpired and of type `T`
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let mut entries = lock(&self.entries);
        let entry = entries.get(key)?;

        if entry.is_expired(Instant::now()) {
            log::debug!("Cache entry '{}' expired", key);
            entries.remove(key);
            return None;
        }

        let value = entry.data.downcast_ref::<T>().cloned();
        if value.is_none() {
            log::warn!("Cache entry '{}' holds a different type than requested", key);
        }
        value
    }

    /// Store `data` under `key` for `ttl`. A TTL too large to represent
    /// never expires.
    pub fn insert<T: Clone + Send + Sync + 'static>(&self, key: impl Into<String>, data: T, ttl: Duration) {
        let entry = CacheEntry {
            data: Box::new(data),
            expires_at: Instant::now().checked_add(ttl),
        };
        lock(&self.entries).insert(key.into(), entry);
    }

    /// Serve `key` from the cache, or run `operation` and cache its data if
    /// it succeeded.
    ///
    /// A hit is returned as a successful envelope without invoking
    /// `operation`. Failed responses are never cached.
    pub async fn with_cache<T, F, Fut>(&self, key: &str, ttl: Duration, operation: F) -> ApiResponse<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResponse<T>>,
    {
        if let Some(data) = self.get::<T>(key) {
            log::debug!("Cache hit for '{}'", key);
            return ApiResponse::ok(data);
        }

        let response = operation().await;
        if response.success
            && let Some(data) = &response.data
        {
            self.insert(key, data.clone(), ttl);
        }
        response
    }

    /// Drop one entry; returns whether it existed
    pub fn invalidate(&self, key: &str) -> bool {
        lock(&self.entries).remove(key).is_some()
    }

    /// Drop every entry whose key starts with `prefix`; returns how many
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Drop every entry
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
