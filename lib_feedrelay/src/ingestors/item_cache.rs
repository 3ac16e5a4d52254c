//! # Item Cache
//!
//! Parsed items per feed URL, kept for a fixed time from when they were
//! written. The TTL is shorter than the poll period, so each poll cycle reads
//! fresh content while repeated lookups inside one cycle (or a feed test right
//! after a poll) reuse it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::errors::RelayResult;
use crate::feeds::model::ChapterItem;

#[derive(Debug, Clone)]
struct CacheEntry {
    items: Arc<Vec<ChapterItem>>,
    written_at: Instant,
}

/// URL to parsed items with a write-time TTL.
#[derive(Debug)]
pub struct ItemCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ItemCache {
    /// An empty cache.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// The configured lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live items for `url`. An expired entry is dropped on the way.
    pub fn get(&self, url: &str, now: Instant) -> Option<Arc<Vec<ChapterItem>>> {
        let mut entries = self.entries();
        match entries.get(url) {
            Some(entry) if now.duration_since(entry.written_at) < self.ttl => Some(Arc::clone(&entry.items)),
            Some(_) => {
                entries.remove(url);
                None
            }
            None => None,
        }
    }

    /// Stores items for `url`, replacing any previous entry.
    pub fn insert(&self, url: &str, items: Arc<Vec<ChapterItem>>, now: Instant) {
        self.entries().insert(url.to_string(), CacheEntry { items, written_at: now });
    }

    /// Returns cached items, or runs `load`, stores its result and returns that.
    /// A failed load stores nothing.
    pub async fn get_or_try_insert_with<F, Fut>(&self, url: &str, load: F) -> RelayResult<Arc<Vec<ChapterItem>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RelayResult<Vec<ChapterItem>>>,
    {
        if let Some(items) = self.get(url, Instant::now()) {
            tracing::trace!(url, "item cache hit");
            return Ok(items);
        }
        let items = Arc::new(load().await?);
        self.insert(url, Arc::clone(&items), Instant::now());
        Ok(items)
    }

    /// Drops every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.written_at) < self.ttl);
        before - entries.len()
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
