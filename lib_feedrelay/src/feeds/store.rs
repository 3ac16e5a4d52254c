//! # Feed Store
//!
//! Where feed records and their watermarks live. The poller only needs three
//! operations: look a feed up by its unique key, write one back, and list
//! them all ordered by id.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::{RelayError, RelayResult};
use crate::feeds::model::Feed;

/// Persistent feed records.
#[async_trait]
pub trait FeedStore: Send + Sync + fmt::Debug {
    /// The feed with this unique key, if any.
    async fn get_by_unique(&self, unique: u64) -> RelayResult<Option<Feed>>;
    /// Inserts or replaces the record with the same id.
    async fn upsert(&self, feed: &Feed) -> RelayResult<()>;
    /// Every feed, ascending by id.
    async fn list_all_sorted(&self) -> RelayResult<Vec<Feed>>;
}

/// Process-local store, optionally seeded from a JSON array of feeds.
#[derive(Debug, Default)]
pub struct MemoryFeedStore {
    feeds: RwLock<BTreeMap<i64, Feed>>,
}

impl MemoryFeedStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `feeds`.
    pub fn with_feeds(feeds: impl IntoIterator<Item = Feed>) -> Self {
        Self { feeds: RwLock::new(feeds.into_iter().map(|f| (f.id, f)).collect()) }
    }

    /// Reads a JSON array of feed records.
    pub async fn from_json_file(path: &Path) -> RelayResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RelayError::Store(format!("reading {}: {e}", path.display())))?;
        let feeds: Vec<Feed> = serde_json::from_str(&raw)
            .map_err(|e| RelayError::Store(format!("parsing {}: {e}", path.display())))?;
        tracing::info!(count = feeds.len(), path = %path.display(), "feeds loaded");
        Ok(Self::with_feeds(feeds))
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn get_by_unique(&self, unique: u64) -> RelayResult<Option<Feed>> {
        Ok(self.feeds.read().await.values().find(|f| f.unique == unique).cloned())
    }

    async fn upsert(&self, feed: &Feed) -> RelayResult<()> {
        self.feeds.write().await.insert(feed.id, feed.clone());
        Ok(())
    }

    async fn list_all_sorted(&self) -> RelayResult<Vec<Feed>> {
        Ok(self.feeds.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Write;

    fn feed(id: i64, unique: u64) -> Feed {
        Feed {
            id,
            unique,
            name: format!("feed {id}"),
            server: 0,
            channel: 0,
            user: 0,
            url: format!("https://example.com/{id}.xml"),
            mentions: vec![],
            date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lists_by_id_and_upserts_in_place() {
        let store = MemoryFeedStore::with_feeds([feed(3, 30), feed(1, 10), feed(2, 20)]);
        let ids: Vec<i64> = store.list_all_sorted().await.unwrap().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let mut changed = feed(2, 20);
        changed.name = "renamed".into();
        store.upsert(&changed).await.unwrap();
        assert_eq!(store.get_by_unique(20).await.unwrap().unwrap().name, "renamed");
        assert_eq!(store.list_all_sorted().await.unwrap().len(), 3);
        assert!(store.get_by_unique(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seeds_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":5,"unique":50,"name":"Story","url":"https://example.com/s.xml","mentions":[1,2],"date":"2023-01-01T00:00:00Z"}}]"#
        )
        .unwrap();
        let store = MemoryFeedStore::from_json_file(file.path()).await.unwrap();
        let f = store.get_by_unique(50).await.unwrap().unwrap();
        assert_eq!(f.mentions, vec![1, 2]);
    }

    #[tokio::test]
    async fn bad_seed_file_is_a_store_error() {
        let missing = MemoryFeedStore::from_json_file(Path::new("/definitely/not/here.json")).await;
        assert!(matches!(missing, Err(RelayError::Store(_))));
    }
}
