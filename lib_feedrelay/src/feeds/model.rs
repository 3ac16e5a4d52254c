//! # Feed Model
//!
//! A [`Feed`] is a tracked source with a watermark (`date`): the publish time
//! of the newest item already announced. Items strictly newer than the
//! watermark are new. The watermark only moves forward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{RelayError, RelayResult};
use crate::feeds::property::FeedProperty;

/// A tracked feed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    /// Numeric id; feeds are polled in ascending id order.
    pub id: i64,
    /// Unique key clients use to address the feed.
    pub unique: u64,
    /// Display name.
    pub name: String,
    /// Routing metadata carried through to notifications.
    #[serde(default)]
    pub server: u64,
    /// Routing metadata carried through to notifications.
    #[serde(default)]
    pub channel: u64,
    /// Routing metadata carried through to notifications.
    #[serde(default)]
    pub user: u64,
    /// Where the feed document lives.
    pub url: String,
    /// Targets to mention when announcing an item.
    #[serde(default)]
    pub mentions: Vec<u64>,
    /// Watermark.
    pub date: DateTime<Utc>,
}

impl Feed {
    /// The source URL, validated.
    pub fn source_url(&self) -> RelayResult<Url> {
        Url::parse(&self.url).map_err(|e| RelayError::Parse(format!("feed {} url {:?}: {e}", self.unique, self.url)))
    }

    /// Whether an item published at `published` has not been announced yet.
    pub fn is_new(&self, published: DateTime<Utc>) -> bool {
        published > self.date
    }

    /// Moves the watermark to `to` if that is later. Returns whether it moved.
    pub fn advance_watermark(&mut self, to: DateTime<Utc>) -> bool {
        if to > self.date {
            self.date = to;
            true
        } else {
            false
        }
    }
}

/// The story a chapter belongs to. ScribbleHub puts both the numeric story id
/// and the story name in `<category>` elements.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoryCategory {
    /// Non-numeric category text.
    pub name: Option<String>,
    /// Numeric category text.
    pub id: Option<i64>,
}

/// One published chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterItem {
    /// Chapter title.
    pub title: String,
    /// Chapter link.
    pub link: String,
    /// `dc:creator`.
    pub creator: String,
    /// `pubDate`.
    pub published_at: DateTime<Utc>,
    /// Story id and name.
    pub category: StoryCategory,
}

impl ChapterItem {
    /// Builds an item from an `<item>` node.
    pub fn from_property(item: &FeedProperty) -> RelayResult<Self> {
        let mut category = StoryCategory::default();
        for c in item.properties_with_name("category") {
            match (c.as_i64(), c.value()) {
                (Some(id), _) => category.id = Some(id),
                (None, Some(name)) if !name.is_empty() => category.name = Some(name.to_string()),
                _ => {}
            }
        }

        let published_at = item
            .property_with_name("pubDate")
            .and_then(FeedProperty::as_date)
            .ok_or_else(|| RelayError::Parse("<item> has no readable <pubDate>".into()))?;

        Ok(Self {
            title: item.require_text("title")?.to_string(),
            link: item.require_text("link")?.to_string(),
            creator: item.require_text("dc:creator")?.to_string(),
            published_at,
            category,
        })
    }

    /// Every item under a `channel` node, in document order.
    pub fn all_from_channel(channel: &FeedProperty) -> RelayResult<Vec<Self>> {
        channel.properties_with_name("item").map(Self::from_property).collect()
    }
}

/// Broadcast payload announcing one new chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterNotification {
    /// The feed's unique key.
    pub feed: u64,
    /// The feed's display name.
    pub name: String,
    /// Routing metadata from the feed record.
    pub server: u64,
    /// Routing metadata from the feed record.
    pub channel: u64,
    /// Routing metadata from the feed record.
    pub user: u64,
    /// Mention targets from the feed record.
    pub mentions: Vec<u64>,
    /// The chapter itself.
    pub chapter: ChapterItem,
}

impl ChapterNotification {
    /// Pairs an item with the feed it came from.
    pub fn new(feed: &Feed, chapter: ChapterItem) -> Self {
        Self {
            feed: feed.unique,
            name: feed.name.clone(),
            server: feed.server,
            channel: feed.channel,
            user: feed.user,
            mentions: feed.mentions.clone(),
            chapter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item_node(categories: &[&str]) -> FeedProperty {
        let mut children = vec![
            FeedProperty::leaf("title", "Chapter 3"),
            FeedProperty::leaf("link", "https://example.com/3"),
            FeedProperty::leaf("dc:creator", "Someone"),
            FeedProperty::leaf("pubDate", "Wed, 04 Jan 2023 08:00:00 +0000"),
        ];
        children.extend(categories.iter().map(|c| FeedProperty::leaf("category", *c)));
        FeedProperty::new("item", None, children)
    }

    #[test]
    fn numeric_category_is_the_story_id() {
        let item = ChapterItem::from_property(&item_node(&["77", "Story"])).unwrap();
        assert_eq!(item.category, StoryCategory { name: Some("Story".into()), id: Some(77) });
        assert_eq!(item.published_at, Utc.with_ymd_and_hms(2023, 1, 4, 8, 0, 0).unwrap());
        assert_eq!(item.creator, "Someone");
    }

    #[test]
    fn missing_fields_are_parse_errors() {
        let bare = FeedProperty::new("item", None, vec![FeedProperty::leaf("title", "x")]);
        assert!(matches!(ChapterItem::from_property(&bare), Err(RelayError::Parse(_))));
    }

    #[test]
    fn watermark_never_moves_back() {
        let t1 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let mut feed: Feed = serde_json::from_value(serde_json::json!({
            "id": 1, "unique": 9, "name": "F", "url": "https://example.com/f.xml",
            "date": t1.to_rfc3339()
        }))
        .unwrap();
        assert!(feed.mentions.is_empty());
        assert!(!feed.advance_watermark(t1 - chrono::Duration::days(1)));
        assert!(!feed.is_new(t1));
        assert!(feed.advance_watermark(t1 + chrono::Duration::days(1)));
        assert_eq!(feed.date, t1 + chrono::Duration::days(1));
    }
}
