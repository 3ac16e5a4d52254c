//! # Feeds
//!
//! Feed records and what is extracted from their content.
//!
//! - **`model`**: [`Feed`](model::Feed), [`ChapterItem`](model::ChapterItem) and the
//!   outbound [`ChapterNotification`](model::ChapterNotification).
//! - **`property`**: the generic name/value tree parsed documents become.
//! - **`parser`**: RSS 2.0 to property tree.
//! - **`store`**: the feed record store interface and its in-memory implementation.

/// Feed records, chapter items and notifications.
pub mod model;
/// RSS parsing into a property tree.
pub mod parser;
/// Queryable name/value tree.
pub mod property;
/// Feed record persistence.
pub mod store;

pub use model::{ChapterItem, ChapterNotification, Feed, StoryCategory};
pub use parser::{FeedParser, RssParser};
pub use property::FeedProperty;
pub use store::{FeedStore, MemoryFeedStore};
