//! # Data Ingestors Module
//!
//! The feed polling side of the gateway. One poll cycle walks every feed in
//! id order, paced by the rate limiter, reading each feed through the item
//! cache and announcing anything newer than the feed's watermark.
//!
//! ## Contained Modules:
//! - **`rate_limiter`**: burst pacing across feeds within one cycle.
//! - **`item_cache`**: short-lived parsed items per feed URL.
//! - **`feed_poller`**: the cycle itself, plus the diff-and-persist step the
//!   inbound feed test reuses.

/// Burst pacing for the poll loop.
pub mod rate_limiter;
/// Read-through cache of parsed feed items.
pub mod item_cache;
/// Poll cycles, novelty diffing and notification.
pub mod feed_poller;

pub use feed_poller::{FeedPoller, PollReport, PollerOptions};
pub use item_cache::ItemCache;
pub use rate_limiter::{Acquire, RateLimiter};
