//! # Feed Poller
//!
//! One [`FeedPoller::run_cycle`] walks every stored feed in id order:
//!
//! 1. wait on the rate limiter,
//! 2. read the feed's items through the cache (fetch and parse on a miss),
//! 3. keep items newer than the watermark, oldest first,
//! 4. move the watermark to the newest of those and write the feed back,
//! 5. enqueue one `ChapterNotification` per item.
//!
//! A feed that fails at any step is reported and skipped; the rest of the
//! cycle carries on. Cycles are expected to be serialized by the scheduler,
//! and an overlapping call is skipped rather than run concurrently.
//!
//! Before the dispatcher is asked to stop, the poller must be quiesced with
//! [`FeedPoller::quiesce`]. A cycle still running after the dispatcher closed
//! would persist watermarks for chapters nobody will ever be sent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::dispatcher::Dispatcher;
use crate::core::envelope::{Envelope, OutboundMessage, CHAPTER_NOTIFICATION};
use crate::errors::RelayResult;
use crate::feeds::model::{ChapterItem, ChapterNotification, Feed};
use crate::feeds::parser::FeedParser;
use crate::feeds::store::FeedStore;
use crate::ingestors::item_cache::ItemCache;
use crate::ingestors::rate_limiter::RateLimiter;
use crate::retrieve::fetcher::Fetcher;

/// Pacing and caching knobs.
#[derive(Debug, Clone)]
pub struct PollerOptions {
    /// Feeds processed per window before pausing.
    pub max_rate: u32,
    /// Rate window.
    pub rate_window: Duration,
    /// Pause taken when the window's budget is spent.
    pub rate_pause: Duration,
    /// Item cache lifetime.
    pub cache_ttl: Duration,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            max_rate: 2,
            rate_window: Duration::from_secs(4),
            rate_pause: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Summary of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollReport {
    /// Feeds visited.
    pub feeds: usize,
    /// Notifications enqueued.
    pub notified: usize,
    /// Feeds that failed.
    pub failed: usize,
    /// Whether the cycle was skipped, because another was running or the
    /// poller has been stopped.
    pub skipped: bool,
}

/// Polls feeds and announces new chapters.
#[derive(Debug)]
pub struct FeedPoller {
    store: Arc<dyn FeedStore>,
    fetcher: Fetcher,
    parser: Arc<dyn FeedParser>,
    cache: ItemCache,
    limiter: Mutex<RateLimiter>,
    dispatcher: Arc<Dispatcher>,
    stop: CancellationToken,
}

/// Encodes one chapter announcement.
pub fn chapter_message(feed: &Feed, chapter: ChapterItem) -> RelayResult<OutboundMessage> {
    let envelope = Envelope::wrap(CHAPTER_NOTIFICATION, &ChapterNotification::new(feed, chapter))?;
    OutboundMessage::from_envelope(&envelope)
}

impl FeedPoller {
    /// Wires the poller to its collaborators.
    pub fn new(
        store: Arc<dyn FeedStore>,
        fetcher: Fetcher,
        parser: Arc<dyn FeedParser>,
        dispatcher: Arc<Dispatcher>,
        options: &PollerOptions,
    ) -> Self {
        Self {
            store,
            fetcher,
            parser,
            cache: ItemCache::new(options.cache_ttl),
            limiter: Mutex::new(RateLimiter::new(options.max_rate, options.rate_window, options.rate_pause)),
            dispatcher,
            stop: CancellationToken::new(),
        }
    }

    /// Stops future cycles and waits for a running one to finish the feed it
    /// is on. Everything that cycle announced is enqueued when this returns.
    pub async fn quiesce(&self) {
        self.stop.cancel();
        let _idle = self.limiter.lock().await;
        tracing::info!("feed poller stopped");
    }

    /// Whether [`FeedPoller::quiesce`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// The feed store.
    pub fn store(&self) -> &Arc<dyn FeedStore> {
        &self.store
    }

    /// The item cache.
    pub fn cache(&self) -> &ItemCache {
        &self.cache
    }

    /// Visits every feed once.
    pub async fn run_cycle(&self) -> PollReport {
        let Ok(mut limiter) = self.limiter.try_lock() else {
            tracing::warn!("previous poll cycle still running, skipping");
            return PollReport { skipped: true, ..PollReport::default() };
        };
        if self.stop.is_cancelled() {
            tracing::debug!("poller stopped, skipping cycle");
            return PollReport { skipped: true, ..PollReport::default() };
        }

        let started = Instant::now();
        let feeds = match self.store.list_all_sorted().await {
            Ok(feeds) => feeds,
            Err(e) => {
                self.dispatcher.reporter().report("poll", &e);
                return PollReport { failed: 1, ..PollReport::default() };
            }
        };

        let mut report = PollReport { feeds: feeds.len(), ..PollReport::default() };
        for mut feed in feeds {
            limiter.acquire().await;
            if self.stop.is_cancelled() {
                tracing::info!(feed = feed.unique, "poller stopped mid-cycle, leaving the remaining feeds");
                break;
            }
            match self.get_and_update(&mut feed).await {
                Ok(fresh) => report.notified += self.announce(&feed, fresh),
                Err(e) => {
                    tracing::warn!(feed = feed.unique, error = %e, "feed poll failed");
                    self.dispatcher.reporter().report("poll", &e);
                    report.failed += 1;
                }
            }
        }

        let purged = self.cache.purge_expired(Instant::now());
        tracing::info!(
            feeds = report.feeds,
            notified = report.notified,
            failed = report.failed,
            purged,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "poll cycle finished"
        );
        report
    }

    /// Items for `url`, from the cache or freshly fetched and parsed.
    pub async fn peek(&self, source: &Url) -> RelayResult<Arc<Vec<ChapterItem>>> {
        self.cache
            .get_or_try_insert_with(source.as_str(), || async move {
                let content = self.fetcher.fetch_text(source).await?;
                let channel = self.parser.parse(&content)?;
                ChapterItem::all_from_channel(&channel)
            })
            .await
    }

    /// Returns the items newer than the watermark, oldest first. When there
    /// are any, the watermark moves to the newest and the feed is written back.
    pub async fn get_and_update(&self, feed: &mut Feed) -> RelayResult<Vec<ChapterItem>> {
        let items = self.peek(&feed.source_url()?).await?;
        let mut fresh: Vec<ChapterItem> = items.iter().filter(|i| feed.is_new(i.published_at)).cloned().collect();
        if fresh.is_empty() {
            return Ok(fresh);
        }

        fresh.sort_by_key(|i| i.published_at);
        if let Some(newest) = fresh.last() {
            feed.advance_watermark(newest.published_at);
        }
        self.store.upsert(feed).await?;
        tracing::debug!(feed = feed.unique, fresh = fresh.len(), watermark = %feed.date, "watermark advanced");
        Ok(fresh)
    }

    fn announce(&self, feed: &Feed, fresh: Vec<ChapterItem>) -> usize {
        let mut sent = 0;
        for chapter in fresh {
            match chapter_message(feed, chapter) {
                // A refused message has already been reported by the dispatcher.
                Ok(message) => {
                    if self.dispatcher.enqueue(message).is_ok() {
                        sent += 1;
                    }
                }
                Err(e) => self.dispatcher.reporter().report("notify", &e),
            }
        }
        sent
    }
}
