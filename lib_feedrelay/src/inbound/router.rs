//! # Inbound Router
//!
//! Handles each text frame a client sends:
//!
//! - while the gateway is closing, every frame gets the plain "not accepted"
//!   reply and nothing else happens;
//! - `PING` (any case) is answered with `PONG`;
//! - anything else must be an envelope whose tag names an [`InboundRequest`].
//!   Its handler runs on its own task and replies only to the sender.
//!
//! Decode and handler failures are reported and answered with a
//! `GatewayError` envelope to the sender. Tags no variant claims are dropped.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::core::defaults::{UNACCEPTED_CLOSING, UNKNOWN_EXCEPTION};
use crate::core::dispatcher::Dispatcher;
use crate::core::envelope::Envelope;
use crate::core::session::SessionHandle;
use crate::errors::{RelayError, RelayResult};
use crate::inbound::request::{FeedTestRequest, InboundRequest};
use crate::ingestors::feed_poller::{chapter_message, FeedPoller};

/// What happened to a frame.
#[derive(Debug)]
pub enum Routed {
    /// Answered with `PONG`.
    Pong,
    /// Refused because the gateway is closing.
    Rejected,
    /// Could not be decoded; an error reply was sent.
    Failed,
    /// Tag matched no request; dropped.
    Ignored,
    /// Handler started.
    Spawned(JoinHandle<()>),
}

/// Decodes client frames and runs request handlers.
#[derive(Debug)]
pub struct InboundRouter {
    dispatcher: Arc<Dispatcher>,
    poller: Arc<FeedPoller>,
}

impl InboundRouter {
    /// A router replying through `dispatcher` and testing feeds with `poller`.
    pub fn new(dispatcher: Arc<Dispatcher>, poller: Arc<FeedPoller>) -> Arc<Self> {
        Arc::new(Self { dispatcher, poller })
    }

    /// Routes one text frame from `session`.
    pub fn handle_text(self: &Arc<Self>, session: &SessionHandle, text: &str) -> Routed {
        if !self.dispatcher.admits_connections() {
            if let Err(e) = session.push(UNACCEPTED_CLOSING) {
                self.dispatcher.reporter().report("inbound", &e);
            }
            return Routed::Rejected;
        }

        if text.eq_ignore_ascii_case("PING") {
            if let Err(e) = session.push("PONG") {
                self.dispatcher.reporter().report("inbound", &e);
            }
            return Routed::Pong;
        }

        let request = match Envelope::decode(text).and_then(|env| {
            let request = InboundRequest::from_envelope(&env)?;
            Ok((env.class_name, request))
        }) {
            Ok((_, Some(request))) => request,
            Ok((tag, None)) => {
                tracing::debug!(session = session.id(), tag = %tag, "no handler for tag, dropping");
                return Routed::Ignored;
            }
            Err(e) => {
                self.fail(session, &e);
                return Routed::Failed;
            }
        };

        tracing::debug!(session = session.id(), tag = request.tag(), "routing request");
        let this = Arc::clone(self);
        let session = session.clone();
        Routed::Spawned(tokio::spawn(async move {
            if let Err(e) = this.dispatch(session.id(), request).await {
                this.fail(&session, &e);
            }
        }))
    }

    async fn dispatch(&self, session_id: &str, request: InboundRequest) -> RelayResult<()> {
        match request {
            InboundRequest::FeedTest(req) => self.feed_test(session_id, req).await,
        }
    }

    async fn feed_test(&self, session_id: &str, request: FeedTestRequest) -> RelayResult<()> {
        let mut feed = self
            .poller
            .store()
            .get_by_unique(request.unique)
            .await?
            .ok_or_else(|| RelayError::NotFound(format!("feed {}", request.unique)))?;

        let fresh = self.poller.get_and_update(&mut feed).await?;
        tracing::info!(session = session_id, feed = feed.unique, fresh = fresh.len(), "feed test");
        for chapter in fresh {
            let message = chapter_message(&feed, chapter)?;
            self.dispatcher.send_to(session_id, &message).await?;
        }
        Ok(())
    }

    fn fail(&self, session: &SessionHandle, error: &RelayError) {
        tracing::warn!(session = session.id(), error = %error, "inbound request failed");
        self.dispatcher.reporter().report("inbound", error);
        reply_error(session, &error.to_string());
    }
}

/// Sends a `GatewayError` envelope to one session. A blank message is replaced
/// with the generic one. Failures here are only logged.
pub fn reply_error(session: &SessionHandle, message: &str) {
    let message = if message.trim().is_empty() { UNKNOWN_EXCEPTION } else { message };
    match Envelope::error(message).encode() {
        Ok(text) => {
            if let Err(e) = session.push(text) {
                tracing::debug!(session = session.id(), error = %e, "could not deliver error reply");
            }
        }
        Err(e) => tracing::warn!(session = session.id(), error = %e, "could not encode error reply"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::envelope::{CHAPTER_NOTIFICATION, GATEWAY_ERROR};
    use crate::core::session::testing::{recording_session, Recorded};
    use crate::feeds::parser::testing::rss_document;
    use crate::feeds::{Feed, FeedStore, MemoryFeedStore, RssParser};
    use crate::ingestors::PollerOptions;
    use crate::loggers::MemoryReporter;
    use crate::retrieve::fetcher::testing::ScriptedTransport;
    use crate::retrieve::Fetcher;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::time::Duration;

    const URL: &str = "https://feeds.example.com/story.xml";

    struct Rig {
        router: Arc<InboundRouter>,
        dispatcher: Arc<Dispatcher>,
        store: Arc<MemoryFeedStore>,
        reporter: Arc<MemoryReporter>,
    }

    fn rig() -> Rig {
        let d0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let transport = ScriptedTransport::new();
        transport.serve(URL, &rss_document(&[("old", d0), ("new", d0 + chrono::Duration::hours(1))]));
        let store = Arc::new(MemoryFeedStore::with_feeds([Feed {
            id: 1,
            unique: 77,
            name: "Story".into(),
            server: 0,
            channel: 0,
            user: 0,
            url: URL.into(),
            mentions: vec![],
            date: d0,
        }]));
        let reporter = Arc::new(MemoryReporter::new());
        let dispatcher = Dispatcher::new(reporter.clone());
        let poller = Arc::new(FeedPoller::new(
            store.clone(),
            Fetcher::new(Arc::new(transport), 0),
            Arc::new(RssParser),
            dispatcher.clone(),
            &PollerOptions::default(),
        ));
        Rig { router: InboundRouter::new(dispatcher.clone(), poller), dispatcher, store, reporter }
    }

    async fn settle(routed: Routed) {
        if let Routed::Spawned(handle) = routed {
            tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        }
        // Let the recording writer drain pushed frames.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn texts(log: &Arc<Mutex<Recorded>>) -> Vec<String> {
        log.lock().unwrap().texts.clone()
    }

    #[tokio::test]
    async fn ping_gets_pong_in_any_case() {
        let rig = rig();
        let (session, log) = recording_session("s");
        settle(rig.router.handle_text(&session, "pInG")).await;
        assert_eq!(texts(&log), vec!["PONG"]);
    }

    #[tokio::test]
    async fn feed_test_replies_only_to_the_sender() {
        let rig = rig();
        let (asker, asker_log) = recording_session("asker");
        let (other, other_log) = recording_session("other");
        rig.dispatcher.connect(asker.clone()).unwrap();
        rig.dispatcher.connect(other).unwrap();

        let routed = rig.router.handle_text(&asker, r#"{"data":{"unique":77},"className":"FeedTestRequest"}"#);
        assert!(matches!(routed, Routed::Spawned(_)));
        settle(routed).await;

        let replies = texts(&asker_log);
        assert_eq!(replies.len(), 1);
        assert_eq!(Envelope::decode(&replies[0]).unwrap().class_name, CHAPTER_NOTIFICATION);
        assert!(texts(&other_log).is_empty());
        assert_eq!(
            rig.store.get_by_unique(77).await.unwrap().unwrap().date,
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn unknown_feed_gets_an_error_envelope() {
        let rig = rig();
        let (session, log) = recording_session("s");
        rig.dispatcher.connect(session.clone()).unwrap();
        settle(rig.router.handle_text(&session, r#"{"data":"{\"unique\":5}","className":"FeedTestRequest"}"#)).await;

        let replies = texts(&log);
        assert_eq!(replies.len(), 1);
        let env = Envelope::decode(&replies[0]).unwrap();
        assert_eq!(env.class_name, GATEWAY_ERROR);
        assert_eq!(env.data, serde_json::Value::String("not found: feed 5".into()));
        assert!(matches!(rig.reporter.reports()[0].1, RelayError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_frames_get_an_error_envelope() {
        let rig = rig();
        let (session, log) = recording_session("s");
        let routed = rig.router.handle_text(&session, "{not json");
        assert!(matches!(routed, Routed::Failed));
        settle(routed).await;
        assert_eq!(Envelope::decode(&texts(&log)[0]).unwrap().class_name, GATEWAY_ERROR);
    }

    #[tokio::test]
    async fn unknown_tags_are_dropped_silently() {
        let rig = rig();
        let (session, log) = recording_session("s");
        let routed = rig.router.handle_text(&session, r#"{"data":{},"className":"Nope"}"#);
        assert!(matches!(routed, Routed::Ignored));
        settle(routed).await;
        assert!(texts(&log).is_empty());
        assert!(rig.reporter.is_empty());
    }

    #[tokio::test]
    async fn closing_gateway_refuses_requests() {
        let rig = rig();
        let (session, log) = recording_session("s");
        rig.dispatcher.connect(session.clone()).unwrap();
        rig.dispatcher.request_stop();
        let routed = rig.router.handle_text(&session, "PING");
        assert!(matches!(routed, Routed::Rejected));
        settle(routed).await;
        assert_eq!(texts(&log)[0], UNACCEPTED_CLOSING);
    }

    #[test]
    fn blank_error_messages_use_the_generic_text() {
        let (session, mut rx) = SessionHandle::channel("s");
        reply_error(&session, "  ");
        match rx.try_recv().unwrap() {
            crate::core::session::Frame::Text { payload, .. } => {
                assert_eq!(Envelope::decode(&payload).unwrap().data, serde_json::Value::String(UNKNOWN_EXCEPTION.into()));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
}
