use chrono::{DateTime, Duration, TimeZone, Utc};
use lib_feedrelay::feeds::{FeedStore, MemoryFeedStore};
use project_tests::*;
use std::sync::Arc;

fn d0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

async fn gateway_with_feed(items: &[(&str, DateTime<Utc>)]) -> (TestGateway, Arc<MemoryFeedStore>) {
    let url = serve_rss(rss_document(items)).await.expect("rss server");
    let store = Arc::new(MemoryFeedStore::with_feeds([feed(1, 42, &url, d0())]));
    let gw = TestGateway::start(store.clone()).await.expect("gateway starts");
    (gw, store)
}

#[tokio::test]
async fn poll_cycle_announces_only_new_chapters_oldest_first() {
    let (gw, store) = gateway_with_feed(&[
        ("Chapter 3", d0() + Duration::hours(2)),
        ("Chapter 2", d0() + Duration::hours(1)),
        ("Chapter 1", d0() - Duration::hours(1)),
    ])
    .await;
    let mut client = gw.connect().await.unwrap();

    let report = gw.state.poller.run_cycle().await;
    assert_eq!(report.feeds, 1);
    assert_eq!(report.notified, 2);
    assert_eq!(report.failed, 0);

    let mut titles = Vec::new();
    for _ in 0..2 {
        let (class_name, data) = envelope(&next_text(&mut client).await.unwrap()).unwrap();
        assert_eq!(class_name, "ChapterNotification");
        assert_eq!(data["feed"], 42);
        assert_eq!(data["mentions"], serde_json::json!([4]));
        titles.push(data["chapter"]["title"].as_str().unwrap().to_string());
    }
    assert_eq!(titles, ["Chapter 2", "Chapter 3"]);

    let stored = store.get_by_unique(42).await.unwrap().unwrap();
    assert_eq!(stored.date, d0() + Duration::hours(2));
}

#[tokio::test]
async fn a_second_cycle_with_nothing_new_stays_quiet() {
    let (gw, _store) = gateway_with_feed(&[("Chapter 2", d0() + Duration::hours(1))]).await;

    assert_eq!(gw.state.poller.run_cycle().await.notified, 1);
    assert_eq!(gw.state.poller.run_cycle().await.notified, 0);
}

#[tokio::test]
async fn feed_test_replies_only_to_the_requesting_client() {
    let (gw, store) = gateway_with_feed(&[
        ("Chapter 2", d0() + Duration::hours(1)),
        ("Chapter 3", d0() + Duration::hours(2)),
    ])
    .await;
    let mut requester = gw.connect().await.unwrap();
    let mut bystander = gw.connect().await.unwrap();

    send_text(&mut requester, r#"{"data":{"unique":42},"className":"FeedTestRequest"}"#)
        .await
        .unwrap();

    for expected in ["Chapter 2", "Chapter 3"] {
        let (class_name, data) = envelope(&next_text(&mut requester).await.unwrap()).unwrap();
        assert_eq!(class_name, "ChapterNotification");
        assert_eq!(data["chapter"]["title"], expected);
    }

    send_text(&mut bystander, "PING").await.unwrap();
    assert_eq!(next_text(&mut bystander).await.unwrap(), "PONG");

    let stored = store.get_by_unique(42).await.unwrap().unwrap();
    assert_eq!(stored.date, d0() + Duration::hours(2));
}

#[tokio::test]
async fn feed_test_for_an_unknown_feed_returns_an_error_envelope() {
    let (gw, _store) = gateway_with_feed(&[]).await;
    let mut client = gw.connect().await.unwrap();

    send_text(&mut client, r#"{"data":"{\"unique\":7}","className":"FeedTestRequest"}"#)
        .await
        .unwrap();

    let (class_name, data) = envelope(&next_text(&mut client).await.unwrap()).unwrap();
    assert_eq!(class_name, "GatewayError");
    assert_eq!(data, "not found: feed 7");
}

#[tokio::test]
async fn unreachable_feeds_are_reported_and_do_not_stop_the_cycle() {
    let url = serve_rss(rss_document(&[("Chapter 2", d0() + Duration::hours(1))])).await.unwrap();
    let store = Arc::new(MemoryFeedStore::with_feeds([
        feed(1, 1, "http://127.0.0.1:9/missing.rss", d0()),
        feed(2, 2, &url, d0()),
    ]));
    let gw = TestGateway::start(store).await.unwrap();

    let report = gw.state.poller.run_cycle().await;
    assert_eq!(report.feeds, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.notified, 1);
    assert_eq!(gw.reporter.len(), 1);
}

#[tokio::test]
async fn a_stop_during_a_poll_cycle_delivers_every_persisted_chapter() {
    let mut feeds = Vec::new();
    for id in 1..=4 {
        let url = serve_rss(rss_document(&[("Chapter 2", d0() + Duration::hours(1))])).await.unwrap();
        feeds.push(feed(id, id as u64, &url, d0()));
    }
    let store = Arc::new(MemoryFeedStore::with_feeds(feeds));
    let gw = TestGateway::start(store.clone()).await.unwrap();
    let mut client = gw.connect().await.unwrap();

    let poller = Arc::clone(&gw.state.poller);
    let cycle = tokio::spawn(async move { poller.run_cycle().await });

    // Shut down the way the gateway does once the first chapter is out.
    let first = next_text(&mut client).await.unwrap();
    gw.state.poller.quiesce().await;
    gw.state.dispatcher.request_stop();
    let report = cycle.await.unwrap();

    let (rest, close) = texts_until_close(&mut client).await.unwrap();
    assert_eq!(close.0, 1001);
    let received = 1 + rest.len();
    assert!(std::iter::once(&first).chain(&rest).all(|t| envelope(t).unwrap().0 == "ChapterNotification"));

    let mut persisted = 0;
    for unique in 1..=4 {
        if store.get_by_unique(unique).await.unwrap().unwrap().date > d0() {
            persisted += 1;
        }
    }
    assert_eq!(report.notified, persisted);
    assert_eq!(received, persisted);
    assert!(gw.reporter.is_empty());
}
