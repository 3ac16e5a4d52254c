use lib_feedrelay::core::defaults::{CLOSING_TIME, INVALID_AUTHORIZATION, SHUTTING_DOWN};
use lib_feedrelay::core::envelope::CHAPTER_NOTIFICATION;
use lib_feedrelay::core::DrainState;
use lib_feedrelay::feeds::MemoryFeedStore;
use lib_feedrelay::OutboundMessage;
use project_tests::*;
use std::sync::Arc;

async fn gateway() -> TestGateway {
    TestGateway::start(Arc::new(MemoryFeedStore::new())).await.expect("gateway starts")
}

#[tokio::test]
async fn health_endpoint_answers_ok() {
    let gw = gateway().await;
    let body = reqwest::get(format!("http://{}/health", gw.addr))
        .await
        .expect("health request")
        .text()
        .await
        .expect("health body");
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn connections_without_the_secret_are_closed_with_policy_violation() {
    let gw = gateway().await;

    for auth in [None, Some("Bearer wrong"), Some("Basic integration-secret")] {
        let mut client = gw.connect_with(auth).await.expect("handshake");
        let (code, reason) = next_close(&mut client).await.expect("close frame");
        assert_eq!(code, 1008, "auth {auth:?}");
        assert_eq!(reason, INVALID_AUTHORIZATION);
    }
    assert_eq!(gw.state.dispatcher.session_count(), 0);
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let gw = gateway().await;
    let mut client = gw.connect().await.expect("connect");

    send_text(&mut client, "ping").await.unwrap();
    assert_eq!(next_text(&mut client).await.unwrap(), "PONG");
    send_text(&mut client, "PING").await.unwrap();
    assert_eq!(next_text(&mut client).await.unwrap(), "PONG");
}

#[tokio::test]
async fn broadcasts_reach_every_client_in_enqueue_order() {
    let gw = gateway().await;
    let mut a = gw.connect().await.unwrap();
    let mut b = gw.connect().await.unwrap();

    for n in 1..=3 {
        gw.state.dispatcher.enqueue(OutboundMessage::raw(CHAPTER_NOTIFICATION, format!("m{n}"))).unwrap();
    }

    for client in [&mut a, &mut b] {
        for n in 1..=3 {
            assert_eq!(next_text(client).await.unwrap(), format!("m{n}"));
        }
    }
}

#[tokio::test]
async fn unknown_tags_get_no_reply() {
    let gw = gateway().await;
    let mut client = gw.connect().await.unwrap();

    send_text(&mut client, r#"{"data":{},"className":"SomethingElse"}"#).await.unwrap();
    send_text(&mut client, "PING").await.unwrap();
    assert_eq!(next_text(&mut client).await.unwrap(), "PONG");
}

#[tokio::test]
async fn undecodable_frames_get_an_error_envelope() {
    let gw = gateway().await;
    let mut client = gw.connect().await.unwrap();

    send_text(&mut client, "{not json").await.unwrap();
    let (class_name, data) = envelope(&next_text(&mut client).await.unwrap()).unwrap();
    assert_eq!(class_name, "GatewayError");
    assert!(data.as_str().unwrap().contains("decode"));
    assert_eq!(gw.reporter.len(), 1);
}

#[tokio::test]
async fn stopping_drains_the_backlog_then_closes_every_client() {
    let gw = gateway().await;
    let mut client = gw.connect().await.unwrap();

    // No await in between, so the delivery cycle has not run when the stop lands.
    gw.state.dispatcher.enqueue(OutboundMessage::raw(CHAPTER_NOTIFICATION, "last-1")).unwrap();
    gw.state.dispatcher.enqueue(OutboundMessage::raw(CHAPTER_NOTIFICATION, "last-2")).unwrap();
    gw.state.dispatcher.request_stop();

    assert_eq!(next_text(&mut client).await.unwrap(), "last-1");
    assert_eq!(next_text(&mut client).await.unwrap(), "last-2");
    assert_eq!(next_close(&mut client).await.unwrap(), (1001, SHUTTING_DOWN.to_string()));

    assert_eq!(gw.state.dispatcher.state(), DrainState::Closed);
    gw.stopped().await.expect("listener stops after the drain");
}

#[tokio::test]
async fn messages_queued_while_closing_still_reach_clients_before_the_close() {
    let gw = gateway().await;
    let mut client = gw.connect().await.unwrap();

    gw.state.dispatcher.enqueue(OutboundMessage::raw(CHAPTER_NOTIFICATION, "before-stop")).unwrap();
    gw.state.dispatcher.request_stop();
    assert_eq!(gw.state.dispatcher.state(), DrainState::ClosingRequested);
    gw.state.dispatcher.enqueue(OutboundMessage::raw(CHAPTER_NOTIFICATION, "during-close")).unwrap();

    assert_eq!(next_text(&mut client).await.unwrap(), "before-stop");
    assert_eq!(next_text(&mut client).await.unwrap(), "during-close");
    assert_eq!(next_close(&mut client).await.unwrap(), (1001, SHUTTING_DOWN.to_string()));
    gw.stopped().await.expect("listener stops after the drain");
}

#[tokio::test]
async fn connections_after_a_stop_are_told_to_try_again_later() {
    let gw = gateway().await;

    // With nobody connected the backlog holds the close open.
    gw.state.dispatcher.enqueue(OutboundMessage::raw(CHAPTER_NOTIFICATION, "undelivered")).unwrap();
    gw.state.dispatcher.request_stop();
    assert_eq!(gw.state.dispatcher.state(), DrainState::ClosingRequested);

    let mut late = gw.connect_with(Some(&format!("Bearer {SECRET}"))).await.unwrap();
    assert_eq!(next_close(&mut late).await.unwrap(), (1013, CLOSING_TIME.to_string()));
    assert_eq!(gw.state.dispatcher.session_count(), 0);
    assert_eq!(gw.state.dispatcher.backlog(), 1);
}
