//! Shared harness for the cross-crate integration tests: an in-process
//! gateway on an ephemeral port, a local RSS server and WebSocket client helpers.

use anyhow::{anyhow, bail, Context, Result};
use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use lib_feedrelay::feeds::{Feed, FeedStore};
use lib_feedrelay::loggers::MemoryReporter;
use lib_feedrelay::retrieve::{FetchOptions, ReqwestTransport};
use servers::gateway_logic::config::GatewaySettings;
use servers::gateway_logic::downstream;
use servers::gateway_logic::state::GatewayState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub const SECRET: &str = "integration-secret";
const WAIT: Duration = Duration::from_secs(5);

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Settings with test-friendly timings.
pub fn test_settings() -> GatewaySettings {
    let fetch = FetchOptions::default();
    GatewaySettings {
        port: 0,
        secret: SECRET.to_string(),
        database_url: None,
        feeds_file: None,
        poll_interval: Duration::from_secs(300),
        cache_ttl: Duration::from_secs(60),
        max_rate: 2,
        rate_window: Duration::from_millis(400),
        rate_pause: Duration::from_millis(50),
        max_retries: 1,
        request_timeout: Duration::from_secs(5),
        user_agent: fetch.user_agent,
        signature: None,
        log_dir: PathBuf::from("./logs"),
        log_level: "info".to_string(),
        shutdown_limit: Duration::from_secs(5),
    }
}

/// A feed record pointing at `url` with watermark `date`.
pub fn feed(id: i64, unique: u64, url: &str, date: DateTime<Utc>) -> Feed {
    Feed {
        id,
        unique,
        name: format!("story {unique}"),
        server: 1,
        channel: 2,
        user: 3,
        url: url.to_string(),
        mentions: vec![4],
        date,
    }
}

/// An RSS 2.0 document in the shape ScribbleHub serves.
pub fn rss_document(items: &[(&str, DateTime<Utc>)]) -> String {
    let mut doc = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <rss version=\"2.0\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n<channel>\n\
         <title>Story - Scribble Hub</title>\n",
    );
    for (n, (title, published)) in items.iter().enumerate() {
        doc.push_str(&format!(
            "<item><title>{title}</title>\
             <link>https://www.scribblehub.com/read/1-story/chapter/{n}/</link>\
             <dc:creator><![CDATA[Author]]></dc:creator>\
             <category>1</category><category><![CDATA[Story]]></category>\
             <pubDate>{}</pubDate></item>\n",
            published.to_rfc2822()
        ));
    }
    doc.push_str("</channel>\n</rss>\n");
    doc
}

/// Serves `body` at `/feed.rss` on an ephemeral port and returns the feed URL.
pub async fn serve_rss(body: String) -> Result<String> {
    let app = Router::new().route("/feed.rss", get(move || async move { body }));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}/feed.rss"))
}

/// A gateway running in-process.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub state: GatewayState,
    pub reporter: Arc<MemoryReporter>,
    server: JoinHandle<Result<()>>,
}

impl TestGateway {
    /// Starts a gateway over `store` with a real HTTP transport.
    pub async fn start(store: Arc<dyn FeedStore>) -> Result<Self> {
        let settings = test_settings();
        let transport = ReqwestTransport::new(&settings.fetch_options())?;
        let reporter = Arc::new(MemoryReporter::new());
        let state = GatewayState::assemble(settings, store, Arc::new(transport), reporter.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(downstream::serve(listener, state.clone()));
        Ok(Self { addr, state, reporter, server })
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    /// Connects with the right secret and waits until the session is registered.
    pub async fn connect(&self) -> Result<Client> {
        let before = self.state.dispatcher.session_count();
        let client = self.connect_with(Some(&format!("Bearer {SECRET}"))).await?;
        self.wait_for_sessions(before + 1).await?;
        Ok(client)
    }

    /// Connects with an arbitrary `Authorization` value, or none.
    pub async fn connect_with(&self, authorization: Option<&str>) -> Result<Client> {
        let mut request = self.ws_url().into_client_request()?;
        if let Some(value) = authorization {
            request.headers_mut().insert(AUTHORIZATION, HeaderValue::from_str(value)?);
        }
        let (client, _response) = tokio_tungstenite::connect_async(request)
            .await
            .context("websocket handshake")?;
        Ok(client)
    }

    pub async fn wait_for_sessions(&self, n: usize) -> Result<()> {
        let dispatcher = Arc::clone(&self.state.dispatcher);
        wait_until(move || dispatcher.session_count() == n).await
    }

    /// Waits for the listener task to return.
    pub async fn stopped(self) -> Result<()> {
        tokio::time::timeout(WAIT, self.server).await.context("server did not stop")??
    }
}

/// Polls `condition` until it holds or the wait budget runs out.
pub async fn wait_until(condition: impl Fn() -> bool) -> Result<()> {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow!("condition not met in time"))
}

pub async fn send_text(client: &mut Client, text: &str) -> Result<()> {
    client.send(Message::Text(text.into())).await?;
    Ok(())
}

/// The next text frame, skipping control frames.
pub async fn next_text(client: &mut Client) -> Result<String> {
    loop {
        let message = tokio::time::timeout(WAIT, client.next())
            .await
            .context("no frame in time")?
            .ok_or_else(|| anyhow!("stream ended"))??;
        match message {
            Message::Text(text) => return Ok(text.to_string()),
            Message::Close(frame) => bail!("closed while waiting for text: {frame:?}"),
            _ => continue,
        }
    }
}

/// Reads until a close frame and returns its code and reason.
pub async fn next_close(client: &mut Client) -> Result<(u16, String)> {
    loop {
        let message = tokio::time::timeout(WAIT, client.next())
            .await
            .context("no frame in time")?
            .ok_or_else(|| anyhow!("stream ended without a close frame"))??;
        match message {
            Message::Close(Some(frame)) => return Ok((u16::from(frame.code), frame.reason.to_string())),
            Message::Close(None) => bail!("close frame without a code"),
            Message::Text(text) => bail!("unexpected text before close: {text}"),
            _ => continue,
        }
    }
}

/// Collects text frames until the close frame, returning both.
pub async fn texts_until_close(client: &mut Client) -> Result<(Vec<String>, (u16, String))> {
    let mut texts = Vec::new();
    loop {
        let message = tokio::time::timeout(WAIT, client.next())
            .await
            .context("no frame in time")?
            .ok_or_else(|| anyhow!("stream ended without a close frame"))??;
        match message {
            Message::Text(text) => texts.push(text.to_string()),
            Message::Close(Some(frame)) => return Ok((texts, (u16::from(frame.code), frame.reason.to_string()))),
            Message::Close(None) => bail!("close frame without a code"),
            _ => continue,
        }
    }
}

/// Parses an envelope and returns `(className, data)`.
pub fn envelope(text: &str) -> Result<(String, serde_json::Value)> {
    let mut value: serde_json::Value = serde_json::from_str(text)?;
    let class_name = value["className"]
        .as_str()
        .ok_or_else(|| anyhow!("no className in {text}"))?
        .to_string();
    Ok((class_name, value["data"].take()))
}
