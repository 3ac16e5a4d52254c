use anyhow::{Context, Result};
use lib_feedrelay::connections::PostgresFeedStore;
use lib_feedrelay::feeds::{FeedStore, MemoryFeedStore, RssParser};
use lib_feedrelay::loggers::{ErrorReporter, TracingReporter};
use lib_feedrelay::retrieve::{Fetcher, HttpTransport, ReqwestTransport};
use lib_feedrelay::{Dispatcher, FeedPoller, InboundRouter};
use std::sync::Arc;

use crate::gateway_logic::config::GatewaySettings;

/// Everything the HTTP handlers and the poll job share.
#[derive(Clone, Debug)]
pub struct GatewayState {
    pub settings: Arc<GatewaySettings>,
    pub dispatcher: Arc<Dispatcher>,
    pub poller: Arc<FeedPoller>,
    pub router: Arc<InboundRouter>,
}

impl GatewayState {
    /// Opens the configured store and an HTTP transport, then wires the gateway.
    pub async fn build(settings: GatewaySettings) -> Result<Self> {
        let store = open_store(&settings).await?;
        let transport = ReqwestTransport::new(&settings.fetch_options())
            .context("building the HTTP client")?;
        Ok(Self::assemble(settings, store, Arc::new(transport), Arc::new(TracingReporter)))
    }

    /// Wires the gateway around the given collaborators.
    pub fn assemble(
        settings: GatewaySettings,
        store: Arc<dyn FeedStore>,
        transport: Arc<dyn HttpTransport>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let dispatcher = Dispatcher::new(reporter);
        let fetcher = Fetcher::new(transport, settings.max_retries);
        let poller = Arc::new(FeedPoller::new(
            store,
            fetcher,
            Arc::new(RssParser),
            Arc::clone(&dispatcher),
            &settings.poller_options(),
        ));
        let router = InboundRouter::new(Arc::clone(&dispatcher), Arc::clone(&poller));
        GatewayState { settings: Arc::new(settings), dispatcher, poller, router }
    }
}

async fn open_store(settings: &GatewaySettings) -> Result<Arc<dyn FeedStore>> {
    if let Some(url) = &settings.database_url {
        let store = PostgresFeedStore::connect(url)?;
        store.ensure_schema().await.context("preparing the feeds table")?;
        tracing::info!("using the PostgreSQL feed store");
        return Ok(Arc::new(store));
    }
    match &settings.feeds_file {
        Some(path) => Ok(Arc::new(MemoryFeedStore::from_json_file(path).await?)),
        None => {
            tracing::warn!("no database or feeds file configured, starting with an empty feed store");
            Ok(Arc::new(MemoryFeedStore::new()))
        }
    }
}
