//! # feedrelay gateway
//!
//! Polls the configured feeds on a schedule and broadcasts every new chapter
//! to the WebSocket clients connected with the shared secret. On SIGINT or
//! SIGTERM the gateway stops accepting clients, drains what is still queued
//! and then closes every session.

use anyhow::{Context, Result};
use servers::gateway_logic::config::{self, GatewaySettings};
use servers::gateway_logic::state::GatewayState;
use servers::gateway_logic::{downstream, logger, scheduler};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_graceful::{Shutdown, ShutdownGuard};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = match config::load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    // Dropping the guard flushes the file writer, so it lives until main returns.
    let _log_guard = match logger::setup_logging(&settings) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        port = settings.port,
        poll_interval = ?settings.poll_interval,
        database = settings.database_url.is_some(),
        "feedrelay gateway starting"
    );

    let limit = settings.shutdown_limit;
    let shutdown = Shutdown::default();
    shutdown.spawn_task_fn(move |guard| async move {
        if let Err(e) = run_gateway(settings, guard).await {
            tracing::error!(error = %format!("{e:#}"), "gateway stopped with an error");
            std::process::exit(1);
        }
    });

    match shutdown.shutdown_with_limit(limit).await {
        Ok(elapsed) => {
            tracing::info!("shutdown: gracefully {}s after shutdown signal received", elapsed.as_secs_f64());
        }
        Err(e) => {
            tracing::warn!("shutdown: forcefully due to timeout: {}", e);
        }
    }

    tracing::info!("Bye!");
    Ok(())
}

async fn run_gateway(settings: GatewaySettings, guard: ShutdownGuard) -> Result<()> {
    let state = GatewayState::build(settings).await?;
    let port = state.settings.port;
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;

    let mut server = tokio::spawn(downstream::serve(listener, state.clone()));
    let mut scheduler = scheduler::start_polling(Arc::clone(&state.poller), state.settings.poll_interval).await?;

    // The schedule's first tick is one interval away; poll once now.
    let poller = Arc::clone(&state.poller);
    let first_poll = tokio::spawn(async move {
        poller.run_cycle().await;
    });

    tokio::select! {
        _ = guard.cancelled() => {
            tracing::info!("Signal received: initiate graceful shutdown");
        }
        result = &mut server => {
            // The listener only returns on its own after a failure.
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(e.into()),
            };
        }
    }

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "poll scheduler did not shut down cleanly");
    }
    // Every chapter whose watermark was persisted must be enqueued before the
    // dispatcher can close.
    state.poller.quiesce().await;
    if let Err(e) = first_poll.await {
        tracing::warn!(error = %e, "initial poll cycle did not finish cleanly");
    }

    state.dispatcher.request_stop();
    tracing::info!(backlog = state.dispatcher.backlog(), "waiting for the broadcast queue to drain");
    state.dispatcher.closed().await;

    server.await??;
    Ok(())
}
