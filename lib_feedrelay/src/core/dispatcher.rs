//! # Broadcast Dispatcher
//!
//! Owns the session [`Registry`], the [`BroadcastQueue`] and the
//! [`DrainController`], and runs delivery cycles over them.
//!
//! ## Delivery cycle
//!
//! At most one cycle runs at a time. It repeats:
//!
//! 1. Snapshot the live sessions. With none connected, stop without touching
//!    the queue; the backlog waits for the next connect.
//! 2. Pop the oldest message and hand it to every session in the snapshot.
//! 3. Wait for every one of those writes to settle before popping the next.
//!
//! Before the cycle gives up its slot it re-checks the queue and the registry
//! while holding the drain lock. `enqueue` and `connect` take the same lock
//! after changing their side, so work added during the exit is never stranded.
//!
//! ## Shutdown
//!
//! [`Dispatcher::request_stop`] refuses new connections immediately but lets
//! the backlog drain first. Once a cycle ends with an empty queue, every open
//! session is sent a close frame and [`Dispatcher::closed`] resolves.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::core::defaults::{CLOSE_GOING_AWAY, SHUTTING_DOWN};
use crate::core::drain::{CycleEnd, DrainController, DrainState};
use crate::core::envelope::OutboundMessage;
use crate::core::queue::BroadcastQueue;
use crate::core::registry::Registry;
use crate::core::session::SessionHandle;
use crate::errors::{RelayError, RelayResult};
use crate::loggers::ErrorReporter;

/// The broadcast core.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Registry,
    queue: BroadcastQueue,
    drain: Mutex<DrainController>,
    closed: CancellationToken,
    reporter: Arc<dyn ErrorReporter>,
}

impl Dispatcher {
    /// Creates an idle dispatcher with no sessions.
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Arc<Self> {
        Arc::new(Self {
            registry: Registry::new(),
            queue: BroadcastQueue::new(),
            drain: Mutex::new(DrainController::new()),
            closed: CancellationToken::new(),
            reporter,
        })
    }

    fn drain(&self) -> MutexGuard<'_, DrainController> {
        self.drain.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Appends a message for every session and starts a cycle if none is running.
    ///
    /// Messages are accepted while closing is requested and drained before the
    /// close. Once [`DrainState::Closed`] is reached nothing will deliver them,
    /// so they are refused with [`RelayError::ClosingRejection`] and reported.
    pub fn enqueue(self: &Arc<Self>, message: OutboundMessage) -> RelayResult<()> {
        let start = {
            let mut drain = self.drain();
            if drain.state() == DrainState::Closed {
                drop(drain);
                tracing::warn!(kind = message.kind(), "message refused, dispatcher is closed");
                let error = RelayError::ClosingRejection;
                self.reporter.report("enqueue", &error);
                return Err(error);
            }
            self.queue.push(message);
            drain.begin_cycle()
        };
        tracing::debug!(backlog = self.queue.len(), "message enqueued");
        if start {
            self.spawn_cycle();
        }
        Ok(())
    }

    /// Registers a session unless shutdown has begun. A pending backlog
    /// starts a cycle so it reaches the new session.
    pub fn connect(self: &Arc<Self>, handle: SessionHandle) -> RelayResult<()> {
        let start = {
            let mut drain = self.drain();
            if !drain.admits_connections() {
                return Err(RelayError::ClosingRejection);
            }
            tracing::info!(session = handle.id(), "session connected");
            self.registry.register(handle);
            !self.queue.is_empty() && drain.begin_cycle()
        };
        if start {
            self.spawn_cycle();
        }
        Ok(())
    }

    /// Removes a session. Safe to call for ids that were never registered.
    pub fn disconnect(&self, id: &str) {
        if self.registry.unregister(id).is_some() {
            tracing::info!(session = id, "session disconnected");
        }
    }

    /// Looks up a live session.
    pub fn lookup(&self, id: &str) -> RelayResult<SessionHandle> {
        self.registry.lookup(id)
    }

    /// Sends one message to one session, outside the broadcast queue.
    pub async fn send_to(&self, id: &str, message: &OutboundMessage) -> RelayResult<()> {
        let session = self.registry.lookup(id)?;
        session.deliver(Arc::clone(message.payload())).await
    }

    /// Starts shutdown. Repeated calls are no-ops.
    pub fn request_stop(self: &Arc<Self>) {
        let start = {
            let mut drain = self.drain();
            if !drain.request_stop() {
                tracing::debug!("stop already requested");
                return;
            }
            tracing::info!(backlog = self.queue.len(), sessions = self.registry.len(), "stop requested");
            drain.begin_cycle()
        };
        if start {
            self.spawn_cycle();
        }
    }

    /// Resolves once the backlog has drained after a stop request.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Whether the dispatcher has reached [`DrainState::Closed`].
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Current drain state.
    pub fn state(&self) -> DrainState {
        self.drain().state()
    }

    /// Whether new sessions are accepted.
    pub fn admits_connections(&self) -> bool {
        self.drain().admits_connections()
    }

    /// Number of messages waiting.
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// The sink caught errors are sent to.
    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }

    fn spawn_cycle(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_cycle().await });
    }

    async fn run_cycle(self: Arc<Self>) {
        loop {
            self.deliver_backlog().await;

            let end = {
                let mut drain = self.drain();
                if !self.queue.is_empty() && !self.registry.is_empty() {
                    None
                } else {
                    Some(drain.finish_cycle(self.queue.is_empty()))
                }
            };

            match end {
                None => continue,
                Some(CycleEnd::Parked) => {
                    tracing::debug!(backlog = self.queue.len(), "delivery cycle parked");
                }
                Some(CycleEnd::Closed) => self.shut_down_sessions(),
            }
            return;
        }
    }

    async fn deliver_backlog(&self) {
        loop {
            let sessions = self.registry.snapshot_all();
            if sessions.is_empty() {
                tracing::debug!(backlog = self.queue.len(), "no sessions connected, deferring delivery");
                return;
            }
            let Some(message) = self.queue.pop() else {
                return;
            };

            let sends = sessions.iter().map(|s| s.deliver(Arc::clone(message.payload())));
            let results = join_all(sends).await;

            for (session, result) in sessions.iter().zip(results) {
                if let Err(e) = result {
                    tracing::warn!(session = session.id(), kind = message.kind(), error = %e, "delivery failed");
                    self.reporter.report("broadcast", &e);
                }
            }
        }
    }

    fn shut_down_sessions(&self) {
        let sessions = self.registry.snapshot_all();
        tracing::info!(sessions = sessions.len(), "backlog drained, closing sessions");
        for session in sessions {
            // A writer that already stopped has nothing left to close.
            let _ = session.close(CLOSE_GOING_AWAY, SHUTTING_DOWN);
        }
        self.closed.cancel();
    }
}
