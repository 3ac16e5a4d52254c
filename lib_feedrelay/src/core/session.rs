//! # Session Handles
//!
//! A session is one live client connection. The network layer owns the
//! socket; everything else talks to it through a [`SessionHandle`], which
//! pushes [`Frame`]s into the connection's writer task.
//!
//! Broadcast delivery needs to know when a frame actually reached the socket,
//! so [`SessionHandle::deliver`] attaches a oneshot acknowledgement that the
//! writer completes after the write settles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::errors::{RelayError, RelayResult};

static NEXT_SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Outcome reported back by a writer task for an acknowledged frame.
pub type WriteAck = oneshot::Sender<Result<(), String>>;

/// A unit of work for a connection's writer task.
#[derive(Debug)]
pub enum Frame {
    /// A text frame. `ack`, when present, must be completed once the write settles.
    Text {
        /// Encoded text to write.
        payload: Arc<str>,
        /// Completion signal for broadcast barriers.
        ack: Option<WriteAck>,
    },
    /// A close frame; the writer stops after sending it.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Cheap, cloneable reference to a live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Arc<str>,
    seq: u64,
    connected_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<Frame>,
}

/// Generates a fresh session id. Reconnects always get a new one.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl SessionHandle {
    /// Wraps an existing writer channel.
    pub fn new(id: impl Into<Arc<str>>, tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            id: id.into(),
            seq: NEXT_SESSION_SEQ.fetch_add(1, Ordering::Relaxed),
            connected_at: Utc::now(),
            tx,
        }
    }

    /// Creates a handle together with the receiving end its writer task should drain.
    pub fn channel(id: impl Into<Arc<str>>) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(id, tx), rx)
    }

    /// The session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registration order; later connections have larger values.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// When the handle was created.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Whether the writer task is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Sends a text frame and waits until the writer has written it (or failed to).
    pub async fn deliver(&self, payload: Arc<str>) -> RelayResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Frame::Text { payload, ack: Some(ack_tx) })
            .map_err(|_| RelayError::Transport(format!("session {} writer has stopped", self.id)))?;

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RelayError::Transport(e)),
            Err(_) => Err(RelayError::Transport(format!(
                "session {} dropped the frame before writing it",
                self.id
            ))),
        }
    }

    /// Queues a text frame without waiting for the write.
    pub fn push(&self, payload: impl Into<Arc<str>>) -> RelayResult<()> {
        self.tx
            .send(Frame::Text { payload: payload.into(), ack: None })
            .map_err(|_| RelayError::Transport(format!("session {} writer has stopped", self.id)))
    }

    /// Asks the writer to send a close frame and stop.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> RelayResult<()> {
        self.tx
            .send(Frame::Close { code, reason: reason.into() })
            .map_err(|_| RelayError::Transport(format!("session {} writer has stopped", self.id)))
    }
}
