//! # Broadcast Core
//!
//! The connection side of the gateway: who is connected, what is waiting to
//! be sent to them, and whether the gateway is still accepting connections.
//!
//! - **`session`**: handles onto a connection's writer task.
//! - **`registry`**: live sessions keyed by id.
//! - **`queue`**: FIFO backlog of encoded outbound messages.
//! - **`drain`**: the idle/draining/closing/closed state machine.
//! - **`dispatcher`**: runs delivery cycles over the three above.
//! - **`envelope`**: the `{data, className}` wire frame.
//! - **`defaults`**: close codes and canned reasons.

/// Close codes and canned reasons.
pub mod defaults;
/// Delivery cycles, targeted sends and shutdown.
pub mod dispatcher;
/// The drain state machine.
pub mod drain;
/// Wire envelope codec and pre-encoded outbound messages.
pub mod envelope;
/// Pending outbound messages.
pub mod queue;
/// Live sessions keyed by id.
pub mod registry;
/// Handles onto connection writer tasks.
pub mod session;

pub use dispatcher::Dispatcher;
pub use drain::DrainState;
pub use envelope::{Envelope, OutboundMessage};
pub use registry::Registry;
pub use session::{Frame, SessionHandle};
