//! # feedrelay library
//!
//! Everything the notification gateway needs apart from the network listener
//! itself: the broadcast core, the feed polling loop with its fetcher, cache
//! and rate limiter, and inbound request dispatch.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Error taxonomy shared by every module.
pub mod errors;
/// Session registry, broadcast queue, drain controller and the dispatcher tying them together.
pub mod core;
/// Network retrieval with bounded retries.
pub mod retrieve;
/// Feed records, parsed chapter items, the property tree, parser and store.
pub mod feeds;
/// The feed poller with its rate limiter and item cache.
pub mod ingestors;
/// Routing of client envelopes to request handlers.
pub mod inbound;
/// Error reporting and subscriber setup.
pub mod loggers;
/// Persistent collaborators backed by external services.
#[cfg(feature = "connections")]
pub mod connections;

// Re-export the types every consumer touches.
pub use errors::{RelayError, RelayResult};
pub use core::dispatcher::Dispatcher;
pub use core::envelope::{Envelope, OutboundMessage};
pub use ingestors::feed_poller::FeedPoller;
pub use inbound::router::InboundRouter;
