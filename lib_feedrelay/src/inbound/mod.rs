//! Client-to-gateway requests: the known request variants and the router
//! that decodes envelopes and runs their handlers.

/// Known inbound request variants.
pub mod request;
/// Text frame routing and request handlers.
pub mod router;

pub use request::{FeedTestRequest, InboundRequest};
pub use router::{InboundRouter, Routed};
