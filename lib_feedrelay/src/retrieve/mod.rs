//! # Data Retrieval Module
//!
//! Network access for the feed poller. Requests go through an
//! [`HttpTransport`](fetcher::HttpTransport) so the retry policy can be
//! exercised without a network, and the production transport is a plain
//! `reqwest` client.
//!
//! ## Contained Modules:
//!
//! - **`fetcher`**: a bounded-retry GET that records every failed attempt,
//!   returning a single [`FetchOutcome`](fetcher::FetchOutcome) that owns the
//!   response metadata and, when asked for, the body.

/// Bounded-retry fetch with error capture.
pub mod fetcher;

pub use fetcher::{FetchFailure, FetchOptions, FetchOutcome, Fetcher, HttpTransport, ReqwestTransport, TransportResponse};
