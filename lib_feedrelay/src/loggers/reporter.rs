//! # Error Reporting
//!
//! Failures that are caught rather than propagated (a single feed failing, a
//! single session's write failing, a handler erroring) still have to go
//! somewhere. Each one is passed to an [`ErrorReporter`] along with a short
//! context label naming where it was caught.

use std::fmt;
use std::sync::Mutex;

use crate::errors::RelayError;

/// A sink for caught errors.
pub trait ErrorReporter: Send + Sync + fmt::Debug {
    /// Records one caught error. `context` names the operation that caught it.
    fn report(&self, context: &str, error: &RelayError);
}

/// Emits every report as a structured `tracing` error event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &str, error: &RelayError) {
        tracing::error!(target: "feedrelay::reporter", context, error = %error, "caught error");
    }
}

/// Keeps reports in memory, for inspection in tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<(String, RelayError)>>,
}

impl MemoryReporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far, oldest first.
    pub fn reports(&self) -> Vec<(String, RelayError)> {
        self.reports.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Number of reports recorded.
    pub fn len(&self) -> usize {
        self.reports.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorReporter for MemoryReporter {
    fn report(&self, context: &str, error: &RelayError) {
        tracing::debug!(context, error = %error, "recorded error");
        self.reports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((context.to_string(), error.clone()));
    }
}
