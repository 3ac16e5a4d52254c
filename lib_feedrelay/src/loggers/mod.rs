/// The sink every caught error is handed to.
pub mod reporter;
/// Global `tracing` subscriber: console plus daily rotating JSON file.
#[cfg(feature = "loggers")]
pub mod setup;

pub use reporter::{ErrorReporter, MemoryReporter, TracingReporter};
#[cfg(feature = "loggers")]
pub use setup::setup_logging;
