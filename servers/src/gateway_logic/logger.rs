use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;

use crate::gateway_logic::config::GatewaySettings;

/// Installs console and daily-file logging. Keep the guard alive until exit.
pub fn setup_logging(settings: &GatewaySettings) -> Result<WorkerGuard> {
    lib_feedrelay::loggers::setup_logging(&settings.log_dir, "feedrelay_gateway", &settings.log_level)
        .with_context(|| format!("setting up logging in {}", settings.log_dir.display()))
}
