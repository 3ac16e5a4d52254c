use anyhow::{bail, Context, Result};
use clap::Parser;
use lib_feedrelay::ingestors::PollerOptions;
use lib_feedrelay::retrieve::FetchOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "feedrelay.conf";

/// Raw, layered configuration. Every field is optional so that defaults, the
/// JSON file and CLI/env values can be merged field by field.
#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[command(about = "Chapter notification gateway", version)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[arg(long, env = "FEEDRELAY_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[arg(long, env = "FEEDRELAY_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[arg(long, env = "FEEDRELAY_SECRET", help = "Shared secret clients present as a Bearer token.")]
    pub secret: Option<String>,

    #[arg(long, env = "FEEDRELAY_DATABASE_URL", help = "PostgreSQL connection string for the feed store.")]
    pub database_url: Option<String>,

    #[arg(long, env = "FEEDRELAY_FEEDS_FILE", help = "JSON file of feed records, used when no database is configured.")]
    pub feeds_file: Option<PathBuf>,

    #[arg(long, env = "FEEDRELAY_POLL_INTERVAL_SECS", help = "Seconds between poll cycles.")]
    pub poll_interval_secs: Option<u64>,

    #[arg(long, env = "FEEDRELAY_CACHE_TTL_SECS", help = "Lifetime of cached feed items; must be shorter than the poll interval.")]
    pub cache_ttl_secs: Option<u64>,

    #[arg(long, env = "FEEDRELAY_MAX_RATE", help = "Feeds processed per rate window before pausing.")]
    pub max_rate: Option<u32>,

    #[arg(long, env = "FEEDRELAY_RATE_WINDOW_MS", help = "Length of the rate window in milliseconds.")]
    pub rate_window_ms: Option<u64>,

    #[arg(long, env = "FEEDRELAY_RATE_PAUSE_MS", help = "Pause in milliseconds once the rate is exceeded.")]
    pub rate_pause_ms: Option<u64>,

    #[arg(long, env = "FEEDRELAY_MAX_RETRIES", help = "Failed attempts tolerated per fetch before giving up.")]
    pub max_retries: Option<u32>,

    #[arg(long, env = "FEEDRELAY_REQUEST_TIMEOUT_SECS", help = "Connect, read and overall request timeout in seconds.")]
    pub request_timeout_secs: Option<u64>,

    #[arg(long, env = "FEEDRELAY_USER_AGENT", help = "User-Agent sent with feed requests.")]
    pub user_agent: Option<String>,

    #[arg(long, env = "FEEDRELAY_SIGNATURE", help = "Optional signature header value sent with feed requests.")]
    pub signature: Option<String>,

    #[arg(long, env = "FEEDRELAY_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, env = "FEEDRELAY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[arg(long, env = "FEEDRELAY_SHUTDOWN_LIMIT_SECS", help = "Upper bound in seconds for the shutdown drain.")]
    pub shutdown_limit_secs: Option<u64>,
}

impl GatewayConfig {
    /// Built-in defaults, the lowest layer.
    pub fn defaults() -> Self {
        let fetch = FetchOptions::default();
        let poller = PollerOptions::default();
        GatewayConfig {
            port: Some(3000),
            poll_interval_secs: Some(300),
            cache_ttl_secs: Some(poller.cache_ttl.as_secs()),
            max_rate: Some(poller.max_rate),
            rate_window_ms: Some(poller.rate_window.as_millis() as u64),
            rate_pause_ms: Some(poller.rate_pause.as_millis() as u64),
            max_retries: Some(fetch.max_retries),
            request_timeout_secs: Some(fetch.timeout.as_secs()),
            user_agent: Some(fetch.user_agent),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            shutdown_limit_secs: Some(30),
            ..Default::default()
        }
    }

    // 'other' overrides 'self' wherever it has a value
    fn merge(self, other: GatewayConfig) -> GatewayConfig {
        GatewayConfig {
            config_path: other.config_path.or(self.config_path),
            port: other.port.or(self.port),
            secret: other.secret.or(self.secret),
            database_url: other.database_url.or(self.database_url),
            feeds_file: other.feeds_file.or(self.feeds_file),
            poll_interval_secs: other.poll_interval_secs.or(self.poll_interval_secs),
            cache_ttl_secs: other.cache_ttl_secs.or(self.cache_ttl_secs),
            max_rate: other.max_rate.or(self.max_rate),
            rate_window_ms: other.rate_window_ms.or(self.rate_window_ms),
            rate_pause_ms: other.rate_pause_ms.or(self.rate_pause_ms),
            max_retries: other.max_retries.or(self.max_retries),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
            user_agent: other.user_agent.or(self.user_agent),
            signature: other.signature.or(self.signature),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            shutdown_limit_secs: other.shutdown_limit_secs.or(self.shutdown_limit_secs),
        }
    }

    fn from_file(path: &Path) -> Result<Option<GatewayConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let parsed = serde_json::from_str::<GatewayConfig>(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(Some(parsed))
    }
}

/// Fully resolved settings the gateway runs with.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub port: u16,
    pub secret: String,
    pub database_url: Option<String>,
    pub feeds_file: Option<PathBuf>,
    pub poll_interval: Duration,
    pub cache_ttl: Duration,
    pub max_rate: u32,
    pub rate_window: Duration,
    pub rate_pause: Duration,
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub signature: Option<String>,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub shutdown_limit: Duration,
}

impl GatewaySettings {
    fn from_config(config: GatewayConfig) -> Result<Self> {
        // Every field below has a default, so a None here means defaults() was skipped.
        let missing = |key: &str| anyhow::anyhow!("configuration key {key} has no value");
        let settings = GatewaySettings {
            port: config.port.ok_or_else(|| missing("port"))?,
            secret: config.secret.unwrap_or_default(),
            database_url: config.database_url.filter(|s| !s.trim().is_empty()),
            feeds_file: config.feeds_file,
            poll_interval: Duration::from_secs(config.poll_interval_secs.ok_or_else(|| missing("pollIntervalSecs"))?),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs.ok_or_else(|| missing("cacheTtlSecs"))?),
            max_rate: config.max_rate.ok_or_else(|| missing("maxRate"))?,
            rate_window: Duration::from_millis(config.rate_window_ms.ok_or_else(|| missing("rateWindowMs"))?),
            rate_pause: Duration::from_millis(config.rate_pause_ms.ok_or_else(|| missing("ratePauseMs"))?),
            max_retries: config.max_retries.ok_or_else(|| missing("maxRetries"))?,
            request_timeout: Duration::from_secs(
                config.request_timeout_secs.ok_or_else(|| missing("requestTimeoutSecs"))?,
            ),
            user_agent: config.user_agent.ok_or_else(|| missing("userAgent"))?,
            signature: config.signature.filter(|s| !s.is_empty()),
            log_dir: config.log_dir.ok_or_else(|| missing("logDir"))?,
            log_level: config.log_level.ok_or_else(|| missing("logLevel"))?,
            shutdown_limit: Duration::from_secs(
                config.shutdown_limit_secs.ok_or_else(|| missing("shutdownLimitSecs"))?,
            ),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects settings the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.secret.trim().is_empty() {
            bail!("a shared secret is required (--secret or FEEDRELAY_SECRET)");
        }
        if self.poll_interval.is_zero() {
            bail!("the poll interval must be positive");
        }
        if self.cache_ttl >= self.poll_interval {
            bail!(
                "cache TTL ({:?}) must be shorter than the poll interval ({:?})",
                self.cache_ttl,
                self.poll_interval
            );
        }
        if self.max_rate < 1 {
            bail!("maxRate must be at least 1");
        }
        Ok(())
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            max_retries: self.max_retries,
            user_agent: self.user_agent.clone(),
            signature: self.signature.clone(),
            timeout: self.request_timeout,
        }
    }

    pub fn poller_options(&self) -> PollerOptions {
        PollerOptions {
            max_rate: self.max_rate,
            rate_window: self.rate_window,
            rate_pause: self.rate_pause,
            cache_ttl: self.cache_ttl,
        }
    }
}

/// Layers defaults, the config file named by `cli` (or `feedrelay.conf`) and
/// `cli` itself, then validates the result.
pub fn resolve(cli: GatewayConfig) -> Result<GatewaySettings> {
    let path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current = GatewayConfig::defaults();
    match GatewayConfig::from_file(&path)? {
        Some(file_config) => current = current.merge(file_config),
        None => tracing::info!(
            path = %path.display(),
            "config file not found, using defaults and environment/CLI values"
        ),
    }
    GatewaySettings::from_config(current.merge(cli))
}

/// Loads `.env`, parses the command line and environment, and resolves the settings.
pub fn load_config() -> Result<GatewaySettings> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    resolve(GatewayConfig::parse())
}
