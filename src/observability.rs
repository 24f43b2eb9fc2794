//! Logging setup and the dashboard server's lifecycle events.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{ignored, non_empty_var, parse_bool, ScannerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
    /// Variables that were set but unusable. Reported by [`log_app_start`]
    /// once a subscriber exists to receive the warning.
    pub rejected: Vec<(&'static str, String)>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
            rejected: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Reads `SCANNER_LOG_LEVEL`, `SCANNER_LOG_FORMAT` and `SCANNER_LOG_TARGET`.
pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Some(level) = non_empty_var("SCANNER_LOG_LEVEL") {
        if EnvFilter::try_new(&level).is_ok() {
            config.level = level;
        } else {
            config.rejected.push(("SCANNER_LOG_LEVEL", level));
        }
    }

    if let Some(raw) = non_empty_var("SCANNER_LOG_FORMAT") {
        match LogFormat::parse(&raw) {
            Some(format) => config.format = format,
            None => config.rejected.push(("SCANNER_LOG_FORMAT", raw)),
        }
    }

    if let Some(raw) = non_empty_var("SCANNER_LOG_TARGET") {
        match parse_bool(&raw) {
            Some(include_target) => config.include_target = include_target,
            None => config.rejected.push(("SCANNER_LOG_TARGET", raw)),
        }
    }

    config
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(config.format == LogFormat::Pretty);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "dashboard_server",
        event = "app.start",
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
    for (name, value) in &config.rejected {
        ignored(name, value);
    }
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "dashboard_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        route = "/dashboard"
    );
}

/// Whether the dashboard attaches to the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelection<'a> {
    Live { ws_url: &'a str },
    Disabled { reason: &'static str },
}

impl<'a> StreamSelection<'a> {
    pub fn for_config(config: &'a ScannerConfig) -> Self {
        if !config.stream_enabled {
            Self::Disabled {
                reason: "SCANNER_STREAM_DISABLED",
            }
        } else if cfg!(feature = "stream") {
            Self::Live {
                ws_url: &config.ws_url,
            }
        } else {
            Self::Disabled {
                reason: "stream_feature_disabled",
            }
        }
    }
}

pub fn log_stream_selected(selection: StreamSelection<'_>) {
    match selection {
        StreamSelection::Live { ws_url } => info!(
            component = "dashboard_server",
            event = "stream.selected",
            mode = "live",
            ws_url
        ),
        StreamSelection::Disabled { reason } => info!(
            component = "dashboard_server",
            event = "stream.selected",
            mode = "disabled",
            reason
        ),
    }
}
