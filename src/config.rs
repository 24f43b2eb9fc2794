//! Process configuration read from `SCANNER_*` environment variables.

use std::env;
use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::connection::ResubscribePolicy;

pub const DEFAULT_API_BASE_URL: &str = "https://api-rs.dexcelerate.com";
pub const DEFAULT_WS_URL: &str = "wss://api-rs.dexcelerate.com/ws";
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    pub api_base_url: String,
    pub ws_url: String,
    pub http_timeout_ms: u64,
    pub dashboard_addr: SocketAddr,
    pub resubscribe: ResubscribePolicy,
    pub stream_enabled: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            dashboard_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            resubscribe: ResubscribePolicy::None,
            stream_enabled: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name} url {value}: {message}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        message: String,
    },
    #[error("{name} must use one of {expected}, got {scheme}")]
    UnsupportedScheme {
        name: &'static str,
        scheme: String,
        expected: &'static str,
    },
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("SCANNER_API_BASE_URL", &self.api_base_url, &["http", "https"])?;
        if self.stream_enabled {
            check_url("SCANNER_WS_URL", &self.ws_url, &["ws", "wss"])?;
        }
        Ok(())
    }
}

fn check_url(name: &'static str, value: &str, schemes: &[&'static str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|err| ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
        message: err.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::UnsupportedScheme {
            name,
            scheme: url.scheme().to_string(),
            expected: if schemes.contains(&"ws") {
                "ws/wss"
            } else {
                "http/https"
            },
        });
    }
    Ok(())
}

/// Reads the environment over [`ScannerConfig::default`]. Unparsable values
/// are logged and ignored.
pub fn scanner_config_from_env() -> ScannerConfig {
    let mut config = ScannerConfig::default();

    if let Some(base_url) = non_empty_var("SCANNER_API_BASE_URL") {
        config.api_base_url = base_url;
    }

    if let Some(ws_url) = non_empty_var("SCANNER_WS_URL") {
        config.ws_url = ws_url;
    }

    if let Some(raw) = non_empty_var("SCANNER_HTTP_TIMEOUT_MS") {
        match raw.parse::<u64>() {
            Ok(timeout) if timeout > 0 => config.http_timeout_ms = timeout,
            _ => ignored("SCANNER_HTTP_TIMEOUT_MS", &raw),
        }
    }

    if let Some(raw) = non_empty_var("SCANNER_DASHBOARD_ADDR") {
        match raw.parse::<SocketAddr>() {
            Ok(addr) => config.dashboard_addr = addr,
            Err(_) => ignored("SCANNER_DASHBOARD_ADDR", &raw),
        }
    }

    if let Some(raw) = non_empty_var("SCANNER_RESUBSCRIBE_ON_RECONNECT") {
        match parse_bool(&raw) {
            Some(true) => config.resubscribe = ResubscribePolicy::Replay,
            Some(false) => config.resubscribe = ResubscribePolicy::None,
            None => ignored("SCANNER_RESUBSCRIBE_ON_RECONNECT", &raw),
        }
    }

    if let Some(raw) = non_empty_var("SCANNER_STREAM_DISABLED") {
        match parse_bool(&raw) {
            Some(disabled) => config.stream_enabled = !disabled,
            None => ignored("SCANNER_STREAM_DISABLED", &raw),
        }
    }

    config
}

pub(crate) fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn ignored(name: &str, value: &str) {
    warn!(
        component = "config",
        event = "config.value.ignored",
        name,
        value,
        "unparsable configuration value, keeping default"
    );
}

#[cfg(test)]
pub(crate) mod test_env {
    use std::env;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    /// Runs `f` with the given variables set (or removed), restoring them
    /// afterwards. Serialized across tests.
    pub(crate) fn with_env_vars<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        let _guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let saved: Vec<(&str, Option<String>)> = vars
            .iter()
            .map(|(name, _)| (*name, env::var(name).ok()))
            .collect();

        let apply = |name: &str, value: Option<&str>| match value {
            Some(value) => env::set_var(name, value),
            None => env::remove_var(name),
        };
        for (name, value) in vars {
            apply(name, *value);
        }
        let output = f();
        for (name, value) in &saved {
            apply(name, value.as_deref());
        }

        output
    }
}
