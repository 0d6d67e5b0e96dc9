//! Configuration loading and management

use std::time::Duration;

use crate::error::ConfigError;

/// Development address of the controller service
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:5000/ws";

/// Reconnection attempts before the transport gives up
pub const DEFAULT_MAX_RECONNECTS: u32 = 10;

const ENDPOINT_VAR: &str = "TRIG_LIGHT_ENDPOINT";
const RECORDING_TIMEOUT_VAR: &str = "TRIG_LIGHT_RECORDING_TIMEOUT_SECS";
const LEGACY_CHANNELS_VAR: &str = "TRIG_LIGHT_LEGACY_CHANNELS";
const MAX_RECONNECTS_VAR: &str = "TRIG_LIGHT_MAX_RECONNECTS";

/// Client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// WebSocket URL of the controller service
    pub endpoint: String,

    /// Revert a stuck recording to Idle after this long (disabled when `None`)
    pub recording_timeout: Option<Duration>,

    /// Accept `led1`/`led2`/`led3` keyed status payloads
    pub legacy_channels: bool,

    /// Reconnection attempts after an unexpected drop
    pub max_reconnect_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            recording_timeout: None,
            legacy_channels: false,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECTS,
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(endpoint) = lookup(ENDPOINT_VAR) {
            let endpoint = endpoint.trim();
            if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
                return Err(invalid(ENDPOINT_VAR, endpoint));
            }
            config.endpoint = endpoint.to_string();
        }

        if let Some(raw) = lookup(RECORDING_TIMEOUT_VAR) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|_| invalid(RECORDING_TIMEOUT_VAR, &raw))?;
            config.recording_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(raw) = lookup(LEGACY_CHANNELS_VAR) {
            config.legacy_channels =
                parse_flag(&raw).ok_or_else(|| invalid(LEGACY_CHANNELS_VAR, &raw))?;
        }

        if let Some(raw) = lookup(MAX_RECONNECTS_VAR) {
            config.max_reconnect_attempts = raw
                .trim()
                .parse()
                .map_err(|_| invalid(MAX_RECONNECTS_VAR, &raw))?;
        }

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}
