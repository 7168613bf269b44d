//! Client configuration.
//!
//! Defaults match a camera acting as its own access point. Values can come
//! from a JSON file and are then overridden by `FUJI_REMOTE_*` environment
//! variables.

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{
    ASYNC_RESPONSE_SERVER_PORT, CONTROL_SERVER_PORT, DEFAULT_CAMERA_HOST, JPG_STREAM_SERVER_PORT,
};

/// Longest client name the hello payload can carry, in UTF-16 code units
pub const MAX_CLIENT_NAME_LEN: usize = 26;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub control_port: u16,
    pub async_port: u16,
    pub live_view_port: u16,
    /// Name announced to the camera during the hello exchange
    pub client_name: String,
    pub connect_timeout_ms: u64,
    /// Upper bound for one reply read on the control or async channel
    pub read_timeout_ms: u64,
    /// How long stopping live view waits for an in-flight frame read
    pub live_view_poll_ms: u64,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_CAMERA_HOST.to_string(),
            control_port: CONTROL_SERVER_PORT,
            async_port: ASYNC_RESPONSE_SERVER_PORT,
            live_view_port: JPG_STREAM_SERVER_PORT,
            client_name: "fuji-remote".to_string(),
            connect_timeout_ms: 5_000,
            read_timeout_ms: 5_000,
            live_view_poll_ms: 500,
            log_filter: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&text)
            .map_err(|e| Error::UnknownOrInvalidValue(format!("config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FUJI_REMOTE_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(host) = lookup("FUJI_REMOTE_HOST") {
            self.host = host;
        }
        if let Some(name) = lookup("FUJI_REMOTE_CLIENT_NAME") {
            self.client_name = name;
        }
        if let Some(filter) = lookup("FUJI_REMOTE_LOG") {
            self.log_filter = filter;
        }
        if let Some(ms) = lookup("FUJI_REMOTE_READ_TIMEOUT_MS") {
            self.read_timeout_ms = ms
                .parse()
                .map_err(|_| Error::UnknownOrInvalidValue(format!("read timeout: {}", ms)))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_name.encode_utf16().count() > MAX_CLIENT_NAME_LEN {
            return Err(Error::UnknownOrInvalidValue(format!(
                "client name longer than {} characters",
                MAX_CLIENT_NAME_LEN
            )));
        }
        if self.read_timeout_ms == 0 || self.live_view_poll_ms == 0 {
            return Err(Error::UnknownOrInvalidValue(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn live_view_poll(&self) -> Duration {
        Duration::from_millis(self.live_view_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"host": "10.0.0.2"}"#).unwrap();
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.control_port, 55740);
        assert_eq!(config.live_view_port, 55742);
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::default()
            .with_overrides(|key| match key {
                "FUJI_REMOTE_HOST" => Some("172.16.0.9".to_string()),
                "FUJI_REMOTE_READ_TIMEOUT_MS" => Some("250".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.host, "172.16.0.9");
        assert_eq!(config.read_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_long_client_name() {
        let config = ClientConfig {
            client_name: "x".repeat(27),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_timeout_override() {
        let result = ClientConfig::default().with_overrides(|key| {
            (key == "FUJI_REMOTE_READ_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(Error::UnknownOrInvalidValue(_))));
    }
}
