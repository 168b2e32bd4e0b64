//! Client configuration from environment variables.

use std::time::Duration;

use crate::error::ConfigError;
use crate::ws::ReconnectConfig;

/// Realtime client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin of the hosting page, e.g. `https://market.example.com`.
    pub origin: String,
    /// Path of the realtime endpoint on the origin host.
    pub ws_path: String,
    /// Connect as soon as a user is authenticated.
    pub auto_connect: bool,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            ws_path: "/ws".to_string(),
            auto_connect: true,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `BIDLINK_ORIGIN`: page origin (default: "http://localhost:8080")
    /// - `BIDLINK_WS_PATH`: realtime endpoint path (default: "/ws")
    /// - `BIDLINK_AUTO_CONNECT`: connect on login (default: true)
    /// - `BIDLINK_AUTO_RECONNECT`: retry after unexpected closes (default: true)
    /// - `BIDLINK_RECONNECT_MAX_ATTEMPTS`: retries before giving up (default: 5)
    /// - `BIDLINK_RECONNECT_INITIAL_MS`: first retry delay (default: 1000)
    /// - `BIDLINK_RECONNECT_MAX_MS`: delay cap (default: 30000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let reconnect = ReconnectConfig {
            enabled: parse_bool("BIDLINK_AUTO_RECONNECT", get("BIDLINK_AUTO_RECONNECT"))?
                .unwrap_or(defaults.reconnect.enabled),
            max_attempts: parse_num("BIDLINK_RECONNECT_MAX_ATTEMPTS", get("BIDLINK_RECONNECT_MAX_ATTEMPTS"))?
                .unwrap_or(defaults.reconnect.max_attempts),
            initial_delay: parse_num("BIDLINK_RECONNECT_INITIAL_MS", get("BIDLINK_RECONNECT_INITIAL_MS"))?
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.initial_delay),
            max_delay: parse_num("BIDLINK_RECONNECT_MAX_MS", get("BIDLINK_RECONNECT_MAX_MS"))?
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.max_delay),
            backoff_multiplier: defaults.reconnect.backoff_multiplier,
        };

        Ok(Self {
            origin: get("BIDLINK_ORIGIN").unwrap_or(defaults.origin),
            ws_path: get("BIDLINK_WS_PATH").unwrap_or(defaults.ws_path),
            auto_connect: parse_bool("BIDLINK_AUTO_CONNECT", get("BIDLINK_AUTO_CONNECT"))?
                .unwrap_or(defaults.auto_connect),
            reconnect,
        })
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError {
            key: key.to_string(),
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    let Some(value) = value else {
        return Ok(None);
    };
    value.trim().parse().map(Some).map_err(|e: T::Err| ConfigError {
        key: key.to_string(),
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.origin, "http://localhost:8080");
        assert_eq!(config.ws_path, "/ws");
        assert!(config.auto_connect);
        assert!(config.reconnect.enabled);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(1000));
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(30000));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("BIDLINK_ORIGIN", "https://market.example.com"),
            ("BIDLINK_AUTO_CONNECT", "no"),
            ("BIDLINK_AUTO_RECONNECT", "FALSE"),
            ("BIDLINK_RECONNECT_MAX_ATTEMPTS", "3"),
            ("BIDLINK_RECONNECT_INITIAL_MS", "250"),
            ("BIDLINK_WS_PATH", ""),
        ]))
        .unwrap();

        assert_eq!(config.origin, "https://market.example.com");
        assert_eq!(config.ws_path, "/ws");
        assert!(!config.auto_connect);
        assert!(!config.reconnect.enabled);
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values() {
        let err = ClientConfig::from_lookup(lookup(&[("BIDLINK_RECONNECT_MAX_ATTEMPTS", "lots")]))
            .unwrap_err();
        assert_eq!(err.key, "BIDLINK_RECONNECT_MAX_ATTEMPTS");
        assert_eq!(err.value, "lots");

        let err = ClientConfig::from_lookup(lookup(&[("BIDLINK_AUTO_CONNECT", "maybe")])).unwrap_err();
        assert_eq!(err.key, "BIDLINK_AUTO_CONNECT");
    }
}
