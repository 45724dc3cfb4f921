// src/config.rs
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::text_record::TextEncoding;

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV: &str = "NFC_TEXT_TAG_CONFIG";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3500;
const FALLBACK_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// WebSocket bind address
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Language code used when a write request names none
    #[serde(default = "default_language")]
    pub default_language: String,

    #[serde(default)]
    pub default_encoding: TextEncoding,

    /// How long each PC/SC status-change wait lasts
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Buffer of the event broadcast to WebSocket clients
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_language() -> String {
    std::env::var("LANG")
        .ok()
        .and_then(|locale| language_from_locale(&locale))
        .unwrap_or_else(|| FALLBACK_LANGUAGE.to_string())
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_event_capacity() -> usize {
    100
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_language: default_language(),
            default_encoding: TextEncoding::default(),
            poll_interval_ms: default_poll_interval_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl ServiceConfig {
    /// Load config from the given file, or return defaults if not found
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: ServiceConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Catches values that would only fail once the service is starting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        Ok(())
    }

    /// Load from the file named by `NFC_TEXT_TAG_CONFIG`, defaults otherwise
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Language part of a POSIX locale: `en_US.UTF-8` -> `en`.
pub fn language_from_locale(locale: &str) -> Option<String> {
    let language = locale
        .split(['_', '.', '@'])
        .next()
        .unwrap_or_default();

    if language.is_empty()
        || language == "C"
        || language == "POSIX"
        || !language.chars().all(|c| c.is_ascii_alphabetic())
    {
        return None;
    }
    Some(language.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 3500);
        assert_eq!(config.default_encoding, TextEncoding::Utf8);
        assert_eq!(
            config.bind_addr().unwrap(),
            "127.0.0.1:3500".parse().unwrap()
        );
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempdir().unwrap();
        let config = ServiceConfig::load(dir.path().join("config.json")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_load_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"port": 4000, "default_language": "it", "default_encoding": "utf16"}"#,
        )
        .unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.default_language, "it");
        assert_eq!(config.default_encoding, TextEncoding::Utf16);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.event_capacity, 100);
    }

    #[test]
    fn test_invalid_host() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"host": "not an ip"}"#).unwrap();

        assert!(matches!(
            ServiceConfig::load(&path),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_zero_event_capacity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"event_capacity": 0}"#).unwrap();

        assert!(matches!(
            ServiceConfig::load(&path),
            Err(ConfigError::ZeroEventCapacity)
        ));
    }

    #[test]
    fn test_malformed_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ port: ").unwrap();

        assert!(matches!(
            ServiceConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_language_from_locale() {
        assert_eq!(language_from_locale("en_US.UTF-8").as_deref(), Some("en"));
        assert_eq!(language_from_locale("it_IT").as_deref(), Some("it"));
        assert_eq!(language_from_locale("de").as_deref(), Some("de"));
        assert_eq!(language_from_locale("sr_RS@latin").as_deref(), Some("sr"));
        assert_eq!(language_from_locale("C.UTF-8"), None);
        assert_eq!(language_from_locale("POSIX"), None);
        assert_eq!(language_from_locale(""), None);
    }
}
