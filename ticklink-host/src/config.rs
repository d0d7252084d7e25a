//! Session configuration
//!
//! Loaded from TOML; every key is optional:
//!
//! ```toml
//! port = "/dev/ttyUSB0"
//! baud_rate = 57600
//! read_timeout_ms = 100
//! call_timeout_ms = 120000
//! servo_event_window_ms = 5000
//! servo_timeout_ms = 120000
//! inbox_limit = 256
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use ticklink_protocol::BAUD_RATE;

use crate::dispatcher::DEFAULT_INBOX_LIMIT;
use crate::error::Result;

/// Serial link and timing settings of a session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Serial device path
    pub port: String,
    pub baud_rate: u32,
    /// Serial read timeout; bounds how long the reader takes to notice a
    /// closed session
    pub read_timeout_ms: u64,
    /// Limit for one command exchange
    pub call_timeout_ms: u64,
    /// Quiet period after which a servo wait falls back to polling
    pub servo_event_window_ms: u64,
    /// Limit for one servo wait
    pub servo_timeout_ms: u64,
    /// Unclaimed data lines kept for `next_line`; the oldest is dropped
    /// when full
    pub inbox_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: String::from("/dev/ttyUSB0"),
            baud_rate: BAUD_RATE,
            read_timeout_ms: 100,
            call_timeout_ms: 120_000,
            servo_event_window_ms: 5_000,
            servo_timeout_ms: 120_000,
            inbox_limit: DEFAULT_INBOX_LIMIT,
        }
    }
}

impl SessionConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn servo_event_window(&self) -> Duration {
        Duration::from_millis(self.servo_event_window_ms)
    }

    pub fn servo_timeout(&self) -> Duration {
        Duration::from_millis(self.servo_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_toml("").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.baud_rate, 57_600);
        assert_eq!(config.call_timeout(), Duration::from_secs(120));
        assert_eq!(config.servo_event_window(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_override() {
        let config = SessionConfig::from_toml(
            r#"
            port = "/dev/ttyACM1"
            servo_event_window_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.port, "/dev/ttyACM1");
        assert_eq!(config.servo_event_window_ms, 250);
        assert_eq!(config.servo_timeout_ms, 120_000);
        assert_eq!(config.inbox_limit, 256);
    }

    #[test]
    fn test_rejects_bad_types() {
        let err = SessionConfig::from_toml("baud_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, crate::HostError::Config(_)));
    }
}
