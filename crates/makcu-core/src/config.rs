//! Session configuration
//!
//! Timing and rate settings for the connect handshake, the command channel
//! and the button poller. Stored as JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::protocol::{
    DEFAULT_TIMEOUT_MS, HIGH_SPEED_BAUD_RATE, INITIAL_BAUD_RATE, MAX_RESPONSE_SIZE,
};

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Rate used to open the port and send the rate-switch frame
    pub initial_baud_rate: u32,
    /// Rate the port is reopened at after the switch
    pub high_speed_baud_rate: u32,
    /// Channel read/write timeout in milliseconds
    pub timeout_ms: u64,
    /// Pause between closing the low-speed port and reopening it
    pub rate_switch_settle_ms: u64,
    /// Pause after the reopen before the firmware accepts commands
    pub init_settle_ms: u64,
    /// Pause after the initialization command
    pub init_post_delay_ms: u64,
    /// How long a query waits before reading the reply
    pub response_wait_ms: u64,
    /// Byte cap for a query reply
    pub response_max_bytes: usize,
    /// Button poller sample interval
    pub poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_baud_rate: INITIAL_BAUD_RATE,
            high_speed_baud_rate: HIGH_SPEED_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            rate_switch_settle_ms: 100,
            init_settle_ms: 2000,
            init_post_delay_ms: 50,
            response_wait_ms: 50,
            response_max_bytes: MAX_RESPONSE_SIZE,
            poll_interval_ms: 5,
        }
    }
}

impl SessionConfig {
    /// Configuration with every settle/wait shortened, for simulated endpoints
    pub fn fast() -> Self {
        Self {
            rate_switch_settle_ms: 1,
            init_settle_ms: 1,
            init_post_delay_ms: 0,
            response_wait_ms: 10,
            poll_interval_ms: 1,
            ..Self::default()
        }
    }

    /// Channel read/write timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Pause between closing and reopening during the rate switch
    pub fn rate_switch_settle(&self) -> Duration {
        Duration::from_millis(self.rate_switch_settle_ms)
    }

    /// Pause before the initialization command
    pub fn init_settle(&self) -> Duration {
        Duration::from_millis(self.init_settle_ms)
    }

    /// Pause after the initialization command
    pub fn init_post_delay(&self) -> Duration {
        Duration::from_millis(self.init_post_delay_ms)
    }

    /// Query reply wait
    pub fn response_wait(&self) -> Duration {
        Duration::from_millis(self.response_wait_ms)
    }

    /// Button poller sample interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Save as pretty-printed JSON
    pub fn save_json_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device() {
        let config = SessionConfig::default();
        assert_eq!(config.initial_baud_rate, 115_200);
        assert_eq!(config.high_speed_baud_rate, 4_000_000);
        assert_eq!(config.rate_switch_settle(), Duration::from_millis(100));
        assert_eq!(config.init_settle(), Duration::from_secs(2));
        assert_eq!(config.response_max_bytes, 1024);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"init_settle_ms": 500}"#).unwrap();
        assert_eq!(config.init_settle_ms, 500);
        assert_eq!(config.poll_interval_ms, 5);
        assert_eq!(config.high_speed_baud_rate, HIGH_SPEED_BAUD_RATE);
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let config = SessionConfig {
            poll_interval_ms: 2,
            ..SessionConfig::fast()
        };
        config.save_json_file(&path).unwrap();
        assert_eq!(SessionConfig::from_json_file(&path).unwrap(), config);

        std::fs::write(&path, "{ not json").unwrap();
        let err = SessionConfig::from_json_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
