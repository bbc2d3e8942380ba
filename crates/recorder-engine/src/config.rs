//! Recorder configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use recorder_protocol::{ConnectOptions, DEFAULT_MAX_PAYLOAD_LEN};

use crate::classifier::RoutingMode;
use crate::error::RecorderError;
use crate::session::SessionOptions;
use crate::{RecorderResult, DEFAULT_COMMENT, DEFAULT_FALLBACK_DURATION_US};

/// Configuration for one recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Address of the mirroring service (e.g., "127.0.0.1:27183").
    pub server_addr: String,

    /// Session identifier sent as the handshake.
    pub session_id: String,

    /// Output container file.
    pub output_path: PathBuf,

    /// Comment stored in the container metadata.
    pub comment: String,

    /// How units are assigned to streams.
    pub routing: RoutingMode,

    /// Duration of the last unit of each stream (default: 100 ms).
    pub fallback_duration_us: u64,

    /// Largest payload accepted from the wire (default: 64 MiB).
    pub max_payload_len: usize,

    /// TCP connect deadline (None for the OS default).
    pub connect_timeout_ms: Option<u64>,

    /// Per-read deadline (None to block indefinitely).
    pub read_timeout_ms: Option<u64>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            server_addr: String::new(),
            session_id: String::new(),
            output_path: PathBuf::from("recording.flv"),
            comment: DEFAULT_COMMENT.to_string(),
            routing: RoutingMode::Auto,
            fallback_duration_us: DEFAULT_FALLBACK_DURATION_US,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            connect_timeout_ms: None,
            read_timeout_ms: None,
        }
    }
}

impl RecorderConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> RecorderResult<Self> {
        serde_json::from_str(json).map_err(|e| RecorderError::Config(e.to_string()))
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file(path: &Path) -> RecorderResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check the fields the recorder cannot run without.
    pub fn validate(&self) -> RecorderResult<()> {
        if self.server_addr.trim().is_empty() {
            return Err(RecorderError::Config("server_addr is empty".to_string()));
        }
        if self.session_id.is_empty() {
            return Err(RecorderError::Config("session_id is empty".to_string()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(RecorderError::Config("output_path is empty".to_string()));
        }
        if self.fallback_duration_us == 0 {
            return Err(RecorderError::Config(
                "fallback_duration_us must be positive".to_string(),
            ));
        }
        if self.max_payload_len == 0 {
            return Err(RecorderError::Config(
                "max_payload_len must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            routing: self.routing,
            fallback_duration_us: self.fallback_duration_us,
            max_payload_len: self.max_payload_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RecorderConfig {
        RecorderConfig {
            server_addr: "127.0.0.1:27183".to_string(),
            session_id: "1a2b3c4d".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.comment, DEFAULT_COMMENT);
        assert_eq!(config.fallback_duration_us, 100_000);
        assert_eq!(config.max_payload_len, 64 * 1024 * 1024);
        assert_eq!(config.routing, RoutingMode::Auto);
    }

    #[test]
    fn test_partial_json() {
        let config = RecorderConfig::from_json_str(
            r#"{
                "server_addr": "10.0.0.2:27183",
                "session_id": "abc",
                "output_path": "/tmp/out.flv",
                "routing": "video_only",
                "read_timeout_ms": 5000
            }"#,
        )
        .unwrap();

        assert_eq!(config.server_addr, "10.0.0.2:27183");
        assert_eq!(config.output_path, PathBuf::from("/tmp/out.flv"));
        assert_eq!(config.routing, RoutingMode::VideoOnly);
        assert_eq!(config.fallback_duration_us, DEFAULT_FALLBACK_DURATION_US);
        assert_eq!(
            config.connect_options().read_timeout,
            Some(Duration::from_secs(5))
        );
        assert!(config.connect_options().connect_timeout.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            RecorderConfig::from_json_str("{ \"routing\": \"sideways\" }"),
            Err(RecorderError::Config(_))
        ));
    }

    #[test]
    fn test_validation() {
        valid().validate().unwrap();

        let mut config = valid();
        config.server_addr = " ".to_string();
        assert!(matches!(config.validate(), Err(RecorderError::Config(_))));

        let mut config = valid();
        config.session_id.clear();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.fallback_duration_us = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.max_payload_len = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_options() {
        let mut config = valid();
        config.fallback_duration_us = 33_333;
        let options = config.session_options();
        assert_eq!(options.fallback_duration_us, 33_333);
        assert_eq!(options.routing, RoutingMode::Auto);
    }
}
