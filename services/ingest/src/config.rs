//! Application configuration
//!
//! Settings load from an optional JSON file, then environment overrides
//! (`INGEST_*`), then validate. Validation failures are fatal at startup;
//! nothing revalidates at runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use types::errors::ConfigError;

/// Engine configuration with the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// TCP listen port.
    pub tcp_port: u16,
    /// Name of the local byte-stream endpoint; the socket file is
    /// `<tmp>/<pipe_name>.sock`.
    pub pipe_name: String,
    /// Batch release threshold in messages (1..=10000).
    pub batch_size: usize,
    /// Batch release deadline in milliseconds (1..=10000).
    pub batch_timeout_ms: u64,
    /// Upper bound on consumer-side refresh callbacks (1..=120).
    pub max_refresh_fps: u32,
    /// Read buffer size per connection, in bytes.
    pub tcp_buffer_size: usize,
    /// Whether the metrics CSV pipeline runs.
    pub enable_metrics: bool,
    /// Directory for daily log files.
    pub log_directory: PathBuf,
    /// Ingest channel bound; producers block when full.
    pub ingest_queue_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tcp_port: 9999,
            pipe_name: "TradingDataPipe".to_string(),
            batch_size: 1_000,
            batch_timeout_ms: 100,
            max_refresh_fps: 60,
            tcp_buffer_size: 8_192,
            enable_metrics: true,
            log_directory: PathBuf::from("Logs"),
            ingest_queue_capacity: 100_000,
        }
    }
}

impl AppConfig {
    /// Load from an optional JSON file, apply environment overrides,
    /// then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Environment variables win over file values.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<u16>("INGEST_TCP_PORT") {
            self.tcp_port = v;
        }
        if let Ok(v) = std::env::var("INGEST_PIPE_NAME") {
            self.pipe_name = v;
        }
        if let Some(v) = env_parse::<usize>("INGEST_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = env_parse::<u64>("INGEST_BATCH_TIMEOUT_MS") {
            self.batch_timeout_ms = v;
        }
        if let Some(v) = env_parse::<u32>("INGEST_MAX_REFRESH_FPS") {
            self.max_refresh_fps = v;
        }
        if let Some(v) = env_parse::<usize>("INGEST_TCP_BUFFER_SIZE") {
            self.tcp_buffer_size = v;
        }
        if let Some(v) = env_parse::<bool>("INGEST_ENABLE_METRICS") {
            self.enable_metrics = v;
        }
        if let Ok(v) = std::env::var("INGEST_LOG_DIRECTORY") {
            self.log_directory = PathBuf::from(v);
        }
        if let Some(v) = env_parse::<usize>("INGEST_QUEUE_CAPACITY") {
            self.ingest_queue_capacity = v;
        }
    }

    /// Range checks per the configuration contract.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tcp_port == 0 {
            return Err(out_of_range("tcp_port", self.tcp_port, "1..65535"));
        }
        if self.pipe_name.is_empty() {
            return Err(ConfigError::Empty { field: "pipe_name" });
        }
        if !(1..=10_000).contains(&self.batch_size) {
            return Err(out_of_range("batch_size", self.batch_size, "1..10000"));
        }
        if !(1..=10_000).contains(&self.batch_timeout_ms) {
            return Err(out_of_range("batch_timeout_ms", self.batch_timeout_ms, "1..10000"));
        }
        if !(1..=120).contains(&self.max_refresh_fps) {
            return Err(out_of_range("max_refresh_fps", self.max_refresh_fps, "1..120"));
        }
        if self.tcp_buffer_size == 0 {
            return Err(out_of_range("tcp_buffer_size", self.tcp_buffer_size, "1.."));
        }
        if self.ingest_queue_capacity == 0 {
            return Err(out_of_range("ingest_queue_capacity", self.ingest_queue_capacity, "1.."));
        }
        Ok(())
    }

    /// Consumer refresh interval derived from `max_refresh_fps`.
    pub fn ui_update_interval_ms(&self) -> u64 {
        1_000 / u64::from(self.max_refresh_fps)
    }

    /// Filesystem path of the local byte-stream endpoint.
    pub fn local_socket_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("{}.sock", self.pipe_name))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn out_of_range(field: &'static str, value: impl std::fmt::Display, allowed: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
        allowed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tcp_port, 9999);
        assert_eq!(config.pipe_name, "TradingDataPipe");
        assert_eq!(config.batch_size, 1_000);
        assert_eq!(config.batch_timeout_ms, 100);
        assert_eq!(config.tcp_buffer_size, 8_192);
        assert!(config.enable_metrics);
    }

    #[test]
    fn test_ui_interval_derived_from_fps() {
        let config = AppConfig::default();
        assert_eq!(config.ui_update_interval_ms(), 16);

        let slow = AppConfig {
            max_refresh_fps: 1,
            ..AppConfig::default()
        };
        assert_eq!(slow.ui_update_interval_ms(), 1_000);
    }

    #[test]
    fn test_zero_port_rejected() {
        let config = AppConfig {
            tcp_port: 0,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "tcp_port", .. })
        ));
    }

    #[test]
    fn test_empty_pipe_name_rejected() {
        let config = AppConfig {
            pipe_name: String::new(),
            ..AppConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Empty { field: "pipe_name" }));
    }

    #[test]
    fn test_batch_bounds_rejected() {
        for batch_size in [0usize, 10_001] {
            let config = AppConfig {
                batch_size,
                ..AppConfig::default()
            };
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"tcp_port": 7777}"#).unwrap();
        assert_eq!(config.tcp_port, 7777);
        assert_eq!(config.batch_size, 1_000);
    }

    #[test]
    fn test_socket_path_uses_pipe_name() {
        let config = AppConfig::default();
        let path = config.local_socket_path();
        assert!(path.to_string_lossy().ends_with("TradingDataPipe.sock"));
    }
}
