//! Configuration management for sesame-ble.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file (JSON)
//! 3. Default values

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bridge::SetupInput;
use crate::device::DeviceType;
use crate::mech::LockWindow;
use crate::session::{RetryPolicy, SessionConfig};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session tunables.
    pub session: SessionSection,
    /// Mech status decoding.
    pub decoder: DecoderSection,
    /// Devices to register at startup.
    pub devices: Vec<SetupInput>,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Connect attempts per sequence.
    pub retry_budget: u32,
    /// Pause between attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Login answer deadline in seconds.
    pub login_timeout_secs: u64,
    /// Scan window per attempt in seconds.
    pub scan_duration_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            retry_budget: 10,
            retry_delay_ms: 500,
            login_timeout_secs: 10,
            scan_duration_secs: 15,
        }
    }
}

/// Decoder configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSection {
    /// Locked window overrides by device type.
    pub lock_windows: HashMap<DeviceType, LockWindow>,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Filter directives, e.g. `info` or `sesame_ble=debug`.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: crate::logging::DEFAULT_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(budget) = var("SESAME_RETRY_BUDGET").and_then(|v| v.parse().ok()) {
            self.session.retry_budget = budget;
        }

        if let Some(secs) = var("SESAME_LOGIN_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.session.login_timeout_secs = secs;
        }

        if let Some(secs) = var("SESAME_SCAN_DURATION_SECS").and_then(|v| v.parse().ok()) {
            self.session.scan_duration_secs = secs;
        }

        if let Some(level) = var("SESAME_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: env vars > config file > defaults. Every configured
    /// device is checked for a known device type.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.setup_inputs()?;

        Ok(config)
    }

    /// Convert to the runtime session configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            retry: RetryPolicy {
                budget: self.session.retry_budget,
                delay: Duration::from_millis(self.session.retry_delay_ms),
            },
            login_timeout: Duration::from_secs(self.session.login_timeout_secs),
            scan_duration: Duration::from_secs(self.session.scan_duration_secs),
        }
    }

    /// Configured devices, each checked for a known device type and a
    /// usable key.
    pub fn setup_inputs(&self) -> Result<&[SetupInput], ConfigError> {
        for device in &self.devices {
            if let Err(e) = device.identity().and_then(|_| device.key()) {
                return Err(ConfigError::InvalidDevice {
                    address: device.mac_address.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(&self.devices)
    }

    /// Locked window for `device_type`, configured or factory.
    pub fn lock_window_for(&self, device_type: DeviceType) -> Option<LockWindow> {
        self.decoder
            .lock_windows
            .get(&device_type)
            .copied()
            .or_else(|| LockWindow::default_for(device_type))
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// A configured device cannot be set up.
    InvalidDevice { address: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidDevice { address, reason } => {
                write!(f, "invalid device {}: {}", address, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.retry_budget, 10);
        assert_eq!(config.session.retry_delay_ms, 500);
        assert_eq!(config.session.scan_duration_secs, 15);
        assert!(config.devices.is_empty());
        assert_eq!(config.log_filter(), "sesame_ble=info");
    }

    #[test]
    fn test_config_from_json() {
        let file = write_config(
            r#"{
                "session": { "retry_budget": 3, "login_timeout_secs": 4 },
                "decoder": { "lock_windows": { "sesame_4": { "min": 0, "max": 100 } } },
                "devices": [{
                    "mac_address": "AA:BB:CC:DD:EE:FF",
                    "secret_key": "00112233",
                    "pub_key": "44556677",
                    "device_type": "sesame_4"
                }]
            }"#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.session.retry_budget, 3);
        assert_eq!(config.session.retry_delay_ms, 500); // Default
        assert_eq!(config.devices.len(), 1);
        assert_eq!(
            config.lock_window_for(DeviceType::Sesame4),
            Some(LockWindow::new(0, 100))
        );
        assert_eq!(
            config.lock_window_for(DeviceType::Sesame2),
            LockWindow::default_for(DeviceType::Sesame2)
        );
    }

    #[test]
    fn test_session_config_conversion() {
        let mut config = Config::default();
        config.session.retry_budget = 4;
        config.session.retry_delay_ms = 250;

        let session = config.session_config();
        assert_eq!(session.retry.budget, 4);
        assert_eq!(session.retry.delay, Duration::from_millis(250));
        assert_eq!(session.login_timeout, Duration::from_secs(10));
        assert_eq!(session.scan_duration, Duration::from_secs(15));
    }

    #[test]
    fn test_apply_vars() {
        let mut config = Config::default();
        config.apply_vars(|name| match name {
            "SESAME_RETRY_BUDGET" => Some("2".into()),
            "SESAME_SCAN_DURATION_SECS" => Some("not-a-number".into()),
            "RUST_LOG" => Some("debug".into()),
            _ => None,
        });

        assert_eq!(config.session.retry_budget, 2);
        assert_eq!(config.session.scan_duration_secs, 15);
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_log_level_prefers_sesame_var() {
        let mut config = Config::default();
        config.apply_vars(|name| match name {
            "SESAME_LOG_LEVEL" => Some("warn".into()),
            "RUST_LOG" => Some("debug".into()),
            _ => None,
        });
        assert_eq!(config.log_filter(), "warn");
    }

    #[test]
    fn test_invalid_device_type() {
        let file = write_config(
            r#"{ "devices": [{
                "mac_address": "AA:BB",
                "secret_key": "s",
                "pub_key": "p",
                "device_type": "sesame_9"
            }] }"#,
        );

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDevice { .. }));
        assert!(err.to_string().contains("sesame_9"));
    }

    #[test]
    fn test_oversized_device_key() {
        let json = format!(
            r#"{{ "devices": [{{
                "mac_address": "AA:BB",
                "secret_key": "{}",
                "pub_key": "p",
                "device_type": "sesame_2"
            }}] }}"#,
            "f".repeat(256)
        );
        let file = write_config(&json);

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDevice { .. }));
        assert!(err.to_string().contains("256 bytes"));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/sesame.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"retry_budget\""));
        assert!(json.contains("\"lock_windows\""));
    }
}
