//! Configuration loading
//!
//! The pipeline only reads configuration. Settings are stored in TOML:
//!
//! ```toml
//! [loopback]
//! packet_loss = 0.05
//! max_packet_delay_ms = 40
//!
//! [codec]
//! disable_legacy = false
//!
//! [devices]
//! input = "cpal"
//! output = "cpal"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub loopback: LoopbackConfig,
    pub codec: CodecConfig,
    pub devices: DeviceConfig,
}

/// Simulated network conditions for the local loopback user
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Probability in [0, 1] that a packet is dropped
    pub packet_loss: f64,
    /// Upper bound of the uniformly drawn jitter delay
    pub max_packet_delay_ms: f64,
}

impl LoopbackConfig {
    /// No loss, no jitter
    pub fn lossless() -> Self {
        Self {
            packet_loss: 0.0,
            max_packet_delay_ms: 0.0,
        }
    }

    pub fn max_packet_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_packet_delay_ms / 1000.0).unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.packet_loss) {
            return Err(ConfigError::Invalid(format!(
                "loopback.packet_loss must be within [0, 1], got {}",
                self.packet_loss
            )));
        }
        if !self.max_packet_delay_ms.is_finite() || self.max_packet_delay_ms < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "loopback.max_packet_delay_ms must be a non-negative number, got {}",
                self.max_packet_delay_ms
            )));
        }
        Ok(())
    }
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            packet_loss: 0.0,
            max_packet_delay_ms: 20.0,
        }
    }
}

/// Codec probing switches
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CodecConfig {
    /// Kill switch for the legacy (CELT) codec family
    pub disable_legacy: bool,
}

/// Device backend choices
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Capture backend name
    pub input: String,
    /// Playback backend name
    pub output: String,
    /// Backend specific input device id, default device when unset
    pub input_device: Option<String>,
    /// Backend specific output device id, default device when unset
    pub output_device: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            input: crate::constants::DEFAULT_BACKEND.to_string(),
            output: crate::constants::DEFAULT_BACKEND.to_string(),
            input_device: None,
            output_device: None,
        }
    }
}

impl AppConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Platform config location, e.g. `~/.config/voice-pipeline/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "voice-pipeline", "voice-pipeline")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from [`AppConfig::default_path`], falling back to defaults when
    /// the file does not exist
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "Loading configuration");
                Self::load(path)
            }
            _ => {
                tracing::debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.loopback.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(!config.codec.disable_legacy);
        assert_eq!(config.devices.output, crate::constants::DEFAULT_BACKEND);
    }

    #[test]
    fn test_parse_sections() {
        let config = AppConfig::from_toml_str(
            r#"
            [loopback]
            packet_loss = 0.25
            max_packet_delay_ms = 40

            [codec]
            disable_legacy = true

            [devices]
            input = "null"
            output = "cpal"
            output_device = "output:Speakers"
            "#,
        )
        .unwrap();

        assert_eq!(config.loopback.packet_loss, 0.25);
        assert_eq!(config.loopback.max_packet_delay(), Duration::from_millis(40));
        assert!(config.codec.disable_legacy);
        assert_eq!(config.devices.input, "null");
        assert_eq!(config.devices.output_device.as_deref(), Some("output:Speakers"));
    }

    #[test]
    fn test_rejects_out_of_range_loss() {
        let err = AppConfig::from_toml_str("[loopback]\npacket_loss = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = AppConfig::from_toml_str("[loopback]\nmax_packet_delay_ms = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = AppConfig::from_toml_str("[loopback\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
