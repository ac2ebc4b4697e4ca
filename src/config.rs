use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::settings::EngineSettings;

/// Fixed properties of an engine instance. Changing these requires a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Stereo frames generated per loop iteration.
    pub buffer_frames: usize,
    /// Capacity of the device-side ring, in stereo frames.
    pub sink_buffer_frames: usize,
    /// Fixed RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            buffer_frames: 4_096,
            sink_buffer_frames: 8_192,
            seed: None,
            thread_name: "brownie-gen".to_string(),
        }
    }
}

impl EngineConfig {
    /// Duration of one generated buffer.
    pub fn buffer_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.buffer_frames as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Contents of a host config file:
///
/// ```toml
/// [engine]
/// buffer_frames = 2048
///
/// [settings]
/// dispersion = 0.4
/// isDeepBass = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub settings: EngineSettings,
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        log::debug!("loaded config from {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.engine.sample_rate, 44_100);
    }

    #[test]
    fn sections_override_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [engine]
            buffer_frames = 1024
            seed = 99

            [settings]
            dispersion = 0.4
            isDeepBass = true
            cutoffFrequency = 600.0
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.buffer_frames, 1_024);
        assert_eq!(config.engine.seed, Some(99));
        assert_eq!(config.engine.sink_buffer_frames, 8_192);
        assert_eq!(config.settings.dispersion, 0.4);
        assert!(config.settings.is_deep_bass);
        assert_eq!(config.settings.cutoff_frequency, 600.0);
        assert_eq!(config.settings.volume, 1.0);
    }

    #[test]
    fn invalid_toml_is_reported() {
        assert!(matches!(
            AppConfig::from_toml_str("[engine]\nbuffer_frames = \"lots\""),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            AppConfig::load("/definitely/not/here.toml"),
            Err(EngineError::Io(_))
        ));
    }

    #[test]
    fn buffer_duration() {
        let config = EngineConfig {
            buffer_frames: 4_410,
            ..EngineConfig::default()
        };
        assert_eq!(config.buffer_duration().as_millis(), 100);
    }
}
