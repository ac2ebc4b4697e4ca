//! Tunable parameters of the noise engine.
//!
//! `EngineSettings` is a plain `Copy` value. Hosts build a complete snapshot and hand it to
//! the engine, which publishes it through a [`SettingsStore`]. The generation loop reads the
//! latest snapshot once per buffer and never sees a half-written value.

use crossbeam::atomic::AtomicCell;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const DEFAULT_CUTOFF_HZ: f64 = 1000.0;
pub const DEFAULT_NORM_LEVEL: f64 = 0.25;

/// Lowest cutoff frequency the low-pass filter accepts.
pub const MIN_CUTOFF_HZ: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    /// Random-walk step amplitude, (0, 1).
    pub dispersion: f64,
    /// Blend between the previous and the new raw sample, (0, 1).
    pub smoothness: f64,
    /// 0 merges the channels, 1 keeps them independent.
    pub stereo_width: f64,
    /// Inverse of the filter resonance; below 0.01 the filter is bypassed.
    pub lpf_amount: f64,
    /// Low-pass corner frequency in Hz.
    pub cutoff_frequency: f64,
    /// Linear output gain used while auto-normalize is off.
    pub volume: f64,
    pub is_two_channels: bool,
    pub auto_normalize: bool,
    /// Target average absolute level for auto-normalize.
    pub norm_level: f64,
    pub is_amplitude_modulation: bool,
    pub is_stereo_drift: bool,
    pub is_deep_bass: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dispersion: 0.3,
            smoothness: 0.7,
            stereo_width: 0.9,
            lpf_amount: 0.0,
            cutoff_frequency: DEFAULT_CUTOFF_HZ,
            volume: 1.0,
            is_two_channels: true,
            auto_normalize: false,
            norm_level: DEFAULT_NORM_LEVEL,
            is_amplitude_modulation: false,
            is_stereo_drift: false,
            is_deep_bass: false,
        }
    }
}

/// Clamp `value` into `[lo, hi]`, replacing NaN/inf with `fallback` first.
fn bounded(value: f64, fallback: f64, lo: f64, hi: f64) -> f64 {
    let value = if value.is_finite() { value } else { fallback };
    value.clamp(lo, hi)
}

impl EngineSettings {
    /// Parse a host snapshot. Missing keys take their default value.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply a partial host snapshot over `self`. Keys absent from `json` keep their
    /// current value instead of the default.
    pub fn merged_with_json(&self, json: &str) -> Result<Self, EngineError> {
        let mut merged = serde_json::to_value(self)?;
        match (merged.as_object_mut(), serde_json::from_str(json)?) {
            (Some(current), serde_json::Value::Object(patch)) => current.extend(patch),
            (_, other) => return Ok(serde_json::from_value(other)?),
        }
        Ok(serde_json::from_value(merged)?)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn dispersion(&self) -> f64 {
        bounded(self.dispersion, 0.3, 0.01, 0.99)
    }

    pub fn smoothness(&self) -> f64 {
        bounded(self.smoothness, 0.7, 0.01, 0.99)
    }

    pub fn stereo_width(&self) -> f64 {
        bounded(self.stereo_width, 0.9, 0.0, 1.0)
    }

    pub fn lpf_amount(&self) -> f64 {
        bounded(self.lpf_amount, 0.0, 0.0, 1.0)
    }

    /// Filter resonance, `1 - lpf_amount` kept within `[0.1, 1.0]`.
    pub fn resonance(&self) -> f64 {
        (1.0 - self.lpf_amount()).clamp(0.1, 1.0)
    }

    pub fn filter_enabled(&self) -> bool {
        self.lpf_amount() >= 0.01
    }

    /// Cutoff in Hz, kept below Nyquist for `sample_rate`.
    pub fn cutoff_frequency(&self, sample_rate: u32) -> f64 {
        let nyquist_guard = 0.49 * sample_rate as f64;
        bounded(
            self.cutoff_frequency,
            DEFAULT_CUTOFF_HZ,
            MIN_CUTOFF_HZ,
            nyquist_guard.max(MIN_CUTOFF_HZ),
        )
    }

    pub fn volume(&self) -> f64 {
        bounded(self.volume, 1.0, 0.0, 1.0)
    }

    pub fn norm_level(&self) -> f64 {
        bounded(self.norm_level, DEFAULT_NORM_LEVEL, 1e-3, 0.9999)
    }
}

/// Single-slot holder for the latest settings snapshot.
///
/// Writers replace the whole value; readers copy it out and always see one published
/// snapshot, never a mix of two. `EngineSettings` is too large for a native atomic, so
/// `AtomicCell` falls back to crossbeam's global sequence locks: a reader racing a writer
/// retries, and the critical sections are a single copy of the struct.
pub struct SettingsStore {
    current: AtomicCell<EngineSettings>,
}

impl SettingsStore {
    pub fn new(initial: EngineSettings) -> Self {
        Self {
            current: AtomicCell::new(initial),
        }
    }

    pub fn publish(&self, settings: EngineSettings) {
        self.current.store(settings);
    }

    pub fn snapshot(&self) -> EngineSettings {
        self.current.load()
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}
