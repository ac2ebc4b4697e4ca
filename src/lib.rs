//! Real-time brown noise engine.
//!
//! A bounded random walk per channel is smoothed, panned, modulated, low-pass filtered,
//! gain-normalized and limited, then streamed as interleaved 16-bit stereo PCM to an
//! [`AudioSink`]. The host drives it through [`NoiseEngine::start`],
//! [`NoiseEngine::stop`] and [`NoiseEngine::update_settings`], and receives a
//! [`LevelReport`] for every buffer.

pub mod audio_io;
pub mod biquad;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod logging;
pub mod metering;
pub mod modulation;
pub mod noise;
pub mod settings;

pub use audio_io::{AudioSink, CpalSink};
pub use config::{AppConfig, EngineConfig};
pub use engine::{EngineState, NoiseEngine, SinkFactory, TelemetryCallback};
pub use error::EngineError;
pub use generator::BrownNoiseGenerator;
pub use metering::LevelReport;
pub use settings::{EngineSettings, SettingsStore};
