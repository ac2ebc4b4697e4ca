use thiserror::Error;

/// Everything the engine can report to its host.
///
/// Settings values are never a source of errors: out-of-range values are clamped
/// where they are used. The JSON/TOML variants only come from the ingress helpers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("output device has no stereo i16/f32 configuration at {sample_rate} Hz")]
    UnsupportedConfig { sample_rate: u32 },

    #[error("failed to query output configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("output stream failed: {0}")]
    Stream(String),

    #[error("output device stopped consuming samples for {0:?}")]
    Stalled(std::time::Duration),

    #[error("output sink is closed")]
    SinkClosed,

    #[error("failed to spawn generation thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("generation thread exited before the output sink was opened")]
    WorkerLost,

    #[error("generation thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("invalid settings JSON: {0}")]
    SettingsJson(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
