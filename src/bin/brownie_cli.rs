use anyhow::Context;
use brownie_engine::logging::init_logging;
use brownie_engine::{AppConfig, EngineSettings, LevelReport, NoiseEngine};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Play brown noise on the default output device.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML file with [engine] and [settings] tables
    #[arg(long)]
    config: Option<PathBuf>,

    /// Settings as a JSON object; keys it names override the config file, the rest are kept
    #[arg(long)]
    settings_json: Option<String>,

    #[arg(long)]
    dispersion: Option<f64>,

    #[arg(long)]
    smoothness: Option<f64>,

    #[arg(long)]
    stereo_width: Option<f64>,

    /// 0 disables the low-pass filter
    #[arg(long)]
    lpf_amount: Option<f64>,

    /// Low-pass cutoff in Hz
    #[arg(long)]
    cutoff: Option<f64>,

    #[arg(long)]
    volume: Option<f64>,

    /// Use one shared source with static panning instead of independent channels
    #[arg(long)]
    mono: bool,

    #[arg(long)]
    auto_normalize: bool,

    #[arg(long)]
    norm_level: Option<f64>,

    #[arg(long)]
    amplitude_modulation: bool,

    #[arg(long)]
    stereo_drift: bool,

    #[arg(long)]
    deep_bass: bool,

    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long, value_parser = parse_seconds)]
    seconds: Option<Duration>,

    /// Print a level line every N buffers
    #[arg(long, default_value_t = 10)]
    report_every: u64,
}

impl Args {
    fn apply(&self, mut settings: EngineSettings) -> EngineSettings {
        if let Some(v) = self.dispersion {
            settings.dispersion = v;
        }
        if let Some(v) = self.smoothness {
            settings.smoothness = v;
        }
        if let Some(v) = self.stereo_width {
            settings.stereo_width = v;
        }
        if let Some(v) = self.lpf_amount {
            settings.lpf_amount = v;
        }
        if let Some(v) = self.cutoff {
            settings.cutoff_frequency = v;
        }
        if let Some(v) = self.volume {
            settings.volume = v;
        }
        if let Some(v) = self.norm_level {
            settings.norm_level = v;
        }
        settings.is_two_channels &= !self.mono;
        settings.auto_normalize |= self.auto_normalize;
        settings.is_amplitude_modulation |= self.amplitude_modulation;
        settings.is_stereo_drift |= self.stereo_drift;
        settings.is_deep_bass |= self.deep_bass;
        settings
    }
}

fn parse_seconds(arg: &str) -> Result<Duration, String> {
    let secs: f64 = arg.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("expected a finite, non-negative number of seconds, got {arg}"))
}

fn print_levels(report: &LevelReport) {
    let gain = report
        .auto_gain
        .map(|g| format!("{g:.3}"))
        .unwrap_or_else(|| "off".to_string());
    println!(
        "{:>7.1} dB  avg={:.4}  rms={:.4}  auto_gain={}",
        report.db_level, report.avg_abs_level, report.avg_rms_level, gain
    );
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let app = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::default(),
    };

    let settings = match &args.settings_json {
        Some(json) => app
            .settings
            .merged_with_json(json)
            .context("invalid --settings-json")?,
        None => app.settings,
    };
    let settings = args.apply(settings);

    let report_every = args.report_every.max(1);
    let buffers = Arc::new(AtomicU64::new(0));
    let counter = buffers.clone();
    let engine = NoiseEngine::with_cpal_output(app.engine).with_telemetry(move |report| {
        if counter.fetch_add(1, Ordering::Relaxed) % report_every == 0 {
            print_levels(&report);
        }
    });
    engine.update_settings(settings);

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    engine.start().context("failed to start noise engine")?;
    log::info!("playing; press Ctrl-C to stop");

    let deadline = args.seconds.map(|run_for| Instant::now() + run_for);
    while !interrupted.load(Ordering::SeqCst) && engine.is_running() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    engine.stop();
    println!("{} buffers generated", buffers.load(Ordering::Relaxed));

    if let Some(err) = engine.take_stream_error() {
        return Err(err).context("output stream failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_must_be_finite_and_non_negative() {
        assert_eq!(parse_seconds("1.5"), Ok(Duration::from_millis(1_500)));
        assert_eq!(parse_seconds("0"), Ok(Duration::ZERO));
        assert!(parse_seconds("inf").is_err());
        assert!(parse_seconds("NaN").is_err());
        assert!(parse_seconds("-2").is_err());
        assert!(parse_seconds("soon").is_err());
    }

    #[test]
    fn seconds_flag_is_validated_by_clap() {
        assert!(Args::try_parse_from(["brownie_cli", "--seconds", "inf"]).is_err());
        let args = Args::try_parse_from(["brownie_cli", "--seconds", "2"]).unwrap();
        assert_eq!(args.seconds, Some(Duration::from_secs(2)));
    }

    #[test]
    fn flags_override_merged_settings() {
        let args = Args::try_parse_from(["brownie_cli", "--volume", "0.2", "--mono"]).unwrap();
        let base = EngineSettings {
            cutoff_frequency: 400.0,
            ..EngineSettings::default()
        }
        .merged_with_json(r#"{"volume":0.8}"#)
        .unwrap();

        let settings = args.apply(base);
        assert_eq!(settings.volume, 0.2);
        assert_eq!(settings.cutoff_frequency, 400.0);
        assert!(!settings.is_two_channels);
    }
}
