//! Buffer level metering, the auto-gain feedback loop and generation-loop diagnostics.

use std::time::{Duration, Instant};

/// Amplitude floor for the dB reading, -72 dBFS.
pub const MIN_AMP: f64 = 0.000_251_188_643_150_958;

/// Smallest average level the auto-gain divides by.
pub const LEVEL_EPSILON: f64 = 1e-6;

/// Levels of one generated buffer, measured after gain and limiting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReport {
    pub avg_abs_level: f64,
    pub avg_rms_level: f64,
    pub db_level: f64,
    /// `None` while auto-normalize is off.
    pub auto_gain: Option<f64>,
}

pub fn amplitude_to_db(amplitude: f64) -> f64 {
    20.0 * amplitude.max(MIN_AMP).log10()
}

/// Running sums over one buffer of stereo frames.
#[derive(Debug, Default, Clone)]
pub struct LevelMeter {
    sum: f64,
    sum_sq: f64,
    count: usize,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn add_frame(&mut self, left: f64, right: f64) {
        self.count += 1;
        self.sum += (left.abs() + right.abs()) / 2.0;
        self.sum_sq += left * left + right * right;
    }

    pub fn frames(&self) -> usize {
        self.count
    }

    /// `(avg_abs, rms)`; both zero for an empty buffer.
    pub fn levels(&self) -> (f64, f64) {
        if self.count == 0 {
            return (0.0, 0.0);
        }
        let n = self.count as f64;
        (self.sum / n, (self.sum_sq / (2.0 * n)).sqrt())
    }

    pub fn report(&self, auto_gain: Option<f64>) -> LevelReport {
        let (avg_abs_level, avg_rms_level) = self.levels();
        LevelReport {
            avg_abs_level,
            avg_rms_level,
            db_level: amplitude_to_db(avg_rms_level),
            auto_gain,
        }
    }
}

/// Proportional gain corrector driven by the previous buffer's average level.
///
/// The first buffer after activation plays at unity; every later buffer scales the gain by
/// `target / previous_level`. Levels persist across settings changes and are only reset by
/// building a new controller.
#[derive(Debug, Clone)]
pub struct AutoGain {
    gain: Option<f64>,
    last_level: f64,
}

impl AutoGain {
    /// `initial_level` stands in for the level of the buffer before the first one.
    pub fn new(initial_level: f64) -> Self {
        Self {
            gain: None,
            last_level: initial_level,
        }
    }

    /// Gain for the next buffer, or `None` when disabled (which also clears it).
    pub fn next_gain(&mut self, enabled: bool, target: f64) -> Option<f64> {
        self.gain = if !enabled {
            None
        } else {
            match self.gain {
                None => Some(1.0),
                Some(gain) => Some(gain * target / self.last_level.max(LEVEL_EPSILON)),
            }
        };
        self.gain
    }

    /// Record the measured average of the buffer just produced.
    pub fn observe(&mut self, avg_level: f64) {
        self.last_level = avg_level;
    }

    pub fn gain(&self) -> Option<f64> {
        self.gain
    }
}

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Per-interval health counters for the generation loop.
#[derive(Debug, Clone)]
pub struct LoopStats {
    buffers: u64,
    fill_time_total: Duration,
    fill_time_max: Duration,
    write_time_max: Duration,
    last_log: Instant,
}

impl LoopStats {
    pub fn new() -> Self {
        Self {
            buffers: 0,
            fill_time_total: Duration::ZERO,
            fill_time_max: Duration::ZERO,
            write_time_max: Duration::ZERO,
            last_log: Instant::now(),
        }
    }

    pub fn record(&mut self, fill_time: Duration, write_time: Duration) {
        self.buffers += 1;
        self.fill_time_total += fill_time;
        self.fill_time_max = self.fill_time_max.max(fill_time);
        self.write_time_max = self.write_time_max.max(write_time);
    }

    pub fn buffers(&self) -> u64 {
        self.buffers
    }

    /// Log and reset the counters once per interval.
    pub fn maybe_log(&mut self, last: &LevelReport) {
        if self.last_log.elapsed() < STATS_LOG_INTERVAL || self.buffers == 0 {
            return;
        }
        let avg_fill_us = self.fill_time_total.as_secs_f64() * 1e6 / self.buffers as f64;
        log::debug!(
            "generation: buffers={}, avg_fill={:.1}us, max_fill={:.1}us, max_write={:.1}ms, level={:.1} dB, gain={:?}",
            self.buffers,
            avg_fill_us,
            self.fill_time_max.as_secs_f64() * 1e6,
            self.write_time_max.as_secs_f64() * 1e3,
            last.db_level,
            last.auto_gain,
        );
        *self = Self::new();
    }
}

impl Default for LoopStats {
    fn default() -> Self {
        Self::new()
    }
}
