//! Slow sine LFOs for amplitude modulation and stereo drift.

use std::f64::consts::TAU;

pub const AM_SPEED_HZ: f64 = 0.0333;
pub const AM_DEPTH: f64 = 0.2;
pub const DRIFT_SPEED_HZ: f64 = 0.0333;
pub const DRIFT_DEPTH: f64 = 0.1;

/// Sine oscillator with a phase accumulator wrapped to `[0, 2pi)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lfo {
    phase: f64,
    increment: f64,
    depth: f64,
}

impl Lfo {
    pub fn new(speed_hz: f64, depth: f64, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            increment: TAU * speed_hz / sample_rate as f64,
            depth,
        }
    }

    pub fn amplitude(sample_rate: u32) -> Self {
        Self::new(AM_SPEED_HZ, AM_DEPTH, sample_rate)
    }

    pub fn drift(sample_rate: u32) -> Self {
        Self::new(DRIFT_SPEED_HZ, DRIFT_DEPTH, sample_rate)
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Current `depth * sin(phase)`, then advance one sample.
    pub fn tick(&mut self) -> f64 {
        let value = self.depth * self.phase.sin();
        self.phase = (self.phase + self.increment) % TAU;
        value
    }

    /// Gain applied to both channels: `1 + depth * sin(phase)`.
    pub fn amplitude_gain(&mut self) -> f64 {
        1.0 + self.tick()
    }

    /// Opposing left/right gains around unity.
    pub fn drift_gains(&mut self) -> (f64, f64) {
        let drift = self.tick();
        (1.0 - self.depth * drift, 1.0 + self.depth * drift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_wraps_and_stays_bounded() {
        let mut lfo = Lfo::new(1_000.0, 1.0, 44_100);
        for _ in 0..1_000_000 {
            lfo.tick();
            assert!((0.0..TAU).contains(&lfo.phase()));
        }
    }

    #[test]
    fn amplitude_gain_stays_within_depth() {
        let mut lfo = Lfo::new(50.0, AM_DEPTH, 44_100);
        for _ in 0..44_100 {
            let gain = lfo.amplitude_gain();
            assert!(gain >= 1.0 - AM_DEPTH - 1e-12 && gain <= 1.0 + AM_DEPTH + 1e-12);
        }
    }

    #[test]
    fn drift_gains_are_symmetric() {
        let mut lfo = Lfo::new(10.0, DRIFT_DEPTH, 44_100);
        for _ in 0..10_000 {
            let (left, right) = lfo.drift_gains();
            assert!((left + right - 2.0).abs() < 1e-12);
            assert!((left - 1.0).abs() <= DRIFT_DEPTH * DRIFT_DEPTH + 1e-12);
        }
    }

    #[test]
    fn first_tick_starts_at_zero_phase() {
        let mut lfo = Lfo::amplitude(44_100);
        assert_eq!(lfo.amplitude_gain(), 1.0);
        assert!(lfo.phase() > 0.0);
    }

    #[test]
    fn period_matches_speed() {
        let sample_rate = 1_000;
        let mut lfo = Lfo::new(1.0, 1.0, sample_rate);
        let mut peak_at = 0;
        let mut peak = f64::MIN;
        for i in 0..sample_rate {
            let v = lfo.tick();
            if v > peak {
                peak = v;
                peak_at = i;
            }
        }
        assert_eq!(peak_at, 250);
    }
}
