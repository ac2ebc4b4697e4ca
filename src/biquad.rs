//! Second-order IIR low-pass (RBJ cookbook) with per-channel state and lazy coefficients.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Low-pass coefficients normalized by `a0`.
    pub fn low_pass(cutoff: f64, resonance: f64, sample_rate: u32) -> Self {
        let omega = 2.0 * PI * cutoff / sample_rate as f64;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * resonance);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Gain at 0 Hz, `(b0 + b1 + b2) / (1 + a1 + a2)`.
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// Last two inputs and outputs of one channel (direct form I).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterState {
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
}

impl FilterState {
    pub fn process(&mut self, coeffs: &BiquadCoefficients, input: f64) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

/// Coefficients cached against the `(resonance, cutoff)` pair that produced them.
#[derive(Debug, Clone)]
pub struct CoefficientCache {
    sample_rate: u32,
    key: Option<(f64, f64)>,
    coeffs: BiquadCoefficients,
    recomputes: u64,
}

impl CoefficientCache {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            key: None,
            coeffs: BiquadCoefficients {
                b0: 1.0,
                b1: 0.0,
                b2: 0.0,
                a1: 0.0,
                a2: 0.0,
            },
            recomputes: 0,
        }
    }

    /// Recompute only when `resonance` or `cutoff` differ from the cached pair.
    pub fn update(&mut self, resonance: f64, cutoff: f64) -> &BiquadCoefficients {
        if self.key != Some((resonance, cutoff)) {
            self.coeffs = BiquadCoefficients::low_pass(cutoff, resonance, self.sample_rate);
            self.key = Some((resonance, cutoff));
            self.recomputes += 1;
            log::debug!(
                "low-pass coefficients recomputed: cutoff={cutoff:.1} Hz, resonance={resonance:.3}"
            );
        }
        &self.coeffs
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coeffs
    }

    /// How many times the coefficients have been derived.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }
}

/// Stereo low-pass sharing one coefficient set.
#[derive(Debug, Clone)]
pub struct StereoLowPass {
    cache: CoefficientCache,
    left: FilterState,
    right: FilterState,
}

impl StereoLowPass {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            cache: CoefficientCache::new(sample_rate),
            left: FilterState::default(),
            right: FilterState::default(),
        }
    }

    /// Called once per buffer.
    pub fn configure(&mut self, resonance: f64, cutoff: f64) {
        self.cache.update(resonance, cutoff);
    }

    pub fn process(&mut self, left: f64, right: f64) -> (f64, f64) {
        let coeffs = self.cache.coefficients();
        (
            self.left.process(coeffs, left),
            self.right.process(coeffs, right),
        )
    }

    pub fn cache(&self) -> &CoefficientCache {
        &self.cache
    }

    pub fn states(&self) -> (&FilterState, &FilterState) {
        (&self.left, &self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_dc_gain() {
        for &(cutoff, resonance) in &[(100.0, 0.1), (1_000.0, 0.5), (8_000.0, 1.0)] {
            let coeffs = BiquadCoefficients::low_pass(cutoff, resonance, 44_100);
            assert!((coeffs.dc_gain() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn passes_constant_input() {
        let coeffs = BiquadCoefficients::low_pass(500.0, 0.7, 44_100);
        let mut state = FilterState::default();
        let mut out = 0.0;
        for _ in 0..20_000 {
            out = state.process(&coeffs, 0.5);
        }
        let gain_db = 20.0 * (out / 0.5).log10();
        assert!(gain_db.abs() < 0.01, "DC gain {gain_db} dB");
    }

    #[test]
    fn attenuates_high_frequencies() {
        let sample_rate = 44_100;
        let coeffs = BiquadCoefficients::low_pass(200.0, 0.7, sample_rate);
        let mut state = FilterState::default();
        let mut peak: f64 = 0.0;
        for n in 0..44_100 {
            let x = (2.0 * PI * 10_000.0 * n as f64 / sample_rate as f64).sin();
            let y = state.process(&coeffs, x);
            if n > 4_410 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.01, "10 kHz leaked through at {peak}");
    }

    #[test]
    fn state_shifts_after_each_sample() {
        let coeffs = BiquadCoefficients::low_pass(1_000.0, 1.0, 44_100);
        let mut state = FilterState::default();
        let y0 = state.process(&coeffs, 1.0);
        let y1 = state.process(&coeffs, 0.5);
        assert_eq!(state.x1, 0.5);
        assert_eq!(state.x2, 1.0);
        assert_eq!(state.y1, y1);
        assert_eq!(state.y2, y0);
    }

    #[test]
    fn cache_recomputes_only_on_change() {
        let mut cache = CoefficientCache::new(44_100);
        let first = *cache.update(0.5, 1_000.0);
        for _ in 0..1_000 {
            assert_eq!(*cache.update(0.5, 1_000.0), first);
        }
        assert_eq!(cache.recompute_count(), 1);

        cache.update(0.4, 1_000.0);
        assert_eq!(cache.recompute_count(), 2);
        cache.update(0.4, 1_200.0);
        assert_eq!(cache.recompute_count(), 3);
        cache.update(0.4, 1_200.0);
        assert_eq!(cache.recompute_count(), 3);
    }

    #[test]
    fn stereo_filter_keeps_channels_separate() {
        let mut filter = StereoLowPass::new(44_100);
        filter.configure(0.7, 1_000.0);
        for _ in 0..100 {
            filter.process(1.0, -1.0);
        }
        let (left, right) = filter.states();
        assert!(left.y1 > 0.0);
        assert!(right.y1 < 0.0);
        assert!((left.y1 + right.y1).abs() < 1e-12);
    }
}
