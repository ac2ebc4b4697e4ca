//! Per-sample processing from raw random walks to a limited stereo frame.
//!
//! Stage order is fixed: smoothing, stereo mixing, amplitude modulation, stereo drift,
//! low-pass, gain, limiter.

use rand::Rng;

use crate::biquad::StereoLowPass;
use crate::modulation::Lfo;
use crate::noise::{SmoothingMode, Voice};
use crate::settings::EngineSettings;

/// Output samples are held strictly inside full scale.
pub const LIMIT: f64 = 0.9999;

/// Static pan offset per unit of stereo width in mono mode.
const PAN_SPREAD: f64 = 0.2;

/// Settings resolved once per buffer, every ratio already clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferParams {
    pub dispersion: f64,
    pub smoothing: SmoothingMode,
    pub stereo_width: f64,
    pub pan_delta: f64,
    pub two_channels: bool,
    pub amplitude_modulation: bool,
    pub stereo_drift: bool,
    /// `Some((resonance, cutoff))` when the low-pass is active.
    pub low_pass: Option<(f64, f64)>,
}

impl BufferParams {
    pub fn resolve(settings: &EngineSettings, sample_rate: u32) -> Self {
        let stereo_width = settings.stereo_width();
        Self {
            dispersion: settings.dispersion(),
            smoothing: SmoothingMode::new(settings.smoothness(), settings.is_deep_bass),
            stereo_width,
            pan_delta: stereo_width * PAN_SPREAD,
            two_channels: settings.is_two_channels,
            amplitude_modulation: settings.is_amplitude_modulation,
            stereo_drift: settings.is_stereo_drift,
            low_pass: settings
                .filter_enabled()
                .then(|| (settings.resonance(), settings.cutoff_frequency(sample_rate))),
        }
    }
}

/// All state the chain carries from one sample to the next.
#[derive(Debug, Clone)]
pub struct PostChain {
    mono: Voice,
    left: Voice,
    right: Voice,
    am: Lfo,
    drift: Lfo,
    filter: StereoLowPass,
}

impl PostChain {
    pub fn new<R: Rng + ?Sized>(dispersion: f64, sample_rate: u32, rng: &mut R) -> Self {
        Self {
            mono: Voice::seeded(dispersion, rng),
            left: Voice::seeded(dispersion, rng),
            right: Voice::seeded(dispersion, rng),
            am: Lfo::amplitude(sample_rate),
            drift: Lfo::drift(sample_rate),
            filter: StereoLowPass::new(sample_rate),
        }
    }

    /// Refresh buffer-rate state; coefficients are only rebuilt when they changed.
    pub fn prepare(&mut self, params: &BufferParams) {
        if let Some((resonance, cutoff)) = params.low_pass {
            self.filter.configure(resonance, cutoff);
        }
    }

    /// Produce one stereo frame before gain and limiting.
    pub fn next_frame<R: Rng + ?Sized>(&mut self, params: &BufferParams, rng: &mut R) -> (f64, f64) {
        let sample = self.mono.next(params.dispersion, params.smoothing, rng);

        let (mut left, mut right) = if params.two_channels {
            let left = self.left.next(params.dispersion, params.smoothing, rng);
            let right = self.right.next(params.dispersion, params.smoothing, rng);
            let width = params.stereo_width;
            let mid = (left + right) / 2.0;
            (
                width * left + (1.0 - width) * mid,
                width * right + (1.0 - width) * mid,
            )
        } else {
            // Channel voices track the mono level so two-channel mode resumes from it.
            if params.smoothing.is_deep_bass() {
                self.left.follow(sample);
                self.right.follow(sample);
            }
            (sample + params.pan_delta, sample - params.pan_delta)
        };

        if params.amplitude_modulation {
            let gain = self.am.amplitude_gain();
            left *= gain;
            right *= gain;
        }

        if params.stereo_drift {
            let (gain_l, gain_r) = self.drift.drift_gains();
            left *= gain_l;
            right *= gain_r;
        }

        if params.low_pass.is_some() {
            (left, right) = self.filter.process(left, right);
        }

        (left, right)
    }

    pub fn filter(&self) -> &StereoLowPass {
        &self.filter
    }

    pub fn am_phase(&self) -> f64 {
        self.am.phase()
    }

    pub fn drift_phase(&self) -> f64 {
        self.drift.phase()
    }
}

/// Apply the output gain and clamp to `+-LIMIT`.
pub fn gain_and_limit(left: f64, right: f64, gain: f64) -> (f64, f64) {
    (
        (left * gain).clamp(-LIMIT, LIMIT),
        (right * gain).clamp(-LIMIT, LIMIT),
    )
}

/// Convert a limited sample to signed 16-bit PCM.
pub fn quantize(sample: f64) -> i16 {
    (sample.clamp(-LIMIT, LIMIT) * i16::MAX as f64).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(settings: &EngineSettings) -> BufferParams {
        BufferParams::resolve(settings, 44_100)
    }

    #[test]
    fn resolve_clamps_and_bypasses_filter() {
        let settings = EngineSettings {
            stereo_width: 3.0,
            lpf_amount: 0.0,
            ..EngineSettings::default()
        };
        let p = params(&settings);
        assert_eq!(p.stereo_width, 1.0);
        assert!((p.pan_delta - 0.2).abs() < 1e-12);
        assert_eq!(p.low_pass, None);

        let p = params(&EngineSettings {
            lpf_amount: 0.5,
            cutoff_frequency: 800.0,
            ..EngineSettings::default()
        });
        assert_eq!(p.low_pass, Some((0.5, 800.0)));
    }

    #[test]
    fn mono_mode_pans_by_static_offset() {
        let mut rng = StdRng::seed_from_u64(1);
        let settings = EngineSettings {
            is_two_channels: false,
            stereo_width: 0.5,
            ..EngineSettings::default()
        };
        let p = params(&settings);
        let mut chain = PostChain::new(p.dispersion, 44_100, &mut rng);
        for _ in 0..1_000 {
            let (left, right) = chain.next_frame(&p, &mut rng);
            assert!((left - right - 0.2).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_width_collapses_two_channels() {
        let mut rng = StdRng::seed_from_u64(2);
        let settings = EngineSettings {
            is_two_channels: true,
            stereo_width: 0.0,
            ..EngineSettings::default()
        };
        let p = params(&settings);
        let mut chain = PostChain::new(p.dispersion, 44_100, &mut rng);
        for _ in 0..1_000 {
            let (left, right) = chain.next_frame(&p, &mut rng);
            assert!((left - right).abs() < 1e-12);
        }
    }

    #[test]
    fn full_width_keeps_channels_independent() {
        let mut rng = StdRng::seed_from_u64(3);
        let settings = EngineSettings {
            is_two_channels: true,
            stereo_width: 1.0,
            ..EngineSettings::default()
        };
        let p = params(&settings);
        let mut chain = PostChain::new(p.dispersion, 44_100, &mut rng);
        let differing = (0..1_000)
            .map(|_| chain.next_frame(&p, &mut rng))
            .filter(|(l, r)| (l - r).abs() > 1e-6)
            .count();
        assert!(differing > 900);
    }

    #[test]
    fn modulation_phases_advance_only_when_enabled() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut settings = EngineSettings::default();
        let mut chain = PostChain::new(settings.dispersion(), 44_100, &mut rng);

        let p = params(&settings);
        for _ in 0..100 {
            chain.next_frame(&p, &mut rng);
        }
        assert_eq!(chain.am_phase(), 0.0);
        assert_eq!(chain.drift_phase(), 0.0);

        settings.is_amplitude_modulation = true;
        settings.is_stereo_drift = true;
        let p = params(&settings);
        for _ in 0..100 {
            chain.next_frame(&p, &mut rng);
        }
        assert!(chain.am_phase() > 0.0);
        assert!(chain.drift_phase() > 0.0);
    }

    #[test]
    fn bypass_leaves_filter_state_untouched() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut settings = EngineSettings {
            lpf_amount: 0.5,
            ..EngineSettings::default()
        };
        let mut chain = PostChain::new(settings.dispersion(), 44_100, &mut rng);

        let p = params(&settings);
        chain.prepare(&p);
        for _ in 0..100 {
            chain.next_frame(&p, &mut rng);
        }
        let before = *chain.filter().states().0;

        settings.lpf_amount = 0.0;
        let p = params(&settings);
        chain.prepare(&p);
        for _ in 0..100 {
            chain.next_frame(&p, &mut rng);
        }
        assert_eq!(*chain.filter().states().0, before);
    }

    #[test]
    fn limiter_and_quantizer_bound_output() {
        let (l, r) = gain_and_limit(0.8, -0.8, 1_000.0);
        assert_eq!((l, r), (LIMIT, -LIMIT));
        let max = quantize(LIMIT);
        assert_eq!(max, 32_764);
        assert_eq!(quantize(10.0), max);
        assert_eq!(quantize(-10.0), -max);
        assert_eq!(quantize(0.0), 0);
    }
}
