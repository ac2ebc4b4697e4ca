//! Brown noise as a bounded random walk, plus the smoothing stage that shapes it.

use rand::Rng;

/// Advance a random walk by one uniform step in `(-dispersion, dispersion)`.
///
/// A walk sitting on a rail reflects off it instead of pushing further out, so the value
/// never sticks at +-1. The result is always within `[-1, 1]`.
pub fn step<R: Rng + ?Sized>(previous: f64, dispersion: f64, rng: &mut R) -> f64 {
    let mut white = if dispersion > 0.0 {
        rng.gen_range(-dispersion..dispersion)
    } else {
        0.0
    };
    if (previous == 1.0 && white > 0.0) || (previous == -1.0 && white < 0.0) {
        white = -white;
    }
    (previous + white).clamp(-1.0, 1.0)
}

/// How the raw walk is blended with the previous value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmoothingMode {
    /// Exponential moving average, `k` in `[0.01, 0.99]`.
    Standard { k: f64 },
    /// Heavier integrator, `k` in `[1, 99]`.
    DeepBass { k: f64 },
}

impl SmoothingMode {
    /// `smoothness` is expected to be clamped already.
    pub fn new(smoothness: f64, deep_bass: bool) -> Self {
        if deep_bass {
            SmoothingMode::DeepBass {
                k: smoothness * 100.0,
            }
        } else {
            SmoothingMode::Standard { k: smoothness }
        }
    }

    pub fn blend(self, previous: f64, raw: f64) -> f64 {
        match self {
            SmoothingMode::Standard { k } => previous * k + raw * (1.0 - k),
            SmoothingMode::DeepBass { k } => (previous * k + raw) / (k + 1.0),
        }
    }

    pub fn is_deep_bass(self) -> bool {
        matches!(self, SmoothingMode::DeepBass { .. })
    }
}

/// One random-walk source with its smoothing memory.
///
/// Standard mode feeds the raw walk value back as `previous`; deep-bass mode feeds back the
/// smoothed output. The two modes differ on purpose and both must be kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voice {
    walk: f64,
    previous: f64,
}

impl Voice {
    /// Start the walk at a uniform draw from `(-dispersion, dispersion)`.
    pub fn seeded<R: Rng + ?Sized>(dispersion: f64, rng: &mut R) -> Self {
        let walk = step(0.0, dispersion, rng);
        Self {
            walk,
            previous: walk,
        }
    }

    pub fn walk(&self) -> f64 {
        self.walk
    }

    pub fn previous(&self) -> f64 {
        self.previous
    }

    /// Step the walk and return the smoothed sample.
    pub fn next<R: Rng + ?Sized>(
        &mut self,
        dispersion: f64,
        mode: SmoothingMode,
        rng: &mut R,
    ) -> f64 {
        self.walk = step(self.walk, dispersion, rng);
        let sample = mode.blend(self.previous, self.walk);
        self.previous = if mode.is_deep_bass() {
            sample
        } else {
            self.walk
        };
        sample
    }

    /// Overwrite the smoothing memory without stepping the walk.
    pub fn follow(&mut self, sample: f64) {
        self.previous = sample;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn walk_stays_within_rails() {
        let mut rng = StdRng::seed_from_u64(7);
        for &dispersion in &[0.01, 0.3, 0.7, 0.99] {
            let mut value = 0.0;
            for _ in 0..200_000 {
                value = step(value, dispersion, &mut rng);
                assert!((-1.0..=1.0).contains(&value), "{value} escaped at {dispersion}");
            }
        }
    }

    #[test]
    fn walk_reflects_off_rails() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1_000 {
            assert!(step(1.0, 0.5, &mut rng) <= 1.0);
            let from_top = step(1.0, 0.5, &mut rng);
            assert!(from_top > 0.5 - 1e-12);
            let from_bottom = step(-1.0, 0.5, &mut rng);
            assert!(from_bottom < -0.5 + 1e-12);
        }
    }

    #[test]
    fn walk_does_not_stick_at_rail() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut value = 1.0;
        let mut left_rail = false;
        for _ in 0..10 {
            value = step(value, 0.2, &mut rng);
            if value < 1.0 {
                left_rail = true;
            }
        }
        assert!(left_rail);
    }

    #[test]
    fn zero_dispersion_holds_value() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(step(0.25, 0.0, &mut rng), 0.25);
    }

    #[test]
    fn standard_blend_is_ema() {
        let mode = SmoothingMode::new(0.75, false);
        assert!((mode.blend(1.0, 0.0) - 0.75).abs() < 1e-12);
        assert!((mode.blend(0.0, 1.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn deep_bass_blend_is_weighted_integrator() {
        let mode = SmoothingMode::new(0.5, true);
        // k = 50: (1.0 * 50 + 0.0) / 51
        assert!((mode.blend(1.0, 0.0) - 50.0 / 51.0).abs() < 1e-12);
    }

    #[test]
    fn feedback_target_depends_on_mode() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut standard = Voice::seeded(0.3, &mut rng);
        let mut deep = standard;

        let out = standard.next(0.3, SmoothingMode::new(0.7, false), &mut rng);
        assert_eq!(standard.previous(), standard.walk());
        assert_ne!(out, standard.walk());

        let out = deep.next(0.3, SmoothingMode::new(0.7, true), &mut rng);
        assert_eq!(deep.previous(), out);
    }

    #[test]
    fn seeded_voice_starts_inside_dispersion() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..1_000 {
            let voice = Voice::seeded(0.2, &mut rng);
            assert!(voice.walk().abs() < 0.2);
            assert_eq!(voice.walk(), voice.previous());
        }
    }
}
