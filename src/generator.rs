//! Buffer-level synthesis: fills interleaved i16 stereo buffers and meters them.
//!
//! Nothing here touches threads or devices, so the whole signal path can be driven
//! directly from tests.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::chain::{gain_and_limit, quantize, BufferParams, PostChain};
use crate::metering::{AutoGain, LevelMeter, LevelReport};
use crate::settings::EngineSettings;

pub const CHANNELS: usize = 2;

pub struct BrownNoiseGenerator {
    sample_rate: u32,
    rng: StdRng,
    chain: PostChain,
    auto_gain: AutoGain,
    meter: LevelMeter,
}

impl BrownNoiseGenerator {
    /// Fresh walks, phases, filter state and levels, seeded from `initial`.
    pub fn new(initial: &EngineSettings, sample_rate: u32, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let chain = PostChain::new(initial.dispersion(), sample_rate, &mut rng);
        Self {
            sample_rate,
            rng,
            chain,
            auto_gain: AutoGain::new(initial.norm_level()),
            meter: LevelMeter::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn chain(&self) -> &PostChain {
        &self.chain
    }

    /// Fill `out` (interleaved L/R) using one settings snapshot for the whole buffer.
    pub fn fill(&mut self, settings: &EngineSettings, out: &mut [i16]) -> LevelReport {
        let params = BufferParams::resolve(settings, self.sample_rate);
        self.chain.prepare(&params);

        let auto_gain = self
            .auto_gain
            .next_gain(settings.auto_normalize, settings.norm_level());
        let gain = auto_gain.unwrap_or_else(|| settings.volume());

        self.meter.reset();
        for frame in out.chunks_exact_mut(CHANNELS) {
            let (left, right) = self.chain.next_frame(&params, &mut self.rng);
            let (left, right) = gain_and_limit(left, right, gain);
            self.meter.add_frame(left, right);
            frame[0] = quantize(left);
            frame[1] = quantize(right);
        }

        let report = self.meter.report(auto_gain);
        self.auto_gain.observe(report.avg_abs_level);
        report
    }
}
