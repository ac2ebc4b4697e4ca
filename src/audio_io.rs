use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::generator::CHANNELS;

/// Destination for interleaved stereo i16 buffers.
///
/// `write` blocks until the whole buffer has been accepted; that wait is the only
/// backpressure the generation loop sees.
pub trait AudioSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), EngineError>;

    /// Release the device. Errors here are reported but callers may ignore them.
    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// How long a blocked write waits for the device callback before re-checking.
const WRITE_POLL: Duration = Duration::from_millis(20);

/// A write that makes no progress for this long fails the stream.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Signalled by the device callback each time it drains samples.
type SpaceSignal = Arc<(Mutex<()>, Condvar)>;

/// Plays through the default cpal output device.
///
/// Samples go through a lock-free ring; the device callback drains it and wakes a
/// blocked writer. cpal streams are not `Send`, so open and drop this on the thread
/// that writes to it.
pub struct CpalSink {
    stream: cpal::Stream,
    producer: HeapProd<i16>,
    space: SpaceSignal,
    fault: Arc<Mutex<Option<String>>>,
    closed: bool,
}

impl CpalSink {
    pub fn open(config: &EngineConfig) -> Result<Self, EngineError> {
        let host = cpal::default_host();
        log::debug!("opening output on host {:?}", host.id());
        let device = host
            .default_output_device()
            .ok_or(EngineError::NoOutputDevice)?;

        let desired_rate = config.sample_rate;
        let supported = device
            .supported_output_configs()?
            .filter(|r| {
                r.channels() as usize == CHANNELS
                    && matches!(r.sample_format(), SampleFormat::I16 | SampleFormat::F32)
                    && r.min_sample_rate().0 <= desired_rate
                    && desired_rate <= r.max_sample_rate().0
            })
            .min_by_key(|r| match r.sample_format() {
                SampleFormat::I16 => 0,
                _ => 1,
            })
            .ok_or(EngineError::UnsupportedConfig {
                sample_rate: desired_rate,
            })?
            .with_sample_rate(cpal::SampleRate(desired_rate));

        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.config();

        let ring = HeapRb::<i16>::new(config.sink_buffer_frames.max(1) * CHANNELS);
        let (producer, consumer) = ring.split();
        let space: SpaceSignal = Arc::new((Mutex::new(()), Condvar::new()));
        let fault = Arc::new(Mutex::new(None));

        let stream = match sample_format {
            SampleFormat::I16 => {
                build_i16_stream(&device, &stream_config, consumer, space.clone(), fault.clone())?
            }
            _ => build_f32_stream(&device, &stream_config, consumer, space.clone(), fault.clone())?,
        };
        stream.play()?;

        log::info!(
            "output stream started: {} Hz, {:?}, ring {} frames",
            stream_config.sample_rate.0,
            sample_format,
            config.sink_buffer_frames
        );

        Ok(Self {
            stream,
            producer,
            space,
            fault,
            closed: false,
        })
    }
}

fn error_callback(fault: Arc<Mutex<Option<String>>>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        log::error!("output stream error: {err}");
        *fault.lock() = Some(err.to_string());
    }
}

fn build_i16_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: HeapCons<i16>,
    space: SpaceSignal,
    fault: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, EngineError> {
    let stream = device.build_output_stream(
        config,
        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
            let popped = consumer.pop_slice(data);
            data[popped..].fill(0);
            space.1.notify_one();
        },
        error_callback(fault),
        None,
    )?;
    Ok(stream)
}

fn build_f32_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: HeapCons<i16>,
    space: SpaceSignal,
    fault: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, EngineError> {
    let mut scratch: Vec<i16> = vec![0; 4_096];
    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0);
            }
            let popped = consumer.pop_slice(&mut scratch[..data.len()]);
            for (out, &s) in data.iter_mut().zip(&scratch[..popped]) {
                *out = s as f32 / i16::MAX as f32;
            }
            data[popped..].fill(0.0);
            space.1.notify_one();
        },
        error_callback(fault),
        None,
    )?;
    Ok(stream)
}

impl AudioSink for CpalSink {
    fn write(&mut self, samples: &[i16]) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::SinkClosed);
        }
        let mut offset = 0;
        let mut last_progress = Instant::now();
        while offset < samples.len() {
            if let Some(err) = self.fault.lock().take() {
                return Err(EngineError::Stream(err));
            }
            let pushed = self.producer.push_slice(&samples[offset..]);
            if pushed > 0 {
                offset += pushed;
                last_progress = Instant::now();
                continue;
            }
            if last_progress.elapsed() >= STALL_TIMEOUT {
                return Err(EngineError::Stalled(STALL_TIMEOUT));
            }
            let (lock, cvar) = &*self.space;
            let mut guard = lock.lock();
            if self.producer.is_full() {
                cvar.wait_for(&mut guard, WRITE_POLL);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .pause()
            .map_err(|e| EngineError::Stream(e.to_string()))
    }
}
