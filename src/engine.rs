//! Streaming engine: owns the generation thread and its lifecycle.
//!
//! ```text
//! Host thread                      Generation thread                 Device
//!     │                                  │                             │
//! [update_settings]──(SettingsStore)──►[snapshot per buffer]           │
//!     │                                [fill + meter]                  │
//!     │ ◄───────────(telemetry)────────[report]                        │
//!     │                                [write]──────(AudioSink)──────►[play]
//! ```
//!
//! Walks, phases, filter state and levels live only on the generation thread and are
//! rebuilt on every `start`.

use crossbeam::atomic::AtomicCell;
use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thread_priority::{set_current_thread_priority, ThreadPriority};

use crate::audio_io::{AudioSink, CpalSink};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::generator::{BrownNoiseGenerator, CHANNELS};
use crate::metering::{LevelReport, LoopStats};
use crate::settings::{EngineSettings, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
}

/// Opens the output device. Runs on the generation thread.
pub type SinkFactory =
    Arc<dyn Fn(&EngineConfig) -> Result<Box<dyn AudioSink>, EngineError> + Send + Sync>;

/// Receives one [`LevelReport`] per buffer, on the generation thread. Must not block.
pub type TelemetryCallback = Arc<dyn Fn(LevelReport) + Send + Sync>;

/// State visible to both the host and the generation thread.
struct Shared {
    settings: SettingsStore,
    state: AtomicCell<EngineState>,
    stream_error: Mutex<Option<EngineError>>,
    priority_elevated: AtomicCell<bool>,
}

type ReadySender = Sender<Result<(), EngineError>>;

pub struct NoiseEngine {
    config: EngineConfig,
    shared: Arc<Shared>,
    sink_factory: SinkFactory,
    telemetry: Option<TelemetryCallback>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NoiseEngine {
    pub fn new<F>(config: EngineConfig, sink_factory: F) -> Self
    where
        F: Fn(&EngineConfig) -> Result<Box<dyn AudioSink>, EngineError> + Send + Sync + 'static,
    {
        Self {
            config,
            shared: Arc::new(Shared {
                settings: SettingsStore::default(),
                state: AtomicCell::new(EngineState::Stopped),
                stream_error: Mutex::new(None),
                priority_elevated: AtomicCell::new(false),
            }),
            sink_factory: Arc::new(sink_factory),
            telemetry: None,
            worker: Mutex::new(None),
        }
    }

    /// Engine playing through the default cpal output device.
    pub fn with_cpal_output(config: EngineConfig) -> Self {
        Self::new(config, |config| {
            CpalSink::open(config).map(|sink| Box::new(sink) as Box<dyn AudioSink>)
        })
    }

    pub fn with_telemetry<F>(mut self, callback: F) -> Self
    where
        F: Fn(LevelReport) + Send + Sync + 'static,
    {
        self.telemetry = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.shared.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    pub fn settings(&self) -> EngineSettings {
        self.shared.settings.snapshot()
    }

    /// Replace the settings snapshot. Takes effect at the next buffer boundary.
    pub fn update_settings(&self, settings: EngineSettings) {
        self.shared.settings.publish(settings);
    }

    /// Whether the current or last generation thread got maximum scheduling priority.
    pub fn priority_elevated(&self) -> bool {
        self.shared.priority_elevated.load()
    }

    /// The error that stopped the stream on its own, if any.
    pub fn take_stream_error(&self) -> Option<EngineError> {
        self.shared.stream_error.lock().take()
    }

    /// Open the output and start generating. Does nothing unless the engine is stopped.
    ///
    /// Returns once the sink is open; on failure the engine is back in `Stopped`.
    pub fn start(&self) -> Result<(), EngineError> {
        if self
            .shared
            .state
            .compare_exchange(EngineState::Stopped, EngineState::Starting)
            .is_err()
        {
            log::debug!("start ignored, engine is {:?}", self.state());
            return Ok(());
        }

        // A worker that ended after a stream failure is still waiting to be joined.
        if let Some(stale) = self.worker.lock().take() {
            let _ = stale.join();
        }

        let (ready_tx, ready_rx) = bounded(1);
        let worker = Worker {
            config: self.config.clone(),
            shared: self.shared.clone(),
            sink_factory: self.sink_factory.clone(),
            telemetry: self.telemetry.clone(),
        };
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                let shared = worker.shared.clone();
                let mut ready = Some(ready_tx);
                let result = panic::catch_unwind(AssertUnwindSafe(|| worker.run(&mut ready)));
                if let Err(payload) = result {
                    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = payload.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    log::error!("generation thread panicked: {msg}");
                    if ready.is_some() {
                        // `start` is still waiting; the panic becomes its result.
                        shared.state.store(EngineState::Stopped);
                        announce(&mut ready, Err(EngineError::WorkerPanicked(msg)));
                    } else {
                        *shared.stream_error.lock() = Some(EngineError::WorkerPanicked(msg));
                        shared.state.store(EngineState::Stopped);
                    }
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.shared.state.store(EngineState::Stopped);
                return Err(EngineError::Spawn(err));
            }
        };

        let opened = ready_rx.recv().unwrap_or(Err(EngineError::WorkerLost));
        match opened {
            Ok(()) => {
                *self.worker.lock() = Some(handle);
                log::info!(
                    "noise engine started ({} Hz, {} frames per buffer)",
                    self.config.sample_rate,
                    self.config.buffer_frames
                );
                Ok(())
            }
            Err(err) => {
                let _ = handle.join();
                self.shared.state.store(EngineState::Stopped);
                log::error!("noise engine failed to start: {err}");
                Err(err)
            }
        }
    }

    /// Stop generating and release the output. Does nothing if already stopped.
    ///
    /// Waits for the generation thread, which is at most one buffer fill and one write.
    pub fn stop(&self) {
        if self.shared.state.swap(EngineState::Stopped) == EngineState::Stopped {
            return;
        }

        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() == thread::current().id() {
                // Called from the telemetry callback; the loop exits on its own.
                return;
            }
            if handle.join().is_err() {
                log::warn!("generation thread did not exit cleanly");
            }
        }
        log::info!("noise engine stopped");
    }
}

impl Drop for NoiseEngine {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.worker.get_mut().take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    config: EngineConfig,
    shared: Arc<Shared>,
    sink_factory: SinkFactory,
    telemetry: Option<TelemetryCallback>,
}

/// Ask the OS for the highest scheduling priority for the calling thread.
///
/// Unprivileged processes are usually refused; generation then runs at normal priority.
fn raise_priority() -> bool {
    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("could not raise generation thread priority: {err:?}");
            false
        }
    }
}

/// Resolve the pending `start` call. Later calls do nothing.
fn announce(ready: &mut Option<ReadySender>, result: Result<(), EngineError>) {
    if let Some(tx) = ready.take() {
        let _ = tx.send(result);
    }
}

impl Worker {
    fn run(self, ready: &mut Option<ReadySender>) {
        self.shared.priority_elevated.store(raise_priority());

        let mut sink = match (self.sink_factory)(&self.config) {
            Ok(sink) => sink,
            Err(err) => {
                announce(ready, Err(err));
                return;
            }
        };

        let mut generator = BrownNoiseGenerator::new(
            &self.shared.settings.snapshot(),
            self.config.sample_rate,
            self.config.seed,
        );
        let mut buffer = vec![0i16; self.config.buffer_frames * CHANNELS];
        let mut stats = LoopStats::new();

        let promoted = self
            .shared
            .state
            .compare_exchange(EngineState::Starting, EngineState::Running)
            .is_ok();
        announce(ready, Ok(()));
        if promoted {
            self.generate(sink.as_mut(), &mut generator, &mut buffer, &mut stats);
        }

        if let Err(err) = sink.close() {
            log::debug!("ignoring error while closing output: {err}");
        }
        log::debug!("generation thread exiting");
    }

    fn generate(
        &self,
        sink: &mut dyn AudioSink,
        generator: &mut BrownNoiseGenerator,
        buffer: &mut [i16],
        stats: &mut LoopStats,
    ) {
        while self.shared.state.load() == EngineState::Running {
            let settings = self.shared.settings.snapshot();

            let fill_started = Instant::now();
            let report = generator.fill(&settings, buffer);
            let fill_time = fill_started.elapsed();

            if let Some(telemetry) = &self.telemetry {
                telemetry(report);
            }

            let write_started = Instant::now();
            if let Err(err) = sink.write(buffer) {
                if self.shared.state.load() == EngineState::Running {
                    log::error!("output write failed, stopping stream: {err}");
                    *self.shared.stream_error.lock() = Some(err);
                    let _ = self
                        .shared
                        .state
                        .compare_exchange(EngineState::Running, EngineState::Stopped);
                } else {
                    log::debug!("write failed during shutdown: {err}");
                }
                return;
            }

            stats.record(fill_time, write_started.elapsed());
            stats.maybe_log(&report);
        }
    }
}
