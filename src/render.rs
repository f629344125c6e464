use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::automation::AutomationBank;
use crate::config::CONFIG;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventSender};
use crate::mixer::BlockMixer;
use crate::models::MAX_CHANNELS;
use crate::params::ParameterStore;

/// Destination for a completed offline render: a full interleaved stereo
/// buffer handed over in one call.
pub trait RenderSink: Send {
    fn write(&mut self, samples: &[f32], sample_rate: u32) -> Result<(), EngineError>;
}

/// 16-bit PCM WAV writeback through hound. Relative paths resolve against the
/// configured output directory.
pub struct WavFileSink {
    path: PathBuf,
}

impl WavFileSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            CONFIG.output_dir.join(path)
        };
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RenderSink for WavFileSink {
    fn write(&mut self, samples: &[f32], sample_rate: u32) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&self.path, spec)?;
        for sample in samples {
            let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(s)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Recording,
    Paused,
}

struct RenderCtrl {
    paused: AtomicBool,
    stop: AtomicBool,
    discard: AtomicBool,
}

struct Worker {
    handle: Option<JoinHandle<()>>,
    done_rx: Receiver<Result<(), EngineError>>,
}

/// Offline render: a paced background loop that runs the same synthesis and
/// mixing pipeline as live playback, plus per-channel automation, into an
/// accumulator that is flushed to a sink on completion.
/// Idle -> Recording <-> Paused -> Idle.
pub struct OfflineRenderEngine {
    params: Arc<ParameterStore>,
    ctrl: Arc<RenderCtrl>,
    worker: Option<Worker>,
}

impl OfflineRenderEngine {
    pub fn new(params: Arc<ParameterStore>) -> Self {
        Self {
            params,
            ctrl: Arc::new(RenderCtrl {
                paused: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                discard: AtomicBool::new(false),
            }),
            worker: None,
        }
    }

    pub fn state(&self) -> RenderState {
        if self.worker.is_none() {
            RenderState::Idle
        } else if self.ctrl.paused.load(Ordering::Relaxed) {
            RenderState::Paused
        } else {
            RenderState::Recording
        }
    }

    /// Begin rendering `duration` seconds into `sink`. The loop paces itself
    /// to wall-clock time so pause/resume and progress are meaningful.
    pub fn start(
        &mut self,
        duration: f64,
        sink: Box<dyn RenderSink>,
        automation: AutomationBank,
        events: Option<EventSender>,
    ) -> Result<(), EngineError> {
        if self.worker.is_some() {
            return Err(EngineError::Config("render already in progress".into()));
        }
        if duration <= 0.0 {
            return Err(EngineError::Config(format!(
                "render duration must be positive, got {duration}"
            )));
        }

        self.ctrl.paused.store(false, Ordering::Relaxed);
        self.ctrl.stop.store(false, Ordering::Relaxed);
        self.ctrl.discard.store(false, Ordering::Relaxed);

        let params = self.params.clone();
        let ctrl = self.ctrl.clone();
        let (done_tx, done_rx) = bounded(1);
        let handle = std::thread::spawn(move || {
            let result = run_render_loop(&params, &ctrl, duration, sink, &automation, events);
            let _ = done_tx.send(result);
        });
        self.worker = Some(Worker {
            handle: Some(handle),
            done_rx,
        });
        Ok(())
    }

    /// Suspend block generation; no samples are produced while paused.
    pub fn pause(&self) {
        self.ctrl.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.ctrl.paused.store(false, Ordering::Relaxed);
    }

    /// Stop the render. `force` discards everything accumulated so far;
    /// otherwise the partial (or complete) buffer is flushed to the sink.
    /// Returns the sink outcome; a [`EngineError::JoinTimeout`] is a warning,
    /// the engine is Idle either way.
    pub fn stop(&mut self, force: bool) -> Result<(), EngineError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        if force {
            self.ctrl.discard.store(true, Ordering::Relaxed);
        }
        self.ctrl.stop.store(true, Ordering::Relaxed);
        self.ctrl.paused.store(false, Ordering::Relaxed);
        Self::finish(worker)
    }

    /// Block until the render finishes on its own (or is stopped elsewhere)
    /// and return the sink outcome.
    pub fn wait(&mut self) -> Result<(), EngineError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let mut worker = worker;
        let result = worker
            .done_rx
            .recv()
            .unwrap_or_else(|_| Err(EngineError::Config("render thread vanished".into())));
        if let Some(handle) = worker.handle.take() {
            let _ = handle.join();
        }
        result
    }

    fn finish(mut worker: Worker) -> Result<(), EngineError> {
        match worker.done_rx.recv_timeout(CONFIG.join_timeout()) {
            Ok(result) => {
                if let Some(handle) = worker.handle.take() {
                    let _ = handle.join();
                }
                result
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("render thread did not stop in time; detaching");
                Err(EngineError::JoinTimeout(CONFIG.join_timeout()))
            }
        }
    }
}

impl Drop for OfflineRenderEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop(true);
        }
    }
}

const PAUSE_POLL: Duration = Duration::from_millis(100);

fn run_render_loop(
    params: &ParameterStore,
    ctrl: &RenderCtrl,
    duration: f64,
    mut sink: Box<dyn RenderSink>,
    automation: &AutomationBank,
    events: Option<EventSender>,
) -> Result<(), EngineError> {
    let sample_rate = CONFIG.sample_rate;
    let block_frames = CONFIG.render_block_frames() as u64;
    let block_period = Duration::from_secs_f64(CONFIG.render_block_duration);
    let total_samples = (duration * sample_rate as f64) as u64;

    let mut mixer = BlockMixer::new(sample_rate);
    let mut snapshot = Vec::with_capacity(MAX_CHANNELS);
    let mut block = vec![0.0f32; block_frames as usize * 2];
    let mut accumulator: Vec<f32> = Vec::with_capacity(total_samples as usize * 2);
    let mut rendered: u64 = 0;

    tracing::debug!(duration, total_samples, "render started");

    while rendered < total_samples && !ctrl.stop.load(Ordering::Relaxed) {
        if ctrl.paused.load(Ordering::Relaxed) {
            std::thread::sleep(PAUSE_POLL);
            continue;
        }
        let iteration_start = Instant::now();

        let frames = block_frames.min(total_samples - rendered);
        let out = &mut block[..frames as usize * 2];
        // Fresh snapshot per block: parameter edits land on block boundaries,
        // never mid-block.
        params.copy_snapshot_into(&mut snapshot);
        mixer.render_block_automated(&snapshot, rendered, automation, duration, out);
        accumulator.extend_from_slice(out);
        rendered += frames;

        if let Some(events) = &events {
            let _ = events.try_send(EngineEvent::Progress {
                rendered_samples: rendered,
                total_samples,
            });
        }

        // Pace to real time; the tail block is shorter and ends immediately.
        if frames == block_frames {
            let elapsed = iteration_start.elapsed();
            if elapsed < block_period {
                std::thread::sleep(block_period - elapsed);
            }
        }
    }

    if ctrl.discard.load(Ordering::Relaxed) {
        tracing::debug!(rendered, "render cancelled, discarding accumulator");
        if let Some(events) = &events {
            let _ = events.try_send(EngineEvent::Cancelled);
        }
        return Ok(());
    }

    match sink.write(&accumulator, sample_rate) {
        Ok(()) => {
            tracing::debug!(rendered, "render flushed to sink");
            if let Some(events) = &events {
                let _ = events.try_send(EngineEvent::Completed);
            }
            Ok(())
        }
        Err(e) => {
            if let Some(events) = &events {
                let _ = events.try_send(EngineEvent::Failed(e.to_string()));
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use crate::models::ChannelState;
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct MemorySink {
        buffer: Arc<Mutex<Option<Vec<f32>>>>,
    }

    impl MemorySink {
        fn take(&self) -> Option<Vec<f32>> {
            self.buffer.lock().take()
        }
    }

    impl RenderSink for MemorySink {
        fn write(&mut self, samples: &[f32], _sample_rate: u32) -> Result<(), EngineError> {
            *self.buffer.lock() = Some(samples.to_vec());
            Ok(())
        }
    }

    struct FailingSink;

    impl RenderSink for FailingSink {
        fn write(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<(), EngineError> {
            Err(EngineError::SinkWrite("disk full".into()))
        }
    }

    fn test_store() -> Arc<ParameterStore> {
        let store = ParameterStore::new();
        store.set_displayed_channels(1);
        let mut ch = ChannelState::new(0);
        ch.frequency = 440.0;
        ch.amplitude = 0.5;
        store.update(0, ch).unwrap();
        Arc::new(store)
    }

    #[test]
    fn rejects_non_positive_duration() {
        let mut engine = OfflineRenderEngine::new(test_store());
        let err = engine
            .start(0.0, Box::new(MemorySink::default()), AutomationBank::new(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(engine.state(), RenderState::Idle);
    }

    #[test]
    fn completes_and_flushes_expected_sample_count() {
        let store = test_store();
        let sink = MemorySink::default();
        let (tx, rx) = event_channel();
        let mut engine = OfflineRenderEngine::new(store);
        engine
            .start(0.3, Box::new(sink.clone()), AutomationBank::new(), Some(tx))
            .unwrap();
        engine.wait().unwrap();
        assert_eq!(engine.state(), RenderState::Idle);

        let expected_samples = (0.3 * CONFIG.sample_rate as f64) as usize * 2;
        assert_eq!(sink.take().unwrap().len(), expected_samples);

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events.last(), Some(EngineEvent::Completed)));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::Progress { .. })));
    }

    #[test]
    fn forced_stop_discards_the_accumulator() {
        let store = test_store();
        let sink = MemorySink::default();
        let (tx, rx) = event_channel();
        let mut engine = OfflineRenderEngine::new(store);
        engine
            .start(30.0, Box::new(sink.clone()), AutomationBank::new(), Some(tx))
            .unwrap();
        std::thread::sleep(Duration::from_millis(150));
        engine.stop(true).unwrap();
        assert_eq!(engine.state(), RenderState::Idle);
        assert!(sink.take().is_none());
        assert!(rx.try_iter().any(|e| e == EngineEvent::Cancelled));
    }

    #[test]
    fn graceful_stop_flushes_partial_output() {
        let store = test_store();
        let sink = MemorySink::default();
        let mut engine = OfflineRenderEngine::new(store);
        engine
            .start(30.0, Box::new(sink.clone()), AutomationBank::new(), None)
            .unwrap();
        std::thread::sleep(Duration::from_millis(250));
        engine.stop(false).unwrap();
        let written = sink.take().unwrap();
        assert!(!written.is_empty());
        assert!(written.len() < (30.0 * CONFIG.sample_rate as f64) as usize * 2);
    }

    #[test]
    fn pause_halts_sample_production() {
        let store = test_store();
        let sink = MemorySink::default();
        let (tx, rx) = event_channel();
        let mut engine = OfflineRenderEngine::new(store);
        engine
            .start(1.0, Box::new(sink.clone()), AutomationBank::new(), Some(tx))
            .unwrap();
        engine.pause();
        assert_eq!(engine.state(), RenderState::Paused);
        std::thread::sleep(Duration::from_millis(300));
        let paused_progress = rx
            .try_iter()
            .filter_map(|e| match e {
                EngineEvent::Progress {
                    rendered_samples, ..
                } => Some(rendered_samples),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        // At most the blocks generated before the pause flag landed.
        assert!(paused_progress < (0.5 * CONFIG.sample_rate as f64) as u64);
        engine.resume();
        engine.wait().unwrap();
        let expected = (1.0 * CONFIG.sample_rate as f64) as usize * 2;
        assert_eq!(sink.take().unwrap().len(), expected);
    }

    #[test]
    fn sink_failure_surfaces_as_sink_write_error() {
        let store = test_store();
        let mut engine = OfflineRenderEngine::new(store);
        engine
            .start(0.15, Box::new(FailingSink), AutomationBank::new(), None)
            .unwrap();
        let err = engine.wait().unwrap_err();
        assert!(matches!(err, EngineError::SinkWrite(_)));
    }

    #[test]
    fn offline_output_matches_live_block_generator() {
        // Same snapshot, same absolute sample range, automation disabled:
        // the offline path must be bit-identical to the live one.
        let store = test_store();
        let sink = MemorySink::default();
        let mut engine = OfflineRenderEngine::new(store.clone());
        engine
            .start(0.25, Box::new(sink.clone()), AutomationBank::new(), None)
            .unwrap();
        engine.wait().unwrap();
        let rendered = sink.take().unwrap();

        let mut snapshot = Vec::new();
        store.copy_snapshot_into(&mut snapshot);
        let mut mixer = BlockMixer::new(CONFIG.sample_rate);
        let mut live = vec![0.0f32; rendered.len()];
        let live_block = CONFIG.block_frames();
        let mut offset = 0usize;
        while offset * 2 < live.len() {
            let frames = live_block.min(live.len() / 2 - offset);
            mixer.render_block(
                &snapshot,
                offset as u64,
                &mut live[offset * 2..(offset + frames) * 2],
            );
            offset += frames;
        }
        assert_eq!(rendered, live);
    }

    #[test]
    fn automation_shapes_the_rendered_gain() {
        let store = test_store();
        let sink = MemorySink::default();
        let mut automation = AutomationBank::new();
        // Full volume at the start, silent from halfway on.
        automation.add_keyframe(0, 0.0, 100.0).unwrap();
        automation.add_keyframe(0, 0.1, 0.0).unwrap();

        let mut engine = OfflineRenderEngine::new(store);
        engine
            .start(0.2, Box::new(sink.clone()), automation, None)
            .unwrap();
        engine.wait().unwrap();
        let rendered = sink.take().unwrap();

        let frames = rendered.len() / 2;
        let head_peak = rendered[..frames / 4 * 2]
            .iter()
            .fold(0.0f32, |a, &b| a.max(b.abs()));
        let tail_peak = rendered[frames / 2 * 2 + frames / 4 * 2..]
            .iter()
            .fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(head_peak > 0.2, "head {head_peak}");
        assert!(tail_peak < 1e-6, "tail {tail_peak}");
    }
}
