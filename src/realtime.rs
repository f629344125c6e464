use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use ringbuf::traits::Producer;

use crate::audio_io::{self, StreamParams};
use crate::config::CONFIG;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventRelay, EventSender};
use crate::mixer::BlockMixer;
use crate::models::MAX_CHANNELS;
use crate::params::ParameterStore;

/// How long `start()` waits for the audio thread to report the device state.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

struct RunningStream {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    // Dropped with the stream; joins the relay thread after a final drain.
    _relay: Option<EventRelay>,
}

/// Live playback: a device callback pulls parameter snapshots and synthesizes
/// stereo blocks on the fly. Idle -> Streaming -> Idle.
///
/// Automation is deliberately not applied here; live output reflects only the
/// instantaneous channel parameters.
pub struct RealtimeEngine {
    params: Arc<ParameterStore>,
    events: Option<EventSender>,
    running: Option<RunningStream>,
}

impl RealtimeEngine {
    pub fn new(params: Arc<ParameterStore>) -> Self {
        Self {
            params,
            events: None,
            running: None,
        }
    }

    /// Subscribe to playback heartbeat events. Takes effect at the next
    /// `start()`.
    pub fn set_event_sink(&mut self, sink: EventSender) {
        self.events = Some(sink);
    }

    pub fn is_streaming(&self) -> bool {
        self.running.is_some()
    }

    /// Open the output device and begin streaming from sample counter zero.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.running.is_some() {
            return Err(EngineError::Config("stream already running".into()));
        }
        if !self.params.has_audible_channel() {
            return Err(EngineError::Device("no active channels to play".into()));
        }

        let stream_params = StreamParams {
            sample_rate: CONFIG.sample_rate,
            block_frames: CONFIG.block_frames(),
        };

        let relay = self.events.clone().map(EventRelay::start);
        let (mut event_producer, relay) = match relay {
            Some((producer, relay)) => (Some(producer), Some(relay)),
            None => (None, None),
        };

        let params = self.params.clone();
        let sample_rate = stream_params.sample_rate as u64;
        let mut mixer = BlockMixer::new(stream_params.sample_rate);
        let mut snapshot = Vec::with_capacity(MAX_CHANNELS);
        let mut counter: u64 = 0;
        let mut next_heartbeat: u64 = sample_rate;

        let fill = move |data: &mut [f32]| {
            params.copy_snapshot_into(&mut snapshot);
            mixer.render_block(&snapshot, counter, data);
            counter += (data.len() / 2) as u64;
            if counter >= next_heartbeat {
                // Best-effort, lock-free; dropped when the ring is full.
                if let Some(producer) = event_producer.as_mut() {
                    let _ = producer.try_push(EngineEvent::Elapsed {
                        seconds: counter / sample_rate,
                    });
                }
                next_heartbeat += sample_rate;
            }
        };

        let (ready_tx, ready_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let handle = std::thread::spawn(move || {
            audio_io::run_output_stream(stream_params, fill, ready_tx, stop_rx);
            let _ = done_tx.send(());
        });

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {
                self.running = Some(RunningStream {
                    stop_tx,
                    done_rx,
                    handle: Some(handle),
                    _relay: relay,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(EngineError::Device(
                "timed out waiting for the output device".into(),
            )),
        }
    }

    /// Stop streaming and return to Idle. Safe to call when already idle.
    ///
    /// A [`EngineError::JoinTimeout`] means the audio thread has not exited
    /// within the configured bound; the engine is still Idle and the thread is
    /// left detached; callers should report it as a warning, not a failure.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        let _ = running.stop_tx.send(());
        match running.done_rx.recv_timeout(CONFIG.join_timeout()) {
            Ok(()) => {
                if let Some(handle) = running.handle.take() {
                    let _ = handle.join();
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("audio thread did not stop in time; detaching");
                Err(EngineError::JoinTimeout(CONFIG.join_timeout()))
            }
        }
    }
}

impl Drop for RealtimeEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelState;

    fn silent_store() -> Arc<ParameterStore> {
        let store = ParameterStore::new();
        for id in 0..MAX_CHANNELS {
            let mut ch = ChannelState::new(id);
            ch.active = false;
            store.update(id, ch).unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn start_without_audible_channels_is_a_device_error() {
        let mut engine = RealtimeEngine::new(silent_store());
        let err = engine.start().unwrap_err();
        assert!(matches!(err, EngineError::Device(_)));
        assert!(!engine.is_streaming());
    }

    #[test]
    fn stop_when_idle_is_a_no_op() {
        let mut engine = RealtimeEngine::new(silent_store());
        assert!(engine.stop().is_ok());
        assert!(engine.stop().is_ok());
    }
}
