use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};

/// Progress and status notifications emitted by both engines. Delivery is
/// best-effort: a slow or absent subscriber never stalls audio generation.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Offline render progress in samples.
    Progress {
        rendered_samples: u64,
        total_samples: u64,
    },
    /// Live playback heartbeat, emitted about once per second.
    Elapsed { seconds: u64 },
    Status(String),
    Completed,
    Cancelled,
    Failed(String),
}

impl EngineEvent {
    pub fn progress_percent(&self) -> Option<f64> {
        match self {
            EngineEvent::Progress {
                rendered_samples,
                total_samples,
            } if *total_samples > 0 => {
                Some(*rendered_samples as f64 / *total_samples as f64 * 100.0)
            }
            _ => None,
        }
    }
}

pub type EventSender = Sender<EngineEvent>;
pub type EventReceiver = Receiver<EngineEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    unbounded()
}

const RELAY_CAPACITY: usize = 64;
const RELAY_POLL: Duration = Duration::from_millis(50);

/// Bridges the device callback to an [`EventSender`].
///
/// The callback pushes into a lock-free SPSC ring (dropping events when the
/// ring is full); a relay thread drains the ring and forwards to the channel.
/// This keeps channel sends, and any allocation they imply, off the audio
/// thread entirely.
pub struct EventRelay {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EventRelay {
    pub fn start(sink: EventSender) -> (HeapProd<EngineEvent>, EventRelay) {
        let (producer, mut consumer) = HeapRb::<EngineEvent>::new(RELAY_CAPACITY).split();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = std::thread::spawn(move || {
            loop {
                while let Some(event) = consumer.try_pop() {
                    if sink.send(event).is_err() {
                        return;
                    }
                }
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                std::thread::sleep(RELAY_POLL);
            }
            // Final drain after the stop request.
            while let Some(event) = consumer.try_pop() {
                let _ = sink.send(event);
            }
        });
        (
            producer,
            EventRelay {
                stop,
                handle: Some(handle),
            },
        )
    }
}

impl Drop for EventRelay {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
