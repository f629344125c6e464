use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use crossbeam::channel::{Receiver, Sender};

use crate::error::EngineError;

/// Stream geometry requested from the output device.
#[derive(Debug, Clone, Copy)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub block_frames: usize,
}

/// Open the default output device and pull stereo f32 blocks from `fill`
/// until a stop request arrives.
///
/// Runs on a dedicated thread because cpal streams must live on the thread
/// that built them. The open/start outcome is reported once on `ready_tx`
/// so the caller can surface device errors synchronously from `start()`.
pub fn run_output_stream<F>(
    params: StreamParams,
    mut fill: F,
    ready_tx: Sender<Result<(), EngineError>>,
    stop_rx: Receiver<()>,
) where
    F: FnMut(&mut [f32]) + Send + 'static,
{
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err(EngineError::Device("no output device available".into())));
            return;
        }
    };
    let supported = match device.default_output_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            let _ = ready_tx.send(Err(EngineError::Device(format!(
                "no default output config: {e}"
            ))));
            return;
        }
    };
    if supported.sample_format() != SampleFormat::F32 {
        let _ = ready_tx.send(Err(EngineError::Device(format!(
            "unsupported sample format {:?}",
            supported.sample_format()
        ))));
        return;
    }

    let config = StreamConfig {
        channels: 2,
        sample_rate: SampleRate(params.sample_rate),
        buffer_size: BufferSize::Fixed(params.block_frames as u32),
    };

    let audio_callback = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        fill(data);
    };
    let err_fn = |err| tracing::error!("output stream error: {err}");

    let stream = match device.build_output_stream(&config, audio_callback, err_fn, None) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(EngineError::Device(format!(
                "failed to open {} Hz / {} frame stream: {e}",
                params.sample_rate, params.block_frames
            ))));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(EngineError::Device(format!(
            "failed to start stream: {e}"
        ))));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Keep the stream alive until the engine asks us to stop. The callback
    // simply ceases to be invoked once the stream drops.
    let _ = stop_rx.recv();
}
