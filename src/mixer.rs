use crate::automation::AutomationBank;
use crate::dsp::{depth_gain, distance_gain, hard_clip, pan_gains};
use crate::models::ChannelState;
use crate::synth::render_channel;

/// Stereo block generator: per-channel synthesis, 3D-to-stereo spatialization,
/// headroom normalization and clipping.
///
/// Both the realtime engine and the offline renderer drive this same struct,
/// which is what guarantees live playback and rendered files sound identical
/// for the same parameters. The only difference between the two paths is the
/// optional automation bank, applied per channel before spatial summation.
pub struct BlockMixer {
    sample_rate: f64,
    mono: Vec<f32>,
}

impl BlockMixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            mono: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    /// Render one interleaved stereo block (`out.len() / 2` frames) starting
    /// at the absolute sample counter `start_sample`. Used by live playback.
    pub fn render_block(&mut self, channels: &[ChannelState], start_sample: u64, out: &mut [f32]) {
        self.render(channels, start_sample, None, 0.0, out);
    }

    /// Same pipeline with per-channel automation gains, used by the offline
    /// renderer. With an empty bank the output is bit-identical to
    /// [`render_block`].
    pub fn render_block_automated(
        &mut self,
        channels: &[ChannelState],
        start_sample: u64,
        automation: &AutomationBank,
        total_duration: f64,
        out: &mut [f32],
    ) {
        self.render(channels, start_sample, Some(automation), total_duration, out);
    }

    fn render(
        &mut self,
        channels: &[ChannelState],
        start_sample: u64,
        automation: Option<&AutomationBank>,
        total_duration: f64,
        out: &mut [f32],
    ) {
        out.fill(0.0);
        let frames = out.len() / 2;
        if frames == 0 {
            return;
        }
        if self.mono.len() != frames {
            self.mono.resize(frames, 0.0);
        }

        // Headroom normalization divisor: the sum of contributing amplitudes,
        // applied only when it exceeds unity so sparse mixes stay untouched.
        let mut amp_sum = 0.0f32;

        for ch in channels {
            if !ch.is_audible() {
                continue;
            }
            amp_sum += ch.amplitude;

            render_channel(ch, start_sample, self.sample_rate, &mut self.mono);

            if let Some(bank) = automation {
                if let Some(track) = bank.track(ch.id) {
                    if !track.is_empty() {
                        for (i, m) in self.mono.iter_mut().enumerate() {
                            let t = (start_sample + i as u64) as f64 / self.sample_rate;
                            *m *= track.value_at(t, total_duration);
                        }
                    }
                }
            }

            let pos = ch.position();
            let spatial = distance_gain(pos) * depth_gain(pos);
            let (gain_left, gain_right) = pan_gains(pos.x);
            for (i, &m) in self.mono.iter().enumerate() {
                let s = m * spatial;
                out[i * 2] += s * gain_left;
                out[i * 2 + 1] += s * gain_right;
            }
        }

        if amp_sum > 1.0 {
            for s in out.iter_mut() {
                *s /= amp_sum;
            }
        }
        for s in out.iter_mut() {
            *s = hard_clip(*s);
        }
    }
}
