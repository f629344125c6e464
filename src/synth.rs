use crate::models::{ChannelState, AMP_EPSILON};

/// Fill `out` with one channel's mono block starting at `start_sample`.
///
/// The tone is `amplitude * sin(2*pi*frequency*t)` with `t` derived from the
/// absolute sample counter, so blocks are phase-continuous across calls for a
/// fixed counter progression. When the channel has an effective isochronic
/// rate the tone is gated by a 50%-duty square wave at that rate.
///
/// Total over all inputs: inaudible channels and non-positive frequencies
/// produce a zero block rather than an error, which keeps the audio hot path
/// infallible.
pub fn render_channel(ch: &ChannelState, start_sample: u64, sample_rate: f64, out: &mut [f32]) {
    if !ch.is_audible() || ch.frequency <= 0.0 {
        out.fill(0.0);
        return;
    }

    let amp = ch.amplitude as f64;
    let omega = 2.0 * std::f64::consts::PI * ch.frequency as f64;
    let iso_freq = ch.effective_iso_frequency() as f64;

    for (i, sample) in out.iter_mut().enumerate() {
        let t = (start_sample + i as u64) as f64 / sample_rate;
        let mut s = amp * (omega * t).sin();
        if iso_freq > AMP_EPSILON as f64 {
            // 50%-duty isochronic gate, hard on/off by design parity with
            // the rendered-file output.
            if (iso_freq * t).fract() >= 0.5 {
                s = 0.0;
            }
        }
        *sample = s as f32;
    }
}
