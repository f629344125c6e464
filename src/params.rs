use parking_lot::Mutex;

use crate::error::EngineError;
use crate::models::{ChannelState, MAX_CHANNELS, MAX_FREQ};

struct StoreInner {
    slots: Vec<ChannelState>,
    displayed: usize,
    max_frequency: f32,
    /// Prebuilt copy of the audible channels, rebuilt on every mutation so
    /// readers only pay for a memcpy under the lock.
    snapshot: Vec<ChannelState>,
}

impl StoreInner {
    fn rebuild_snapshot(&mut self) {
        self.snapshot.clear();
        for ch in self.slots.iter().take(self.displayed) {
            if ch.is_audible() {
                self.snapshot.push(*ch);
            }
        }
    }
}

/// Thread-safe holder of the current channel parameters.
///
/// The UI (or CLI) side mutates slots; the audio-producing side copies the
/// audible-channel snapshot at the start of each block. The lock is held only
/// for the copy, never during synthesis, so a block is always generated from
/// one internally consistent parameter set.
pub struct ParameterStore {
    inner: Mutex<StoreInner>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        let mut inner = StoreInner {
            slots: (0..MAX_CHANNELS).map(ChannelState::new).collect(),
            displayed: MAX_CHANNELS,
            max_frequency: MAX_FREQ,
            snapshot: Vec::with_capacity(MAX_CHANNELS),
        };
        inner.rebuild_snapshot();
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Replace one channel's parameters. The incoming state is bounds-clamped
    /// against the current frequency ceiling before it becomes visible.
    pub fn update(&self, channel_id: usize, mut state: ChannelState) -> Result<(), EngineError> {
        if channel_id >= MAX_CHANNELS {
            return Err(EngineError::Config(format!(
                "channel id {channel_id} out of range (max {})",
                MAX_CHANNELS - 1
            )));
        }
        state.id = channel_id;
        let mut inner = self.inner.lock();
        state.clamp_bounds(inner.max_frequency);
        inner.slots[channel_id] = state;
        inner.rebuild_snapshot();
        Ok(())
    }

    pub fn channel(&self, channel_id: usize) -> Result<ChannelState, EngineError> {
        if channel_id >= MAX_CHANNELS {
            return Err(EngineError::Config(format!(
                "channel id {channel_id} out of range (max {})",
                MAX_CHANNELS - 1
            )));
        }
        Ok(self.inner.lock().slots[channel_id])
    }

    /// How many of the fixed slots the front end currently exposes. Channels
    /// at or beyond this index never reach the mix.
    pub fn set_displayed_channels(&self, count: usize) {
        let mut inner = self.inner.lock();
        inner.displayed = count.clamp(1, MAX_CHANNELS);
        inner.rebuild_snapshot();
    }

    /// Lower (or raise, up to [`MAX_FREQ`]) the runtime frequency ceiling.
    /// Channels already above a shrinking ceiling are clamped down.
    pub fn set_max_frequency(&self, max_frequency: f32) {
        let mut inner = self.inner.lock();
        inner.max_frequency = max_frequency.clamp(crate::models::MIN_FREQ, MAX_FREQ);
        let ceiling = inner.max_frequency;
        for ch in &mut inner.slots {
            ch.clamp_bounds(ceiling);
        }
        inner.rebuild_snapshot();
    }

    pub fn max_frequency(&self) -> f32 {
        self.inner.lock().max_frequency
    }

    /// Reset every slot to defaults.
    pub fn reset_all(&self) {
        let mut inner = self.inner.lock();
        for ch in &mut inner.slots {
            ch.reset();
        }
        inner.rebuild_snapshot();
    }

    /// Copy the audible-channel snapshot into `out`.
    ///
    /// `out` should be pre-reserved to [`MAX_CHANNELS`]; the copy then never
    /// allocates, which keeps this safe to call from the device callback.
    pub fn copy_snapshot_into(&self, out: &mut Vec<ChannelState>) {
        let inner = self.inner.lock();
        out.clear();
        out.extend_from_slice(&inner.snapshot);
    }

    pub fn has_audible_channel(&self) -> bool {
        !self.inner.lock().snapshot.is_empty()
    }

    /// Load a whole session's channel list, clamping each entry.
    pub fn load_channels(&self, channels: &[ChannelState]) -> Result<(), EngineError> {
        for ch in channels {
            self.update(ch.id, *ch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AMP_EPSILON;

    #[test]
    fn snapshot_contains_only_audible_channels() {
        let store = ParameterStore::new();
        let mut silent = ChannelState::new(1);
        silent.amplitude = 0.0;
        store.update(1, silent).unwrap();
        let mut inactive = ChannelState::new(2);
        inactive.active = false;
        store.update(2, inactive).unwrap();

        let mut snap = Vec::with_capacity(MAX_CHANNELS);
        store.copy_snapshot_into(&mut snap);
        assert!(snap.iter().all(|ch| ch.id != 1 && ch.id != 2));
        assert!(snap.iter().all(|ch| ch.is_audible()));
    }

    #[test]
    fn update_rejects_out_of_range_id() {
        let store = ParameterStore::new();
        let err = store.update(MAX_CHANNELS, ChannelState::new(0)).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn displayed_count_limits_snapshot() {
        let store = ParameterStore::new();
        store.set_displayed_channels(3);
        let mut snap = Vec::new();
        store.copy_snapshot_into(&mut snap);
        assert_eq!(snap.len(), 3);
        assert!(snap.iter().all(|ch| ch.id < 3));
    }

    #[test]
    fn shrinking_max_frequency_clamps_existing_channels() {
        let store = ParameterStore::new();
        let mut ch = ChannelState::new(0);
        ch.frequency = 3000.0;
        store.update(0, ch).unwrap();
        store.set_max_frequency(1000.0);
        assert_eq!(store.channel(0).unwrap().frequency, 1000.0);
        // New updates are clamped against the lowered ceiling too.
        ch.frequency = 2500.0;
        store.update(0, ch).unwrap();
        assert_eq!(store.channel(0).unwrap().frequency, 1000.0);
    }

    #[test]
    fn reset_restores_defaults() {
        let store = ParameterStore::new();
        let mut ch = ChannelState::new(4);
        ch.amplitude = AMP_EPSILON / 2.0;
        store.update(4, ch).unwrap();
        store.reset_all();
        assert!(store.channel(4).unwrap().is_audible());
    }

    #[test]
    fn snapshot_copy_does_not_grow_reserved_buffer() {
        let store = ParameterStore::new();
        let mut snap = Vec::with_capacity(MAX_CHANNELS);
        let cap = snap.capacity();
        store.copy_snapshot_into(&mut snap);
        assert_eq!(snap.capacity(), cap);
    }
}
