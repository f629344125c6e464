use crate::error::EngineError;
use crate::models::{ChannelAutomationData, KeyframeData, MAX_CHANNELS};

/// Piecewise-linear volume-over-time curve for one channel.
///
/// Keyframes are (seconds, volume percent) pairs kept sorted by time. Outside
/// the keyframed range the nearest endpoint's value holds: evaluation behaves
/// as if virtual keyframes existed at t=0 and t=total_duration copying the
/// first and last real values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutomationTrack {
    keyframes: Vec<KeyframeData>,
}

impl AutomationTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a keyframe, keeping the list sorted by time. Time is clamped to
    /// be non-negative and volume to [0, 100].
    pub fn add_keyframe(&mut self, time: f64, volume: f64) {
        let kf = KeyframeData {
            time: time.max(0.0),
            volume: volume.clamp(0.0, 100.0),
        };
        let idx = self
            .keyframes
            .partition_point(|existing| existing.time <= kf.time);
        self.keyframes.insert(idx, kf);
    }

    pub fn clear(&mut self) {
        self.keyframes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn keyframes(&self) -> &[KeyframeData] {
        &self.keyframes
    }

    /// Gain in [0, 1] at time `t` of a session lasting `total_duration`.
    /// An empty track is full volume everywhere.
    pub fn value_at(&self, t: f64, total_duration: f64) -> f32 {
        let Some(first) = self.keyframes.first() else {
            return 1.0;
        };
        let last = self.keyframes[self.keyframes.len() - 1];

        let t = t.clamp(0.0, total_duration.max(0.0));
        // Endpoint hold covers the virtual keyframes at 0 and total_duration.
        if t <= first.time {
            return (first.volume / 100.0).clamp(0.0, 1.0) as f32;
        }
        if t >= last.time {
            return (last.volume / 100.0).clamp(0.0, 1.0) as f32;
        }

        for pair in self.keyframes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.time <= t && t <= b.time {
                if b.time == a.time {
                    return (a.volume / 100.0).clamp(0.0, 1.0) as f32;
                }
                let v = a.volume + (b.volume - a.volume) * (t - a.time) / (b.time - a.time);
                return (v / 100.0).clamp(0.0, 1.0) as f32;
            }
        }
        1.0
    }
}

/// One automation track per channel slot.
#[derive(Debug, Clone)]
pub struct AutomationBank {
    tracks: Vec<AutomationTrack>,
}

impl Default for AutomationBank {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomationBank {
    pub fn new() -> Self {
        Self {
            tracks: vec![AutomationTrack::new(); MAX_CHANNELS],
        }
    }

    pub fn add_keyframe(&mut self, channel_id: usize, time: f64, volume: f64) -> Result<(), EngineError> {
        self.track_mut(channel_id)?.add_keyframe(time, volume);
        Ok(())
    }

    pub fn clear_channel(&mut self, channel_id: usize) -> Result<(), EngineError> {
        self.track_mut(channel_id)?.clear();
        Ok(())
    }

    pub fn clear_all(&mut self) {
        for track in &mut self.tracks {
            track.clear();
        }
    }

    pub fn track(&self, channel_id: usize) -> Option<&AutomationTrack> {
        self.tracks.get(channel_id)
    }

    /// Gain for `channel_id` at time `t`; channels without a track (or with an
    /// empty one) run at full volume.
    pub fn value_at(&self, channel_id: usize, t: f64, total_duration: f64) -> f32 {
        match self.tracks.get(channel_id) {
            Some(track) => track.value_at(t, total_duration),
            None => 1.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(|t| t.is_empty())
    }

    /// Build a bank from session data, rejecting out-of-range channel ids.
    pub fn from_session(automation: &[ChannelAutomationData]) -> Result<Self, EngineError> {
        let mut bank = Self::new();
        for entry in automation {
            for kf in &entry.keyframes {
                bank.add_keyframe(entry.channel, kf.time, kf.volume)?;
            }
        }
        Ok(bank)
    }

    fn track_mut(&mut self, channel_id: usize) -> Result<&mut AutomationTrack, EngineError> {
        self.tracks.get_mut(channel_id).ok_or_else(|| {
            EngineError::Config(format!(
                "channel id {channel_id} out of range (max {})",
                MAX_CHANNELS - 1
            ))
        })
    }
}
