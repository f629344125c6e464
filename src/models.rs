use serde::{Deserialize, Serialize};

/// Number of channel slots created at startup. Slots are reset, never destroyed.
pub const MAX_CHANNELS: usize = 12;

pub const MIN_FREQ: f32 = 20.0;
pub const MAX_FREQ: f32 = 5000.0;
pub const DEFAULT_FREQ: f32 = 100.0;

pub const DEFAULT_AMP: f32 = 0.5;

pub const MIN_ISO_FREQ: f32 = 0.0;
pub const MAX_ISO_FREQ: f32 = 50.0;

/// Amplitudes and isochronic frequencies at or below this are treated as zero.
pub const AMP_EPSILON: f32 = 0.001;

fn default_true() -> bool {
    true
}

fn default_freq() -> f32 {
    DEFAULT_FREQ
}

fn default_amp() -> f32 {
    DEFAULT_AMP
}

/// Listener-relative source position, each axis in [-1, 1].
/// x is left/right, y is back/front, z is down/up.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x: x.clamp(-1.0, 1.0),
            y: y.clamp(-1.0, 1.0),
            z: z.clamp(-1.0, 1.0),
        }
    }

    pub fn distance(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Full parameter record for one oscillator channel.
///
/// Field aliases match the JSON written by the original desktop front end so
/// saved sessions load unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    pub id: usize,
    #[serde(default = "default_true", alias = "is_active")]
    pub active: bool,
    #[serde(default = "default_freq")]
    pub frequency: f32,
    #[serde(default = "default_amp")]
    pub amplitude: f32,
    #[serde(default, alias = "is_iso_active")]
    pub iso_enabled: bool,
    #[serde(default, alias = "isochronic_frequency")]
    pub iso_frequency: f32,
    #[serde(default, alias = "x_pos")]
    pub x: f32,
    #[serde(default, alias = "y_pos")]
    pub y: f32,
    #[serde(default, alias = "z_pos")]
    pub z: f32,
}

impl ChannelState {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            active: true,
            frequency: DEFAULT_FREQ,
            amplitude: DEFAULT_AMP,
            iso_enabled: false,
            iso_frequency: 0.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Clamp every field into its legal range. `max_frequency` is the current
    /// runtime ceiling, which may be lower than [`MAX_FREQ`].
    pub fn clamp_bounds(&mut self, max_frequency: f32) {
        self.frequency = self.frequency.clamp(MIN_FREQ, max_frequency.min(MAX_FREQ));
        self.amplitude = self.amplitude.clamp(0.0, 1.0);
        self.iso_frequency = self.iso_frequency.clamp(MIN_ISO_FREQ, MAX_ISO_FREQ);
        self.x = self.x.clamp(-1.0, 1.0);
        self.y = self.y.clamp(-1.0, 1.0);
        self.z = self.z.clamp(-1.0, 1.0);
    }

    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    /// Isochronic rate actually used by the synthesizer: zero unless the
    /// gate is enabled and the configured rate is meaningfully above zero.
    pub fn effective_iso_frequency(&self) -> f32 {
        if self.iso_enabled && self.iso_frequency > AMP_EPSILON {
            self.iso_frequency
        } else {
            0.0
        }
    }

    /// Whether this channel contributes anything to the mix.
    pub fn is_audible(&self) -> bool {
        self.active && self.amplitude > AMP_EPSILON
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.id);
    }
}

fn default_displayed() -> usize {
    MAX_CHANNELS
}

fn default_duration() -> f64 {
    60.0
}

/// One automation keyframe: volume percent at an absolute session time.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct KeyframeData {
    #[serde(alias = "time_seconds")]
    pub time: f64,
    #[serde(alias = "volume_percent")]
    pub volume: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChannelAutomationData {
    #[serde(alias = "channel_id")]
    pub channel: usize,
    #[serde(default)]
    pub keyframes: Vec<KeyframeData>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionSettings {
    #[serde(default = "default_displayed", alias = "displayed_channels")]
    pub displayed_channels: usize,
    #[serde(default = "default_duration", alias = "recording_duration")]
    pub render_duration: f64,
    #[serde(default, alias = "volume_keyframes")]
    pub automation: Vec<ChannelAutomationData>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            displayed_channels: MAX_CHANNELS,
            render_duration: default_duration(),
            automation: Vec::new(),
        }
    }
}

/// On-disk session: what the front end saves and what the CLI loads.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionData {
    #[serde(default, alias = "app_settings")]
    pub settings: SessionSettings,
    pub channels: Vec<ChannelState>,
}
