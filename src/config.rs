use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::EngineError;
use crate::models::MAX_FREQ;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Device block length in seconds for live playback.
    #[serde(default = "default_block_duration")]
    pub block_duration: f64,
    /// Block length in seconds for the paced offline render loop.
    #[serde(default = "default_render_block_duration")]
    pub render_block_duration: f64,
    #[serde(default = "default_max_frequency")]
    pub max_frequency: f32,
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: f64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_block_duration() -> f64 {
    0.05
}

fn default_render_block_duration() -> f64 {
    0.1
}

fn default_max_frequency() -> f32 {
    MAX_FREQ
}

fn default_join_timeout() -> f64 {
    2.0
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            sample_rate: default_sample_rate(),
            block_duration: default_block_duration(),
            render_block_duration: default_render_block_duration(),
            max_frequency: default_max_frequency(),
            join_timeout_secs: default_join_timeout(),
        }
    }
}

impl BackendConfig {
    /// Frames per live playback block at the configured sample rate.
    pub fn block_frames(&self) -> usize {
        ((self.sample_rate as f64 * self.block_duration) as usize).max(1)
    }

    /// Frames per offline render block at the configured sample rate.
    pub fn render_block_frames(&self) -> usize {
        ((self.sample_rate as f64 * self.render_block_duration) as usize).max(1)
    }

    pub fn join_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.join_timeout_secs.max(0.0))
    }

    /// Write the default configuration as TOML, for `generate-config`.
    pub fn generate_default(path: &str) -> Result<(), EngineError> {
        let text = toml::to_string_pretty(&BackendConfig::default())
            .map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

pub static CONFIG: Lazy<BackendConfig> = Lazy::new(|| {
    let path = PathBuf::from("config.toml");
    if let Ok(txt) = std::fs::read_to_string(&path) {
        toml::from_str(&txt).unwrap_or_default()
    } else {
        BackendConfig::default()
    }
});
