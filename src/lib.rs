pub mod audio_io;
pub mod automation;
pub mod config;
pub mod dsp;
pub mod error;
pub mod events;
pub mod mixer;
pub mod models;
pub mod params;
pub mod realtime;
pub mod render;
pub mod synth;

pub use automation::{AutomationBank, AutomationTrack};
pub use error::EngineError;
pub use events::{event_channel, EngineEvent, EventReceiver, EventSender};
pub use mixer::BlockMixer;
pub use models::{ChannelState, Position, SessionData, MAX_CHANNELS};
pub use params::ParameterStore;
pub use realtime::RealtimeEngine;
pub use render::{OfflineRenderEngine, RenderSink, RenderState, WavFileSink};
