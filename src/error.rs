use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for the fallible edges of the engine.
///
/// Synthesis and mixing are total functions and never produce errors; only
/// start/stop/open/write boundaries surface them.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("audio device error: {0}")]
    Device(String),
    #[error("failed to write rendered audio: {0}")]
    SinkWrite(String),
    /// A worker thread did not acknowledge shutdown within the timeout.
    /// Non-fatal: the engine is back in Idle, the thread is detached.
    #[error("worker thread did not stop within {0:?}")]
    JoinTimeout(Duration),
}

impl From<hound::Error> for EngineError {
    fn from(e: hound::Error) -> Self {
        EngineError::SinkWrite(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::SinkWrite(e.to_string())
    }
}
