use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// All errors produced by switchrec-core.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("could not start capture: {0}")]
    CaptureStart(String),

    #[error("capture I/O error: {0}")]
    CaptureIo(#[from] std::io::Error),

    #[error("audio stream did not stop cleanly ({reason}); {path:?} was finalized anyway")]
    CaptureStop { reason: String, path: PathBuf },

    #[error("drain worker did not acknowledge stop within {timeout:?}")]
    DrainStalled { timeout: Duration },

    #[error("invalid WAV header: {0}")]
    InvalidHeader(String),

    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("no recording session is active")]
    NotRecording,

    #[error("ring buffer is unavailable after a stalled drain worker")]
    RingUnavailable,
}

pub type Result<T> = std::result::Result<T, RecorderError>;

/// Failure reported by an [`AudioStream`](crate::audio::AudioStream) implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StreamError(pub String);

impl StreamError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
