//! # switchrec-core
//!
//! Real-time capture core of a switch-operated WAV recorder.
//!
//! ## Architecture
//!
//! ```text
//! audio callback → CaptureProducer → SPSC ring → drain worker → <prefix>_<timestamp>.wav
//!                                                      ▲
//!          switch edge → Recorder (Idle ⇄ Recording) ──┘  header written, then patched
//! ```
//!
//! The audio callback is zero-alloc and lock-free. All file I/O happens on
//! the drain worker or the controlling thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod wav;

// Convenience re-exports for downstream crates
pub use audio::{AudioStream, CaptureCounters, CaptureProducer};
pub use buffering::{sample_ring, PcmSample, SampleReader, SampleWriter};
pub use config::RecorderConfig;
pub use engine::{Recorder, RecordingSink};
pub use error::{RecorderError, StreamError};
pub use events::{RecordTransition, RecorderStatus, SessionSummary};
pub use wav::{PcmFormat, WavHeader};

#[cfg(feature = "audio-cpal")]
pub use audio::CpalInputStream;
