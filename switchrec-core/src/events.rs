//! Values the recorder reports back to the control loop.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    Idle,
    Recording,
}

/// Produced when a session is finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub path: PathBuf,
    /// Frames described by the finalized header.
    pub frames: u64,
    /// Value of the header's data size field.
    pub data_bytes: u32,
    pub duration_secs: f64,
    /// Samples the producer had to drop because the ring was full.
    pub samples_dropped: u64,
}

/// What a record-switch edge did.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordTransition {
    Started(PathBuf),
    Stopped(SessionSummary),
}
