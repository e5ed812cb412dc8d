//! Capture side of the pipeline: the producer the audio callback drives, and
//! the stream abstraction the recorder starts and stops.
//!
//! # Design constraints
//!
//! The audio callback runs on an OS audio thread at elevated priority. It
//! **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O, including logging
//!
//! [`CaptureProducer::on_block`] satisfies that contract: it only touches the
//! wait-free ring writer and a few relaxed atomics.

#[cfg(feature = "audio-cpal")]
pub mod cpal_stream;

#[cfg(feature = "audio-cpal")]
pub use cpal_stream::CpalInputStream;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{
    buffering::{PcmSample, SampleWriter},
    error::StreamError,
};

/// An audio input stream whose device and callback are already resolved.
///
/// The stream owns a [`CaptureProducer`] and invokes it once per block
/// while started.
pub trait AudioStream {
    /// Begin delivering blocks to the producer.
    fn start(&mut self) -> Result<(), StreamError>;

    /// Stop delivering blocks. After this returns the producer is not
    /// invoked again until the next `start`.
    fn stop(&mut self) -> Result<(), StreamError>;
}

/// Counters shared between the producer and the recorder.
#[derive(Debug, Default)]
pub struct CaptureCounters {
    frames_accepted: AtomicU64,
    samples_dropped: AtomicU64,
    blocks: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSnapshot {
    pub frames_accepted: u64,
    pub samples_dropped: u64,
    pub blocks: u64,
}

impl CaptureCounters {
    pub fn reset(&self) {
        self.frames_accepted.store(0, Ordering::Release);
        self.samples_dropped.store(0, Ordering::Relaxed);
        self.blocks.store(0, Ordering::Relaxed);
    }

    /// Frames the ring accepted since the last reset.
    pub fn frames_accepted(&self) -> u64 {
        self.frames_accepted.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            frames_accepted: self.frames_accepted(),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            blocks: self.blocks.load(Ordering::Relaxed),
        }
    }
}

/// Real-time half of the pipeline: copies each delivered block into the ring.
pub struct CaptureProducer<S: PcmSample> {
    writer: SampleWriter<S>,
    counters: Arc<CaptureCounters>,
    channels: usize,
}

impl<S: PcmSample> CaptureProducer<S> {
    pub fn new(writer: SampleWriter<S>, counters: Arc<CaptureCounters>, channels: u16) -> Self {
        Self {
            writer,
            counters,
            channels: usize::from(channels.max(1)),
        }
    }

    /// Handle one block of interleaved samples.
    ///
    /// Writes as many whole frames as the ring has room for and drops the
    /// rest. Returns the number of frames accepted.
    pub fn on_block(&mut self, input: &[S]) -> usize {
        self.counters.blocks.fetch_add(1, Ordering::Relaxed);

        let writable_frames = self.writer.available_to_write() / self.channels;
        let offered_frames = input.len() / self.channels;
        let frames = offered_frames.min(writable_frames);
        let samples = frames * self.channels;

        let written = self.writer.write(&input[..samples]);
        debug_assert_eq!(written, samples, "sole producer saw less room than reported");
        let accepted_frames = written / self.channels;

        let dropped = input.len() - accepted_frames * self.channels;
        if dropped > 0 {
            self.counters
                .samples_dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        self.counters
            .frames_accepted
            .fetch_add(accepted_frames as u64, Ordering::Release);
        accepted_frames
    }
}
