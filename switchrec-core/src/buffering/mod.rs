//! Lock-free SPSC ring buffer for PCM samples.
//!
//! Backed by `ringbuf::HeapRb`, whose producer `push_slice` is wait-free and
//! allocation-free, so the writer half is safe to hand to the real-time audio
//! callback. The reader half stays with the drain worker (or the recorder
//! while idle) and exposes the unread data as at most two borrowed spans so
//! the worker can write them straight to disk without an intermediate copy.

pub mod sample;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

use crate::error::{RecorderError, Result};

pub use sample::PcmSample;

/// Largest ring the recorder will allocate (64 Mi samples).
pub const MAX_RING_CAPACITY: usize = 1 << 26;

/// Producer half, held by the audio callback thread.
pub struct SampleWriter<S: PcmSample> {
    inner: ringbuf::HeapProd<S>,
}

/// Consumer half, held by the drain worker thread.
pub struct SampleReader<S: PcmSample> {
    inner: ringbuf::HeapCons<S>,
}

/// Create a matched writer/reader pair over `capacity` elements.
///
/// # Errors
/// `RecorderError::Configuration` unless `capacity` is a non-zero power of
/// two no larger than [`MAX_RING_CAPACITY`].
pub fn sample_ring<S: PcmSample>(capacity: usize) -> Result<(SampleWriter<S>, SampleReader<S>)> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(RecorderError::Configuration(format!(
            "ring capacity must be a non-zero power of two, got {capacity}"
        )));
    }
    if capacity > MAX_RING_CAPACITY {
        return Err(RecorderError::Configuration(format!(
            "ring capacity {capacity} exceeds {MAX_RING_CAPACITY} samples"
        )));
    }
    let (prod, cons) = HeapRb::<S>::new(capacity).split();
    Ok((SampleWriter { inner: prod }, SampleReader { inner: cons }))
}

/// Smallest power-of-two element count holding `duration_ms` of audio.
///
/// Saturates at `usize::MAX` where the count does not fit; callers compare
/// the result against [`MAX_RING_CAPACITY`].
pub fn capacity_for_duration(sample_rate: u32, channels: u16, duration_ms: u32) -> usize {
    let samples = u64::from(sample_rate) * u64::from(channels) * u64::from(duration_ms) / 1000;
    usize::try_from(samples.max(1).next_power_of_two()).unwrap_or(usize::MAX)
}

impl<S: PcmSample> SampleWriter<S> {
    /// Copy as many of `samples` as fit. Never blocks, never allocates.
    ///
    /// Returns the number accepted; the remainder is dropped by the caller.
    pub fn write(&mut self, samples: &[S]) -> usize {
        self.inner.push_slice(samples)
    }

    pub fn available_to_write(&self) -> usize {
        self.inner.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }
}

impl<S: PcmSample> SampleReader<S> {
    /// Unread data in order: the tail of the backing storage, then the
    /// wrapped-around head. Either span may be empty.
    pub fn read_regions(&self) -> (&[S], &[S]) {
        self.inner.as_slices()
    }

    /// Release `count` elements back to the producer.
    ///
    /// Call only after the spans from [`read_regions`](Self::read_regions)
    /// have been handed to the file layer.
    pub fn advance_read(&mut self, count: usize) {
        let skipped = self.inner.skip(count);
        debug_assert_eq!(skipped, count, "advanced past the unread data");
    }

    pub fn available_to_read(&self) -> usize {
        self.inner.occupied_len()
    }

    pub fn available_to_write(&self) -> usize {
        self.inner.vacant_len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    /// Discard everything unread. Only valid while the stream is stopped.
    pub fn flush(&mut self) {
        self.inner.clear();
    }
}
