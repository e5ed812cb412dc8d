//! Drain worker: moves buffered samples from the ring to the output sink.
//!
//! ## Loop (per iteration)
//!
//! ```text
//! 1. occupancy >= threshold, or stop requested?  → write both read regions
//! 2. stop requested?                             → final pass done, terminate
//! 3. wait up to poll_interval for the stop signal
//! ```
//!
//! The controller sends one message on the stop channel; the worker answers
//! on the outcome channel exactly once, handing back the sink and the ring
//! reader. Only the worker moves itself from `Stopping` to terminated.

use std::io::{self, Write};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error};

use crate::{
    buffering::{PcmSample, SampleReader},
    error::{RecorderError, Result},
};

#[derive(Debug, Clone, Copy)]
pub struct DrainSettings {
    /// Occupancy (samples) that triggers a write.
    pub threshold: usize,
    pub poll_interval: Duration,
    /// Interleaved channel count, for converting samples to frames.
    pub channels: u16,
}

#[derive(Debug, Default)]
pub struct DrainDiagnostics {
    passes: AtomicU64,
    samples_drained: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSnapshot {
    pub passes: u64,
    pub samples_drained: u64,
}

impl DrainDiagnostics {
    pub fn reset(&self) {
        self.passes.store(0, Ordering::Relaxed);
        self.samples_drained.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DrainSnapshot {
        DrainSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            samples_drained: self.samples_drained.load(Ordering::Relaxed),
        }
    }
}

/// Everything the worker hands back when it terminates.
pub struct DrainOutcome<S: PcmSample, W> {
    pub reader: SampleReader<S>,
    pub sink: W,
    /// Whole frames written to the sink by this worker.
    pub frames_written: u64,
    /// Set when a write failed; the worker stopped at that point.
    pub error: Option<io::Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainState {
    Draining,
    Stopping,
}

/// Controller-side handle to a running drain worker.
pub struct DrainHandle<S: PcmSample, W> {
    stop_tx: Sender<()>,
    outcome_rx: Receiver<DrainOutcome<S, W>>,
    thread: JoinHandle<()>,
}

/// Spawn a worker draining `reader` into `sink`.
///
/// # Errors
/// `RecorderError::CaptureStart` if the OS refuses to spawn the thread. The
/// reader and sink are lost in that case; callers treat it as fatal.
pub fn spawn<S, W>(
    reader: SampleReader<S>,
    sink: W,
    settings: DrainSettings,
    diagnostics: Arc<DrainDiagnostics>,
) -> Result<DrainHandle<S, W>>
where
    S: PcmSample,
    W: Write + Send + 'static,
{
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let (outcome_tx, outcome_rx) = bounded::<DrainOutcome<S, W>>(1);

    let thread = thread::Builder::new()
        .name("switchrec-drain".into())
        .spawn(move || {
            let outcome = run(reader, sink, settings, &stop_rx, &diagnostics);
            // The controller may have given up waiting; nothing left to do then.
            let _ = outcome_tx.send(outcome);
        })
        .map_err(|e| RecorderError::CaptureStart(format!("drain worker: {e}")))?;

    Ok(DrainHandle {
        stop_tx,
        outcome_rx,
        thread,
    })
}

impl<S: PcmSample, W> DrainHandle<S, W> {
    /// Ask the worker for a final pass and wait for it to hand everything back.
    ///
    /// # Errors
    /// `RecorderError::DrainStalled` if no acknowledgement arrives within
    /// `timeout`. The worker thread is detached in that case.
    pub fn stop(self, timeout: Duration) -> Result<DrainOutcome<S, W>> {
        // Fails only if the worker already exited; its outcome is queued.
        let _ = self.stop_tx.try_send(());

        match self.outcome_rx.recv_timeout(timeout) {
            Ok(outcome) => {
                if self.thread.join().is_err() {
                    error!("drain worker panicked after acknowledging stop");
                }
                Ok(outcome)
            }
            Err(RecvTimeoutError::Timeout) => {
                error!(?timeout, "drain worker did not acknowledge stop");
                Err(RecorderError::DrainStalled { timeout })
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Outcome sender dropped without a message: the worker panicked.
                let _ = self.thread.join();
                Err(RecorderError::CaptureIo(io::Error::other(
                    "drain worker died unexpectedly",
                )))
            }
        }
    }

    /// The worker's outcome if it has terminated on its own (write failure).
    ///
    /// Returns the handle back while the worker is still draining.
    pub fn try_finish(self) -> std::result::Result<DrainOutcome<S, W>, Self> {
        match self.outcome_rx.try_recv() {
            Ok(outcome) => {
                let _ = self.thread.join();
                Ok(outcome)
            }
            Err(_) => Err(self),
        }
    }
}

fn run<S: PcmSample, W: Write>(
    mut reader: SampleReader<S>,
    mut sink: W,
    settings: DrainSettings,
    stop_rx: &Receiver<()>,
    diagnostics: &DrainDiagnostics,
) -> DrainOutcome<S, W> {
    let channels = u64::from(settings.channels.max(1));
    let mut scratch: Vec<u8> = Vec::new();
    let mut samples_written = 0u64;
    let mut state = DrainState::Draining;

    debug!(threshold = settings.threshold, "drain worker started");

    let error = loop {
        if state == DrainState::Draining && stop_pending(stop_rx) {
            state = DrainState::Stopping;
        }

        if reader.available_to_read() >= settings.threshold || state == DrainState::Stopping {
            let (n, result) = drain_once(&mut reader, &mut sink, &mut scratch);
            samples_written += n as u64;
            diagnostics.passes.fetch_add(1, Ordering::Relaxed);
            diagnostics
                .samples_drained
                .fetch_add(n as u64, Ordering::Relaxed);
            if let Err(e) = result {
                error!(written = samples_written, "drain write failed: {e}");
                break Some(e);
            }
        }

        if state == DrainState::Stopping {
            break sink.flush().err();
        }

        match stop_rx.recv_timeout(settings.poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => state = DrainState::Stopping,
            Err(RecvTimeoutError::Timeout) => {}
        }
    };

    debug!(samples = samples_written, "drain worker terminated");

    DrainOutcome {
        reader,
        sink,
        frames_written: samples_written / channels,
        error,
    }
}

fn stop_pending(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

/// Write every unread sample to `sink`, releasing each span from the ring
/// once it is fully written.
///
/// Returns the samples released. On error, the spans written before the
/// failure stay released and counted; the failing span stays unread.
fn drain_once<S: PcmSample, W: Write>(
    reader: &mut SampleReader<S>,
    sink: &mut W,
    scratch: &mut Vec<u8>,
) -> (usize, io::Result<()>) {
    let mut released = 0;

    // At most two spans: the tail of the storage, then the wrapped head.
    for _ in 0..2 {
        let (span, _) = reader.read_regions();
        if span.is_empty() {
            break;
        }
        let len = span.len();
        scratch.clear();
        S::extend_le_bytes(span, scratch);
        // A short write surfaces here as `WriteZero`.
        if let Err(e) = sink.write_all(scratch) {
            return (released, Err(e));
        }
        reader.advance_read(len);
        released += len;
    }

    if released > 0 {
        debug!(samples = released, "drained");
    }
    (released, Ok(()))
}
