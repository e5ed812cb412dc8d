//! `Recorder`: recording-session state machine.
//!
//! ## Lifecycle
//!
//! ```text
//! Recorder::new()        → ring allocated, stream opened (paused), Idle
//!     └─► start()        → file + header, ring flushed, drain worker, stream on → Recording
//!         └─► stop()     → stream off, final drain, header patched, file closed → Idle
//! ```
//!
//! Calling `start()`/`stop()` in the wrong state returns
//! `AlreadyRecording`/`NotRecording` and touches nothing on disk.
//!
//! ## Threading
//!
//! The recorder lives on the control thread. While Idle it owns the ring
//! reader; while Recording the reader and the open sink belong to the drain
//! worker, which hands both back when it acknowledges stop.
//!
//! Sinks default to `File`s created by [`output::create_recording_file`];
//! [`Recorder::with_sink`] accepts any other [`RecordingSink`] opener.

pub mod drain;
pub mod output;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::{
    audio::{AudioStream, CaptureCounters, CaptureProducer, CaptureSnapshot},
    buffering::{sample_ring, PcmSample, SampleReader},
    config::RecorderConfig,
    error::{RecorderError, Result, StreamError},
    events::{RecordTransition, RecorderStatus, SessionSummary},
    wav::{PcmFormat, WavHeader, HEADER_LEN},
};

use drain::{DrainDiagnostics, DrainHandle, DrainOutcome, DrainSettings, DrainSnapshot};
pub use output::RecordingSink;

/// Creates the sink for a new session in `(output_dir, file_prefix)`.
type SinkOpener<W> = Box<dyn FnMut(&Path, &str) -> io::Result<(PathBuf, W)>>;

struct ActiveSession<S: PcmSample, W: RecordingSink> {
    path: PathBuf,
    header: WavHeader,
    drain: DrainHandle<S, W>,
    started_at: Instant,
}

/// Owns the stream, the ring reader and at most one active session.
pub struct Recorder<A: AudioStream, S: PcmSample, W: RecordingSink = File> {
    config: RecorderConfig,
    format: PcmFormat,
    stream: A,
    open_sink: SinkOpener<W>,
    /// `None` while a drain worker holds it, or after a worker stalled.
    reader: Option<SampleReader<S>>,
    counters: Arc<CaptureCounters>,
    diagnostics: Arc<DrainDiagnostics>,
    session: Option<ActiveSession<S, W>>,
}

impl<A: AudioStream, S: PcmSample> Recorder<A, S> {
    /// Validate `config`, allocate the ring, and let `open_stream` wire the
    /// producer half into an audio stream. Recordings go to timestamped
    /// files under `config.output_dir`.
    ///
    /// # Errors
    /// `RecorderError::Configuration` for an invalid config; whatever
    /// `open_stream` returns otherwise.
    pub fn new<F>(config: RecorderConfig, open_stream: F) -> Result<Self>
    where
        F: FnOnce(CaptureProducer<S>) -> Result<A>,
    {
        Self::with_sink(config, open_stream, output::create_recording_file)
    }
}

impl<A: AudioStream, S: PcmSample, W: RecordingSink> Recorder<A, S, W> {
    /// Like [`Recorder::new`], with sessions recorded into whatever
    /// `open_sink` returns for `(output_dir, file_prefix)`.
    pub fn with_sink<F, O>(config: RecorderConfig, open_stream: F, open_sink: O) -> Result<Self>
    where
        F: FnOnce(CaptureProducer<S>) -> Result<A>,
        O: FnMut(&Path, &str) -> io::Result<(PathBuf, W)> + 'static,
    {
        config.validate::<S>()?;

        let (writer, reader) = sample_ring::<S>(config.ring_capacity())?;
        let counters = Arc::new(CaptureCounters::default());
        let producer = CaptureProducer::new(writer, Arc::clone(&counters), config.channels);
        let stream = open_stream(producer)?;

        info!(
            capacity = reader.capacity(),
            drain_threshold = config.drain_threshold(),
            sample_rate = config.sample_rate,
            channels = config.channels,
            bits = config.bits_per_sample,
            "recorder ready"
        );

        Ok(Self {
            format: config.pcm_format(),
            config,
            stream,
            open_sink: Box::new(open_sink),
            reader: Some(reader),
            counters,
            diagnostics: Arc::new(DrainDiagnostics::default()),
            session: None,
        })
    }

    /// Idle → Recording.
    ///
    /// # Errors
    /// - `RecorderError::AlreadyRecording` if a session is active.
    /// - `RecorderError::CaptureStart` if the file or the stream could not be
    ///   opened; the recorder stays Idle and the empty file is removed.
    pub fn start(&mut self) -> Result<PathBuf> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        let mut reader = self.reader.take().ok_or(RecorderError::RingUnavailable)?;

        let (path, mut file) =
            match (self.open_sink)(&self.config.output_dir, &self.config.file_prefix) {
                Ok(created) => created,
                Err(e) => {
                    self.reader = Some(reader);
                    return Err(RecorderError::CaptureStart(format!(
                        "create recording in {:?}: {e}",
                        self.config.output_dir
                    )));
                }
            };

        let header = WavHeader::new(self.format);
        if let Err(e) = file.write_all(&header.to_bytes()) {
            drop(file);
            output::discard(&path);
            self.reader = Some(reader);
            return Err(RecorderError::CaptureStart(format!(
                "write header to {path:?}: {e}"
            )));
        }

        reader.flush();
        self.counters.reset();
        self.diagnostics.reset();

        let settings = DrainSettings {
            threshold: self.config.drain_threshold(),
            poll_interval: self.config.drain_poll_interval(),
            channels: self.config.channels,
        };
        let drain = match drain::spawn(reader, file, settings, Arc::clone(&self.diagnostics)) {
            Ok(handle) => handle,
            Err(e) => {
                output::discard(&path);
                return Err(e);
            }
        };

        if let Err(e) = self.stream.start() {
            // The stream may have half-started.
            if let Err(stop_err) = self.stream.stop() {
                warn!("audio stream stop after failed start: {stop_err}");
            }
            match drain.stop(self.config.stop_timeout()) {
                Ok(outcome) => self.reader = Some(outcome.reader),
                Err(stall) => error!("drain worker lost while aborting start: {stall}"),
            }
            output::discard(&path);
            return Err(RecorderError::CaptureStart(format!("audio stream: {e}")));
        }

        info!(path = ?path, "recording started");
        self.session = Some(ActiveSession {
            path: path.clone(),
            header,
            drain,
            started_at: Instant::now(),
        });
        Ok(path)
    }

    /// Recording → Idle.
    ///
    /// # Errors
    /// - `RecorderError::NotRecording` if no session is active.
    /// - `RecorderError::DrainStalled` if the worker never acknowledged; the
    ///   file cannot be finalized and the ring is gone for good.
    /// - `RecorderError::CaptureIo` if the worker or the header patch failed.
    /// - `RecorderError::CaptureStop` if the stream did not stop cleanly; the
    ///   file is finalized regardless.
    pub fn stop(&mut self) -> Result<SessionSummary> {
        let session = self.session.take().ok_or(RecorderError::NotRecording)?;
        let stream_result = self.stream.stop();
        if let Err(e) = &stream_result {
            warn!("audio stream stop failed: {e}");
        }

        let outcome = session.drain.stop(self.config.stop_timeout())?;
        self.finish(session.path, session.header, session.started_at, outcome, stream_result)
    }

    /// Check on the drain worker while recording.
    ///
    /// If it terminated on its own (a failed write) the session is aborted
    /// and finalized with the frames that reached disk.
    ///
    /// # Errors
    /// `RecorderError::CaptureIo` carrying the worker's write error.
    pub fn service(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        match session.drain.try_finish() {
            Err(drain) => {
                self.session = Some(ActiveSession { drain, ..session });
                Ok(())
            }
            Ok(outcome) => {
                error!(path = ?session.path, "drain worker terminated mid-session, aborting");
                let stream_result = self.stream.stop();
                self.finish(session.path, session.header, session.started_at, outcome, stream_result)
                    .map(|_| ())
            }
        }
    }

    /// Switch-edge entry point: pressed starts a session, released stops it.
    pub fn on_record_switch_edge(&mut self, pressed: bool) -> Result<RecordTransition> {
        if pressed {
            self.start().map(RecordTransition::Started)
        } else {
            self.stop().map(RecordTransition::Stopped)
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn status(&self) -> RecorderStatus {
        if self.is_recording() {
            RecorderStatus::Recording
        } else {
            RecorderStatus::Idle
        }
    }

    /// Output path of the active session.
    pub fn current_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn capture_snapshot(&self) -> CaptureSnapshot {
        self.counters.snapshot()
    }

    pub fn drain_snapshot(&self) -> DrainSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn finish(
        &mut self,
        path: PathBuf,
        header: WavHeader,
        started_at: Instant,
        outcome: DrainOutcome<S, W>,
        stream_result: std::result::Result<(), StreamError>,
    ) -> Result<SessionSummary> {
        let DrainOutcome {
            reader,
            sink: mut file,
            frames_written,
            error: drain_error,
        } = outcome;
        self.reader = Some(reader);

        let capture = self.counters.snapshot();
        let frames = if drain_error.is_none() && frames_written == capture.frames_accepted {
            capture.frames_accepted
        } else {
            if drain_error.is_none() {
                warn!(
                    accepted = capture.frames_accepted,
                    written = frames_written,
                    "producer delivered after the final drain; header follows the file"
                );
            }
            frames_written
        };

        let header = header.finalized(frames);
        let mut patched = Ok(());
        if drain_error.is_some() {
            // Drop any partial span so the file ends where the header says.
            let on_disk =
                HEADER_LEN as u64 + frames.saturating_mul(u64::from(self.format.block_align()));
            patched = file.truncate(on_disk);
        }
        let patched = patched.and_then(|()| output::patch_header(&mut file, &header));
        drop(file);

        if capture.samples_dropped > 0 {
            warn!(
                dropped = capture.samples_dropped,
                "ring buffer overrun during session"
            );
        }

        let summary = SessionSummary {
            path,
            frames,
            data_bytes: header.data_size,
            duration_secs: frames as f64 / f64::from(self.format.sample_rate),
            samples_dropped: capture.samples_dropped,
        };

        if let Some(e) = drain_error {
            return Err(RecorderError::CaptureIo(e));
        }
        patched?;
        if let Err(e) = stream_result {
            return Err(RecorderError::CaptureStop {
                reason: e.to_string(),
                path: summary.path,
            });
        }

        info!(
            path = ?summary.path,
            frames = summary.frames,
            bytes = summary.data_bytes,
            secs = summary.duration_secs,
            wall_secs = started_at.elapsed().as_secs_f64(),
            "recording finalized"
        );
        Ok(summary)
    }
}

impl<A: AudioStream, S: PcmSample, W: RecordingSink> Drop for Recorder<A, S, W> {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.stop() {
                error!("finalizing recording on shutdown failed: {e}");
            }
        }
    }
}
