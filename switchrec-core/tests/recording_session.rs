use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use switchrec_core::{
    engine::output::create_recording_file, AudioStream, CaptureProducer, PcmSample,
    RecordTransition, Recorder, RecorderConfig, RecorderError, RecorderStatus, RecordingSink,
    StreamError, WavHeader,
};

/// Stand-in for the audio subsystem: the test thread delivers blocks by hand.
struct FeedState<S: PcmSample> {
    producer: CaptureProducer<S>,
    running: bool,
    fail_start: bool,
    fail_stop: bool,
}

struct Feed<S: PcmSample>(Arc<Mutex<FeedState<S>>>);

impl<S: PcmSample> Clone for Feed<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S: PcmSample> Feed<S> {
    /// Deliver one block as the audio callback would. Ignored while stopped.
    fn deliver(&self, block: &[S]) -> usize {
        let mut state = self.0.lock();
        if !state.running {
            return 0;
        }
        state.producer.on_block(block)
    }

    fn fail_start(&self, fail: bool) {
        self.0.lock().fail_start = fail;
    }

    fn fail_stop(&self, fail: bool) {
        self.0.lock().fail_stop = fail;
    }
}

struct ManualStream<S: PcmSample>(Feed<S>);

impl<S: PcmSample> AudioStream for ManualStream<S> {
    fn start(&mut self) -> Result<(), StreamError> {
        let mut state = self.0 .0.lock();
        if state.fail_start {
            return Err(StreamError::new("device unplugged"));
        }
        state.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), StreamError> {
        let mut state = self.0 .0.lock();
        state.running = false;
        if state.fail_stop {
            return Err(StreamError::new("stop timed out"));
        }
        Ok(())
    }
}

fn manual_stream<S: PcmSample>(
    producer: CaptureProducer<S>,
    slot: &mut Option<Feed<S>>,
) -> ManualStream<S> {
    let feed = Feed(Arc::new(Mutex::new(FeedState {
        producer,
        running: false,
        fail_start: false,
        fail_stop: false,
    })));
    *slot = Some(feed.clone());
    ManualStream(feed)
}

fn recorder<S: PcmSample>(config: RecorderConfig) -> (Recorder<ManualStream<S>, S>, Feed<S>) {
    let mut feed = None;
    let rec = Recorder::new(config, |producer| Ok(manual_stream(producer, &mut feed)))
        .expect("valid config");
    (rec, feed.expect("stream opened"))
}

fn recorder_with_sink<S, W, O>(
    config: RecorderConfig,
    open_sink: O,
) -> (Recorder<ManualStream<S>, S, W>, Feed<S>)
where
    S: PcmSample,
    W: RecordingSink,
    O: FnMut(&Path, &str) -> io::Result<(PathBuf, W)> + 'static,
{
    let mut feed = None;
    let rec = Recorder::with_sink(
        config,
        |producer| Ok(manual_stream(producer, &mut feed)),
        open_sink,
    )
    .expect("valid config");
    (rec, feed.expect("stream opened"))
}

/// A card that fills up: bytes past `limit` are refused.
struct FullCard {
    file: File,
    pos: u64,
    limit: u64,
}

impl Write for FullCard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.pos >= self.limit {
            return Err(io::Error::other("no space left on device"));
        }
        let room = (self.limit - self.pos) as usize;
        let n = self.file.write(&buf[..buf.len().min(room)])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FullCard {
    fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
        self.pos = self.file.seek(to)?;
        Ok(self.pos)
    }
}

impl RecordingSink for FullCard {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn commit(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// A card whose writes hang while `hung` is set.
struct HungCard {
    file: File,
    hung: Arc<AtomicBool>,
}

impl Write for HungCard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        while self.hung.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for HungCard {
    fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
        self.file.seek(to)
    }
}

impl RecordingSink for HungCard {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn commit(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

fn config_in(dir: &Path) -> RecorderConfig {
    RecorderConfig {
        output_dir: dir.to_path_buf(),
        drain_poll_interval_ms: 2,
        ..RecorderConfig::default()
    }
}

fn read_header(path: &Path) -> WavHeader {
    let bytes = fs::read(path).unwrap();
    WavHeader::parse(&bytes).unwrap()
}

fn wav_files(dir: &Path) -> Vec<std::path::PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("wav"))
        .collect()
}

#[test]
fn ten_blocks_of_512_mono_samples() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, feed) = recorder::<i16>(config_in(dir.path()));

    let path = rec.start().unwrap();
    assert_eq!(rec.status(), RecorderStatus::Recording);
    assert_eq!(rec.current_path(), Some(path.as_path()));

    let mut sent = Vec::new();
    for b in 0..10 {
        let block: Vec<i16> = (0..512).map(|i| (b * 512 + i) as i16).collect();
        assert_eq!(feed.deliver(&block), 512);
        sent.extend_from_slice(&block);
    }

    let summary = rec.stop().unwrap();
    assert_eq!(rec.status(), RecorderStatus::Idle);
    assert_eq!(summary.path, path);
    assert_eq!(summary.frames, 5120);
    assert_eq!(summary.data_bytes, 10_240);
    assert_eq!(summary.samples_dropped, 0);

    assert_eq!(fs::metadata(&path).unwrap().len(), 10_284);
    let header = read_header(&path);
    assert_eq!(header.data_size, 10_240);
    assert_eq!(header.riff_size, 10_276);

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(decoded, sent);
}

#[test]
fn overrun_counts_only_accepted_frames() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecorderConfig {
        ring_capacity: Some(1024),
        ..config_in(dir.path())
    };
    let (mut rec, feed) = recorder::<i16>(config);

    rec.start().unwrap();
    assert_eq!(feed.deliver(&[42; 2000]), 1024);

    let snap = rec.capture_snapshot();
    assert_eq!(snap.frames_accepted, 1024);
    assert_eq!(snap.samples_dropped, 976);

    let summary = rec.stop().unwrap();
    assert_eq!(summary.frames, 1024);
    assert_eq!(summary.samples_dropped, 976);
    assert_eq!(read_header(&summary.path).data_size, 2048);
    assert_eq!(fs::metadata(&summary.path).unwrap().len(), 44 + 2048);
}

#[test]
fn stop_during_active_draining_keeps_every_accepted_frame() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecorderConfig {
        ring_capacity: Some(4096),
        drain_poll_interval_ms: 1,
        ..config_in(dir.path())
    };
    let (mut rec, feed) = recorder::<i16>(config);
    rec.start().unwrap();

    let producer_feed = feed.clone();
    let producer = thread::spawn(move || {
        let block = [7i16; 512];
        let deadline = Instant::now() + Duration::from_secs(5);
        // Keep delivering until the stream is stopped underneath us.
        while Instant::now() < deadline {
            let accepted = producer_feed.deliver(&block);
            if accepted == 0 && !producer_feed.0.lock().running {
                break;
            }
            thread::sleep(Duration::from_micros(300));
        }
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while rec.drain_snapshot().passes < 2 {
        assert!(Instant::now() < deadline, "drain worker never ran");
        thread::sleep(Duration::from_millis(1));
    }

    let summary = rec.stop().unwrap();
    producer.join().unwrap();

    let accepted = rec.capture_snapshot().frames_accepted;
    assert_eq!(summary.frames, accepted);
    let header = read_header(&summary.path);
    assert_eq!(u64::from(header.data_size), accepted * 2);
    assert_eq!(
        fs::metadata(&summary.path).unwrap().len(),
        44 + u64::from(header.data_size)
    );
}

#[test]
fn second_stop_leaves_finalized_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, feed) = recorder::<i16>(config_in(dir.path()));

    rec.start().unwrap();
    feed.deliver(&[1; 300]);
    let summary = rec.stop().unwrap();
    let before = fs::read(&summary.path).unwrap();

    assert!(matches!(rec.stop(), Err(RecorderError::NotRecording)));
    assert_eq!(fs::read(&summary.path).unwrap(), before);
}

#[test]
fn second_start_is_rejected_and_session_survives() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, feed) = recorder::<i16>(config_in(dir.path()));

    let path = rec.start().unwrap();
    assert!(matches!(rec.start(), Err(RecorderError::AlreadyRecording)));
    assert_eq!(wav_files(dir.path()), vec![path.clone()]);

    feed.deliver(&[5; 100]);
    let summary = rec.stop().unwrap();
    assert_eq!(summary.frames, 100);
}

#[test]
fn stream_start_failure_leaves_recorder_idle_and_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, feed) = recorder::<i16>(config_in(dir.path()));

    feed.fail_start(true);
    assert!(matches!(rec.start(), Err(RecorderError::CaptureStart(_))));
    assert_eq!(rec.status(), RecorderStatus::Idle);
    assert!(wav_files(dir.path()).is_empty());

    feed.fail_start(false);
    rec.start().unwrap();
    feed.deliver(&[2; 64]);
    assert_eq!(rec.stop().unwrap().frames, 64);
}

#[test]
fn stream_stop_failure_still_finalizes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, feed) = recorder::<i16>(config_in(dir.path()));

    let started = rec.start().unwrap();
    feed.deliver(&[9; 1000]);
    feed.fail_stop(true);

    match rec.stop() {
        Err(RecorderError::CaptureStop { path, .. }) => assert_eq!(path, started),
        other => panic!("expected CaptureStop, got {other:?}"),
    }
    assert_eq!(rec.status(), RecorderStatus::Idle);
    assert_eq!(read_header(&started).data_size, 2000);
    assert_eq!(fs::metadata(&started).unwrap().len(), 2044);
}

#[test]
fn unusable_output_dir_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"x").unwrap();

    let (mut rec, _feed) = recorder::<i16>(config_in(&blocker.join("audio")));
    assert!(matches!(rec.start(), Err(RecorderError::CaptureStart(_))));
    assert!(!rec.is_recording());
}

#[test]
fn switch_edges_drive_start_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, feed) = recorder::<i16>(config_in(dir.path()));

    let started = match rec.on_record_switch_edge(true).unwrap() {
        RecordTransition::Started(path) => path,
        other => panic!("unexpected {other:?}"),
    };
    feed.deliver(&[3; 512]);
    match rec.on_record_switch_edge(false).unwrap() {
        RecordTransition::Stopped(summary) => {
            assert_eq!(summary.path, started);
            assert_eq!(summary.frames, 512);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn each_session_starts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let (mut rec, feed) = recorder::<i16>(config_in(dir.path()));

    rec.start().unwrap();
    feed.deliver(&[1; 2048]);
    let first = rec.stop().unwrap();

    // Blocks arriving between sessions are never recorded.
    assert_eq!(feed.deliver(&[8; 512]), 0);

    rec.start().unwrap();
    feed.deliver(&[2; 256]);
    let second = rec.stop().unwrap();

    assert_ne!(first.path, second.path);
    assert_eq!(first.frames, 2048);
    assert_eq!(second.frames, 256);
    let bytes = fs::read(&second.path).unwrap();
    assert_eq!(bytes.len(), 44 + 512);
    assert!(bytes[44..].chunks(2).all(|s| s == [2, 0]));
}

#[test]
fn stereo_32_bit_session_decodes() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecorderConfig {
        sample_rate: 48_000,
        channels: 2,
        bits_per_sample: 32,
        ..config_in(dir.path())
    };
    let (mut rec, feed) = recorder::<i32>(config);

    rec.start().unwrap();
    let block: Vec<i32> = (0..1024).map(|i| if i % 2 == 0 { i } else { -i }).collect();
    assert_eq!(feed.deliver(&block), 512);
    let summary = rec.stop().unwrap();
    assert_eq!(summary.data_bytes, 512 * 2 * 4);

    let mut reader = hound::WavReader::open(&summary.path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(spec.bits_per_sample, 32);
    let decoded: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
    assert_eq!(decoded, block);
}

#[test]
fn invalid_config_never_opens_a_stream() {
    let config = RecorderConfig {
        bits_per_sample: 24,
        ..RecorderConfig::default()
    };
    let mut opened = false;
    let result = Recorder::<ManualStream<i16>, i16>::new(config, |_producer| {
        opened = true;
        Err(RecorderError::CaptureStart("unreachable".into()))
    });
    assert!(matches!(result, Err(RecorderError::Configuration(_))));
    assert!(!opened);
}

#[test]
fn write_failure_aborts_session_and_keeps_what_reached_disk() {
    let dir = tempfile::tempdir().unwrap();
    // Room for the header, one full drain of 8192 samples, and part of the next.
    let limit = 44 + 16_384 + 1_000;
    let open_card = move |dir: &Path, prefix: &str| -> io::Result<(PathBuf, FullCard)> {
        let (path, file) = create_recording_file(dir, prefix)?;
        Ok((path, FullCard { file, pos: 0, limit }))
    };
    let (mut rec, feed) = recorder_with_sink::<i16, _, _>(config_in(dir.path()), open_card);

    let path = rec.start().unwrap();
    let first: Vec<i16> = (0..8192).map(|i| i as i16).collect();
    for block in first.chunks(512) {
        assert_eq!(feed.deliver(block), 512);
    }
    let deadline = Instant::now() + Duration::from_secs(5);
    while rec.drain_snapshot().samples_drained < 8192 {
        assert!(Instant::now() < deadline, "first drain never happened");
        thread::sleep(Duration::from_millis(1));
    }
    rec.service().unwrap();
    assert!(rec.is_recording());

    for _ in 0..16 {
        feed.deliver(&[-1; 512]);
    }
    let deadline = Instant::now() + Duration::from_secs(5);
    let err = loop {
        match rec.service() {
            Ok(()) => {
                assert!(Instant::now() < deadline, "write failure never surfaced");
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) => break e,
        }
    };
    assert!(matches!(err, RecorderError::CaptureIo(_)), "got {err:?}");
    assert_eq!(rec.status(), RecorderStatus::Idle);

    assert_eq!(read_header(&path).data_size, 16_384);
    assert_eq!(fs::metadata(&path).unwrap().len(), 44 + 16_384);
    let mut reader = hound::WavReader::open(&path).unwrap();
    let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(decoded, first);

    // The next session gets a fresh card and records normally.
    rec.start().unwrap();
    feed.deliver(&[4; 100]);
    assert_eq!(rec.stop().unwrap().frames, 100);
}

#[test]
fn hung_drain_makes_stop_fail_and_ring_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecorderConfig {
        stop_timeout_ms: 100,
        ..config_in(dir.path())
    };
    let hung = Arc::new(AtomicBool::new(false));
    let card_hung = Arc::clone(&hung);
    let (mut rec, feed) = recorder_with_sink::<i16, _, _>(config, move |dir, prefix| {
        let (path, file) = create_recording_file(dir, prefix)?;
        Ok((
            path,
            HungCard {
                file,
                hung: Arc::clone(&card_hung),
            },
        ))
    });

    rec.start().unwrap();
    hung.store(true, Ordering::SeqCst);
    feed.deliver(&[6; 512]);

    match rec.stop() {
        Err(RecorderError::DrainStalled { timeout }) => {
            assert_eq!(timeout, Duration::from_millis(100))
        }
        other => panic!("expected DrainStalled, got {other:?}"),
    }
    assert_eq!(rec.status(), RecorderStatus::Idle);
    assert!(matches!(rec.start(), Err(RecorderError::RingUnavailable)));

    // Let the detached worker finish.
    hung.store(false, Ordering::SeqCst);
}
