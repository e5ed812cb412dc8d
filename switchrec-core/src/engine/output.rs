//! Recording file naming, the sink seam, and header patch-up.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::warn;

use crate::wav::{WavHeader, HEADER_LEN};

/// Collisions within the same second get `_1`, `_2`, … appended.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// `<prefix>_YYYY-MM-DD_HH-MM-SS`, local time. No colons, so names stay
/// valid on FAT-formatted SD cards.
pub fn timestamped_stem(prefix: &str) -> String {
    format!("{prefix}_{}", Local::now().format("%Y-%m-%d_%H-%M-%S"))
}

/// Create a new, empty recording file in `dir`, never overwriting one.
pub fn create_recording_file(dir: &Path, prefix: &str) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(dir)?;
    let stem = timestamped_stem(prefix);

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.wav")
        } else {
            format!("{stem}_{attempt}.wav")
        };
        let path = dir.join(name);
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {stem}.wav"),
    ))
}

/// Destination of one recording: written sequentially by the drain worker,
/// then rewound for the header patch.
pub trait RecordingSink: Write + Seek + Send + 'static {
    /// Cut the sink to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Make everything written so far durable.
    fn commit(&mut self) -> io::Result<()>;
}

impl RecordingSink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn commit(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Rewrite the first 44 bytes of `sink` with `header` and commit.
pub fn patch_header<W: RecordingSink>(sink: &mut W, header: &WavHeader) -> io::Result<()> {
    sink.seek(SeekFrom::Start(0))?;
    let bytes = header.to_bytes();
    debug_assert_eq!(bytes.len(), HEADER_LEN);
    sink.write_all(&bytes)?;
    sink.commit()
}

/// Remove a recording that never received audio.
pub fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = ?path, "could not remove abandoned recording: {e}");
    }
}
