//! Canonical 44-byte RIFF/WAVE header.
//!
//! ```text
//! off  size  field
//!   0     4  "RIFF"
//!   4     4  riff size  (= data size + 36)
//!   8     4  "WAVE"
//!  12     4  "fmt "
//!  16     4  fmt chunk length (16)
//!  20     2  format tag (1 = PCM)
//!  22     2  channels
//!  24     4  sample rate
//!  28     4  byte rate
//!  32     2  block align
//!  34     2  bits per sample
//!  36     4  "data"
//!  40     4  data size
//! ```
//!
//! All integers are little-endian. The header is serialized field by field,
//! never by reinterpreting a struct's memory.

use tracing::warn;

use crate::error::{RecorderError, Result};

pub const HEADER_LEN: usize = 44;

/// Bytes of header that follow the riff size field.
const RIFF_SIZE_OVERHEAD: u32 = 36;
const FMT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;

/// Sample layout recorded in the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Header for a fresh recording; both size fields are zero until
    /// [`finalized`](Self::finalized) patches them.
    pub fn new(format: PcmFormat) -> Self {
        Self {
            riff_size: 0,
            format_tag: FORMAT_PCM,
            channels: format.channels,
            sample_rate: format.sample_rate,
            byte_rate: format.byte_rate(),
            block_align: format.block_align(),
            bits_per_sample: format.bits_per_sample,
            data_size: 0,
        }
    }

    /// Copy of this header with sizes computed from `total_frames`.
    ///
    /// Sizes saturate at the largest value a 32-bit RIFF length can express.
    pub fn finalized(&self, total_frames: u64) -> Self {
        let max_data = u64::from(u32::MAX - RIFF_SIZE_OVERHEAD);
        let wanted = total_frames.saturating_mul(u64::from(self.block_align));
        if wanted > max_data {
            warn!(
                frames = total_frames,
                "recording exceeds the RIFF size limit; header sizes saturated"
            );
        }
        let data_size = wanted.min(max_data) as u32;
        Self {
            riff_size: data_size + RIFF_SIZE_OVERHEAD,
            data_size,
            ..*self
        }
    }

    /// Frames described by the data size field.
    pub fn frame_count(&self) -> u64 {
        if self.block_align == 0 {
            return 0;
        }
        u64::from(self.data_size) / u64::from(self.block_align)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(b"RIFF");
        out[4..8].copy_from_slice(&self.riff_size.to_le_bytes());
        out[8..12].copy_from_slice(b"WAVE");
        out[12..16].copy_from_slice(b"fmt ");
        out[16..20].copy_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        out[20..22].copy_from_slice(&self.format_tag.to_le_bytes());
        out[22..24].copy_from_slice(&self.channels.to_le_bytes());
        out[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&self.byte_rate.to_le_bytes());
        out[32..34].copy_from_slice(&self.block_align.to_le_bytes());
        out[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(b"data");
        out[40..44].copy_from_slice(&self.data_size.to_le_bytes());
        out
    }

    /// Parse the first 44 bytes of a file written by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    /// `RecorderError::InvalidHeader` on short input, a wrong chunk tag, or a
    /// `fmt ` chunk that is not plain 16-byte PCM.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(RecorderError::InvalidHeader(format!(
                "need {HEADER_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        expect_tag(bytes, 0, b"RIFF")?;
        expect_tag(bytes, 8, b"WAVE")?;
        expect_tag(bytes, 12, b"fmt ")?;
        expect_tag(bytes, 36, b"data")?;

        let fmt_len = read_u32(bytes, 16);
        if fmt_len != FMT_CHUNK_LEN {
            return Err(RecorderError::InvalidHeader(format!(
                "unexpected fmt chunk length {fmt_len}"
            )));
        }

        Ok(Self {
            riff_size: read_u32(bytes, 4),
            format_tag: read_u16(bytes, 20),
            channels: read_u16(bytes, 22),
            sample_rate: read_u32(bytes, 24),
            byte_rate: read_u32(bytes, 28),
            block_align: read_u16(bytes, 32),
            bits_per_sample: read_u16(bytes, 34),
            data_size: read_u32(bytes, 40),
        })
    }
}

fn expect_tag(bytes: &[u8], offset: usize, tag: &[u8; 4]) -> Result<()> {
    let found = &bytes[offset..offset + 4];
    if found != tag {
        return Err(RecorderError::InvalidHeader(format!(
            "expected {:?} at offset {offset}, found {:?}",
            String::from_utf8_lossy(tag),
            String::from_utf8_lossy(found)
        )));
    }
    Ok(())
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
