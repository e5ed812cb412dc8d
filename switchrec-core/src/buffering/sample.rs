//! PCM sample element types the ring buffer can carry.

/// A fixed-width integer PCM sample as stored in a WAV `data` chunk.
pub trait PcmSample: Copy + Default + Send + Sync + 'static {
    /// Bits per sample written to the WAV `fmt ` chunk.
    const BITS_PER_SAMPLE: u16;

    /// Append the little-endian encoding of `samples` to `out`.
    fn extend_le_bytes(samples: &[Self], out: &mut Vec<u8>);

    /// Element width in bytes.
    fn width() -> usize {
        usize::from(Self::BITS_PER_SAMPLE / 8)
    }
}

impl PcmSample for u8 {
    const BITS_PER_SAMPLE: u16 = 8;

    // 8-bit WAV PCM is unsigned, so the bytes go out as-is.
    fn extend_le_bytes(samples: &[Self], out: &mut Vec<u8>) {
        out.extend_from_slice(samples);
    }
}

macro_rules! impl_pcm_sample {
    ($ty:ty, $bits:expr) => {
        impl PcmSample for $ty {
            const BITS_PER_SAMPLE: u16 = $bits;

            fn extend_le_bytes(samples: &[Self], out: &mut Vec<u8>) {
                out.reserve(samples.len() * Self::width());
                for sample in samples {
                    out.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }
    };
}

impl_pcm_sample!(i16, 16);
impl_pcm_sample!(i32, 32);
