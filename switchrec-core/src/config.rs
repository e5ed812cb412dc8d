//! Recorder configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    buffering::{capacity_for_duration, PcmSample, MAX_RING_CAPACITY},
    error::{RecorderError, Result},
    wav::PcmFormat,
};

const MAX_SAMPLE_RATE: u32 = 384_000;
const MAX_CHANNELS: u16 = 32;
const SUPPORTED_BIT_DEPTHS: &[u16] = &[8, 16, 32];

/// Configuration for [`Recorder`](crate::engine::Recorder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct RecorderConfig {
    /// Capture sample rate (Hz). Default: 44100.
    pub sample_rate: u32,
    /// Interleaved channel count. Default: 1.
    pub channels: u16,
    /// Must match the sample type the recorder is instantiated with. Default: 16.
    pub bits_per_sample: u16,
    /// Frames per audio callback block requested from the device. Default: 512.
    pub frames_per_block: u32,
    /// Audio the ring buffer must hold between drains. Default: 500 ms.
    pub buffer_duration_ms: u32,
    /// Explicit ring capacity in samples; must be a power of two.
    /// `None` derives it from `buffer_duration_ms`.
    pub ring_capacity: Option<usize>,
    /// The drain worker writes once `capacity / drains_per_buffer` samples
    /// are waiting. Default: 4.
    pub drains_per_buffer: usize,
    /// Sleep between drain checks. Default: 20 ms.
    pub drain_poll_interval_ms: u64,
    /// Upper bound on waiting for the drain worker to acknowledge stop.
    /// Default: 5000 ms.
    pub stop_timeout_ms: u64,
    /// Directory recordings are written to. Default: current directory.
    pub output_dir: PathBuf,
    /// File name prefix, followed by a local timestamp. Default: `"rec"`.
    pub file_prefix: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            bits_per_sample: 16,
            frames_per_block: 512,
            buffer_duration_ms: 500,
            ring_capacity: None,
            drains_per_buffer: 4,
            drain_poll_interval_ms: 20,
            stop_timeout_ms: 5_000,
            output_dir: PathBuf::from("."),
            file_prefix: "rec".into(),
        }
    }
}

impl RecorderConfig {
    /// Check every field for a recorder carrying samples of type `S`.
    ///
    /// # Errors
    /// `RecorderError::Configuration` describing the first offending field.
    pub fn validate<S: PcmSample>(&self) -> Result<()> {
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(invalid(format!(
                "sample rate {} Hz outside 1..={MAX_SAMPLE_RATE}",
                self.sample_rate
            )));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(invalid(format!(
                "channel count {} outside 1..={MAX_CHANNELS}",
                self.channels
            )));
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&self.bits_per_sample) {
            return Err(invalid(format!(
                "unsupported bit depth {}",
                self.bits_per_sample
            )));
        }
        if self.bits_per_sample != S::BITS_PER_SAMPLE {
            return Err(invalid(format!(
                "bit depth {} does not match the {}-bit sample type",
                self.bits_per_sample,
                S::BITS_PER_SAMPLE
            )));
        }
        let byte_rate = u64::from(self.sample_rate)
            * u64::from(self.channels)
            * u64::from(self.bits_per_sample / 8);
        if byte_rate > u64::from(u32::MAX) {
            return Err(invalid(format!(
                "{} Hz x {} channels x {} bits overflows the WAV byte rate",
                self.sample_rate, self.channels, self.bits_per_sample
            )));
        }
        if self.frames_per_block == 0 {
            return Err(invalid("frames per block must be non-zero".into()));
        }
        if let Some(capacity) = self.ring_capacity {
            if capacity == 0 || !capacity.is_power_of_two() {
                return Err(invalid(format!(
                    "ring capacity {capacity} is not a power of two"
                )));
            }
        }
        let capacity = self.ring_capacity();
        if capacity > MAX_RING_CAPACITY {
            return Err(invalid(format!(
                "ring capacity {capacity} exceeds {MAX_RING_CAPACITY} samples; \
                 shorten bufferDurationMs ({} ms)",
                self.buffer_duration_ms
            )));
        }
        let block_samples = self.frames_per_block as usize * usize::from(self.channels);
        if capacity < block_samples {
            return Err(invalid(format!(
                "ring capacity {capacity} cannot hold one {block_samples}-sample block"
            )));
        }
        if self.drains_per_buffer == 0 || self.drains_per_buffer > capacity {
            return Err(invalid(format!(
                "drains per buffer {} outside 1..={capacity}",
                self.drains_per_buffer
            )));
        }
        if self.drain_poll_interval_ms == 0 {
            return Err(invalid("drain poll interval must be non-zero".into()));
        }
        if self.stop_timeout_ms == 0 {
            return Err(invalid("stop timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Ring capacity in samples (override, or derived from the buffer duration).
    pub fn ring_capacity(&self) -> usize {
        self.ring_capacity.unwrap_or_else(|| {
            capacity_for_duration(self.sample_rate, self.channels, self.buffer_duration_ms)
        })
    }

    /// Occupancy at which the drain worker writes to disk.
    pub fn drain_threshold(&self) -> usize {
        (self.ring_capacity() / self.drains_per_buffer.max(1)).max(1)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn pcm_format(&self) -> PcmFormat {
        PcmFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

fn invalid(msg: String) -> RecorderError {
    RecorderError::Configuration(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_for_i16() {
        let config = RecorderConfig::default();
        config.validate::<i16>().unwrap();
        assert_eq!(config.ring_capacity(), 32_768);
        assert_eq!(config.drain_threshold(), 8_192);
    }

    #[test]
    fn bit_depth_must_match_sample_type() {
        let config = RecorderConfig::default();
        assert!(matches!(
            config.validate::<i32>(),
            Err(RecorderError::Configuration(_))
        ));

        let config = RecorderConfig {
            bits_per_sample: 24,
            ..RecorderConfig::default()
        };
        assert!(config.validate::<i16>().is_err());
    }

    #[test]
    fn rejects_non_power_of_two_capacity() {
        let config = RecorderConfig {
            ring_capacity: Some(3000),
            ..RecorderConfig::default()
        };
        assert!(matches!(
            config.validate::<i16>(),
            Err(RecorderError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_ring_smaller_than_a_block() {
        let config = RecorderConfig {
            ring_capacity: Some(256),
            ..RecorderConfig::default()
        };
        assert!(config.validate::<i16>().is_err());
    }

    #[test]
    fn rejects_oversized_ring() {
        let endless = RecorderConfig {
            buffer_duration_ms: u32::MAX,
            ..RecorderConfig::default()
        };
        assert!(matches!(
            endless.validate::<i16>(),
            Err(RecorderError::Configuration(_))
        ));

        let explicit = RecorderConfig {
            ring_capacity: Some(MAX_RING_CAPACITY * 2),
            ..RecorderConfig::default()
        };
        assert!(explicit.validate::<i16>().is_err());

        let largest = RecorderConfig {
            ring_capacity: Some(MAX_RING_CAPACITY),
            ..RecorderConfig::default()
        };
        largest.validate::<i16>().unwrap();
    }

    #[test]
    fn rejects_zero_rate_and_channels() {
        let zero_rate = RecorderConfig {
            sample_rate: 0,
            ..RecorderConfig::default()
        };
        assert!(zero_rate.validate::<i16>().is_err());

        let zero_channels = RecorderConfig {
            channels: 0,
            ..RecorderConfig::default()
        };
        assert!(zero_channels.validate::<i16>().is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RecorderConfig =
            serde_json::from_str(r#"{"sampleRate":48000,"outputDir":"/data"}"#).unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.output_dir, PathBuf::from("/data"));
        assert_eq!(config.file_prefix, "rec");
    }
}
