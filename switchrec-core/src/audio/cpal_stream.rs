//! cpal-backed [`AudioStream`].
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms, so `CpalInputStream` must be
//! created and dropped on the same thread. The appliance owns it from the
//! control loop thread for the whole process lifetime.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, SampleRate, SizedSample, Stream, StreamConfig, SupportedBufferSize,
};
use tracing::{error, info, warn};

use super::{AudioStream, CaptureProducer};
use crate::{
    buffering::PcmSample,
    config::RecorderConfig,
    error::{RecorderError, Result, StreamError},
};

/// Handle to an opened (initially paused) input stream.
pub struct CpalInputStream {
    stream: Stream,
    /// Gates the callback so nothing reaches the ring once `stop` returns,
    /// even on hosts where `pause` takes effect asynchronously.
    delivering: Arc<AtomicBool>,
    pub device_name: String,
}

impl CpalInputStream {
    /// Open an input device whose name contains `device_hint`, otherwise the
    /// default input device, and wire its callback to `producer`.
    ///
    /// The stream is built paused; the recorder starts it per session.
    ///
    /// # Errors
    /// `RecorderError::CaptureStart` when no device supports the configured
    /// rate, channel count and sample format, or cpal fails to build the stream.
    pub fn open<S>(
        config: &RecorderConfig,
        device_hint: Option<&str>,
        mut producer: CaptureProducer<S>,
    ) -> Result<Self>
    where
        S: PcmSample + SizedSample,
    {
        let device = select_device(device_hint)?;
        let device_name = device.name().unwrap_or_default();

        let supported = device
            .supported_input_configs()
            .map_err(|e| RecorderError::CaptureStart(e.to_string()))?
            .find(|range| {
                range.channels() == config.channels
                    && range.sample_format() == S::FORMAT
                    && range.min_sample_rate().0 <= config.sample_rate
                    && config.sample_rate <= range.max_sample_rate().0
            })
            .ok_or_else(|| {
                RecorderError::CaptureStart(format!(
                    "{device_name} cannot capture {} Hz x {} channels as {:?}",
                    config.sample_rate,
                    config.channels,
                    S::FORMAT
                ))
            })?
            .with_sample_rate(SampleRate(config.sample_rate));

        let buffer_size = match supported.buffer_size() {
            SupportedBufferSize::Range { min, max }
                if (*min..=*max).contains(&config.frames_per_block) =>
            {
                BufferSize::Fixed(config.frames_per_block)
            }
            _ => {
                warn!(
                    frames = config.frames_per_block,
                    "device does not advertise the requested block size, using its default"
                );
                BufferSize::Default
            }
        };

        info!(
            device = device_name.as_str(),
            sample_rate = config.sample_rate,
            channels = config.channels,
            format = ?S::FORMAT,
            "opening input stream"
        );

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size,
        };

        let delivering = Arc::new(AtomicBool::new(false));
        let gate = Arc::clone(&delivering);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[S], _info: &cpal::InputCallbackInfo| {
                    if !gate.load(Ordering::Acquire) {
                        return;
                    }
                    producer.on_block(data);
                },
                |err| error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| RecorderError::CaptureStart(e.to_string()))?;

        // Some hosts start streams on build.
        if let Err(e) = stream.pause() {
            warn!("could not pause freshly built stream: {e}");
        }

        Ok(Self {
            stream,
            delivering,
            device_name,
        })
    }
}

impl AudioStream for CpalInputStream {
    fn start(&mut self) -> std::result::Result<(), StreamError> {
        self.delivering.store(true, Ordering::Release);
        self.stream.play().map_err(|e| {
            self.delivering.store(false, Ordering::Release);
            StreamError::new(e.to_string())
        })
    }

    fn stop(&mut self) -> std::result::Result<(), StreamError> {
        self.delivering.store(false, Ordering::Release);
        self.stream
            .pause()
            .map_err(|e| StreamError::new(e.to_string()))
    }
}

fn select_device(device_hint: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(hint) = device_hint {
        match host.input_devices() {
            Ok(mut devices) => {
                let found = devices.find(|device| {
                    device
                        .name()
                        .map(|name| name.contains(hint))
                        .unwrap_or(false)
                });
                if let Some(device) = found {
                    return Ok(device);
                }
                warn!("no input device matching '{hint}', falling back to default");
            }
            Err(e) => warn!("failed to list input devices: {e}"),
        }
    }

    host.default_input_device()
        .ok_or_else(|| RecorderError::CaptureStart("no input device available".into()))
}
