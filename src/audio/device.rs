//! Capture device access via CPAL.
//!
//! Handles device selection, format conversion to f32, and opening mono
//! streams at an exact sample rate for both probing and live capture.

use super::dispatch::{pump_frames, FrameDispatcher};
use super::negotiate::StreamProber;
use super::source::{CpalFrameSource, Frame, FrameReceiver};
use super::CAPTURE_CHANNELS;
use crate::lock::lock_or_recover;
use crate::DetectorError;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::bounded;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info};

/// Settings for opening the live frame source.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub sample_rate: u32,
    pub block_size: usize,
    pub queue_capacity: usize,
    pub capture_timeout: Duration,
}

impl CaptureOptions {
    /// Wall-clock length of one frame at the capture rate.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate.max(1)))
    }

    /// How long the detection loop waits on the queue before rechecking
    /// the stream-error slot.
    pub(super) fn poll_interval(&self) -> Duration {
        (self.frame_period() * 4).max(Duration::from_millis(20))
    }
}

/// Audio input device wrapper.
pub struct InputDevice {
    device: cpal::Device,
}

impl InputDevice {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Open the named device, or the host default when no name is given.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host.default_input_device().ok_or_else(|| {
                anyhow!(
                    "no default input device available. {}",
                    mic_permission_hint()
                )
            })?,
        };
        Ok(Self { device })
    }

    pub fn name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Native sample format of the device; F32 when the host cannot say.
    fn sample_format(&self) -> SampleFormat {
        self.device
            .default_input_config()
            .map(|cfg| cfg.sample_format())
            .unwrap_or(SampleFormat::F32)
    }

    /// Build a mono stream at `sample_rate`, preferring a fixed buffer of
    /// `block_size` frames and falling back to the host default buffer.
    fn build_stream<D, E>(
        &self,
        sample_rate: u32,
        block_size: usize,
        on_data: D,
        on_error: E,
    ) -> Result<cpal::Stream, String>
    where
        D: FnMut(&[f32]) + Send + Clone + 'static,
        E: FnMut(cpal::StreamError) + Send + Clone + 'static,
    {
        let format = self.sample_format();
        let mut config = StreamConfig {
            channels: CAPTURE_CHANNELS,
            sample_rate: SampleRate(sample_rate),
            buffer_size: BufferSize::Fixed(block_size as u32),
        };
        match build_mono_stream(&self.device, &config, format, on_data.clone(), on_error.clone()) {
            Ok(stream) => Ok(stream),
            Err(fixed_err) => {
                debug!(sample_rate, block_size, error = %fixed_err, "fixed buffer size rejected, retrying with default");
                config.buffer_size = BufferSize::Default;
                build_mono_stream(&self.device, &config, format, on_data, on_error)
            }
        }
    }

    /// Start live capture and return a frame source fed by the stream.
    pub fn open_frames(&self, opts: &CaptureOptions) -> Result<CpalFrameSource, DetectorError> {
        let (sender, receiver) = bounded::<Frame>(opts.queue_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let stream_error = Arc::new(Mutex::new(None::<String>));

        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            opts.block_size,
            sender,
            receiver.clone(),
            dropped.clone(),
        )));
        let on_data = {
            let dispatcher = dispatcher.clone();
            move |data: &[f32]| pump_frames(&dispatcher, data)
        };
        let on_error = {
            let slot = stream_error.clone();
            move |err: cpal::StreamError| {
                error!(error = %err, "audio stream error");
                let mut guard = lock_or_recover(&slot, "capture stream error slot");
                guard.get_or_insert_with(|| err.to_string());
            }
        };

        let stream = self
            .build_stream(opts.sample_rate, opts.block_size, on_data, on_error)
            .map_err(|err| {
                DetectorError::Capture(format!(
                    "failed to open '{}' at {} Hz: {err}. {}",
                    self.name(),
                    opts.sample_rate,
                    mic_permission_hint()
                ))
            })?;
        stream
            .play()
            .map_err(|err| DetectorError::Capture(format!("failed to start audio stream: {err}")))?;

        info!(
            device = %self.name(),
            sample_rate = opts.sample_rate,
            block_size = opts.block_size,
            queue_capacity = opts.queue_capacity,
            "capture started"
        );

        let frames = FrameReceiver::new(
            receiver,
            stream_error,
            opts.poll_interval(),
            opts.capture_timeout,
        );
        Ok(CpalFrameSource::new(
            stream,
            frames,
            dropped,
            opts.sample_rate,
            opts.block_size,
        ))
    }
}

impl StreamProber for InputDevice {
    fn probe(&self, sample_rate: u32, block_size: usize) -> Result<(), String> {
        let stream = self.build_stream(sample_rate, block_size, |_: &[f32]| {}, |_| {})?;
        drop(stream);
        Ok(())
    }
}

/// Convert every supported sample type to f32 up front so the rest of the
/// pipeline stays format-agnostic. The stream is mono, so no downmix.
fn build_mono_stream<D, E>(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    mut on_data: D,
    on_error: E,
) -> Result<cpal::Stream, String>
where
    D: FnMut(&[f32]) + Send + 'static,
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| on_data(data),
            on_error,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| s as f32 / 32_768.0));
                    on_data(&scratch);
                },
                on_error,
                None,
            )
        }
        SampleFormat::U16 => {
            let mut scratch = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| (s as f32 - 32_768.0) / 32_768.0));
                    on_data(&scratch);
                },
                on_error,
                None,
            )
        }
        other => return Err(format!("unsupported sample format: {other:?}")),
    };
    stream.map_err(|err| err.to_string())
}

fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}
