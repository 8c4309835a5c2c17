use crate::lock::lock_or_recover;
use crate::DetectorError;
use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One block of mono samples normalized to [-1, 1].
pub type Frame = Vec<f32>;

/// Producer of fixed-size mono frames at a fixed sample rate.
pub trait FrameSource {
    /// Block until the next full frame is available.
    ///
    /// `Ok(None)` means the source is exhausted; live sources never return it.
    fn next_frame(&mut self) -> Result<Option<Frame>, DetectorError>;

    fn sample_rate(&self) -> u32;

    fn block_size(&self) -> usize;

    /// Frames discarded because the consumer fell behind.
    fn dropped_frames(&self) -> usize {
        0
    }
}

/// Frame source over PCM already in memory (WAV replay, tests).
#[derive(Debug, Clone)]
pub struct PcmFrameSource {
    samples: Vec<f32>,
    position: usize,
    sample_rate: u32,
    block_size: usize,
}

impl PcmFrameSource {
    pub fn new(samples: Vec<f32>, sample_rate: u32, block_size: usize) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate,
            block_size: block_size.max(1),
        }
    }

    /// Load a mono WAV file; integer formats are scaled to [-1, 1].
    pub fn from_wav(path: &Path, block_size: usize) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .with_context(|| format!("failed to open WAV file {}", path.display()))?;
        let spec = reader.spec();
        if spec.channels != 1 {
            bail!(
                "{} has {} channels; only mono recordings can be replayed",
                path.display(),
                spec.channels
            );
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .context("failed to decode float samples")?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 / scale))
                    .collect::<Result<_, _>>()
                    .context("failed to decode integer samples")?
            }
        };

        Ok(Self::new(samples, spec.sample_rate, block_size))
    }

    /// Whole frames left to read; a trailing partial frame is not counted.
    pub fn remaining_frames(&self) -> usize {
        (self.samples.len() - self.position) / self.block_size
    }
}

impl FrameSource for PcmFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, DetectorError> {
        let end = self.position + self.block_size;
        if end > self.samples.len() {
            return Ok(None);
        }
        let frame = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(Some(frame))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

/// Receiving end of the capture queue plus the stream-error slot.
///
/// Polls in short intervals so a stream error or a stalled device surfaces
/// within `capture_timeout` instead of blocking forever.
pub(super) struct FrameReceiver {
    receiver: Receiver<Frame>,
    stream_error: Arc<Mutex<Option<String>>>,
    poll_interval: Duration,
    capture_timeout: Duration,
}

impl FrameReceiver {
    pub(super) fn new(
        receiver: Receiver<Frame>,
        stream_error: Arc<Mutex<Option<String>>>,
        poll_interval: Duration,
        capture_timeout: Duration,
    ) -> Self {
        Self {
            receiver,
            stream_error,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            capture_timeout,
        }
    }

    fn take_stream_error(&self) -> Option<String> {
        lock_or_recover(&self.stream_error, "capture stream error slot").take()
    }

    pub(super) fn recv_frame(&self) -> Result<Frame, DetectorError> {
        let mut waited = Duration::ZERO;
        loop {
            if let Some(err) = self.take_stream_error() {
                return Err(DetectorError::Capture(err));
            }
            match self.receiver.recv_timeout(self.poll_interval) {
                Ok(frame) => return Ok(frame),
                Err(RecvTimeoutError::Timeout) => {
                    waited += self.poll_interval;
                    if waited >= self.capture_timeout {
                        return Err(DetectorError::Capture(format!(
                            "no audio received for {} ms",
                            waited.as_millis()
                        )));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DetectorError::Capture(
                        "audio stream disconnected".to_string(),
                    ));
                }
            }
        }
    }
}

/// Live microphone frames delivered by the CPAL callback.
///
/// Holds the stream open for as long as the source lives.
pub struct CpalFrameSource {
    _stream: cpal::Stream,
    frames: FrameReceiver,
    dropped: Arc<AtomicUsize>,
    sample_rate: u32,
    block_size: usize,
}

impl CpalFrameSource {
    pub(super) fn new(
        stream: cpal::Stream,
        frames: FrameReceiver,
        dropped: Arc<AtomicUsize>,
        sample_rate: u32,
        block_size: usize,
    ) -> Self {
        Self {
            _stream: stream,
            frames,
            dropped,
            sample_rate,
            block_size,
        }
    }
}

impl FrameSource for CpalFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, DetectorError> {
        self.frames.recv_frame().map(Some)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}
