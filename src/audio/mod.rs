//! Audio input: sample-rate negotiation and fixed-size frame delivery.
//!
//! The live path opens a mono f32 stream through CPAL at the first candidate
//! rate the device accepts, re-chunks callback buffers into exact
//! `block_size` frames, and hands them to the detection loop over a bounded
//! queue. Replay and tests use an in-memory PCM source with the same
//! `FrameSource` contract.

/// Channel count requested from the capture device.
pub const CAPTURE_CHANNELS: u16 = 1;

mod device;
mod dispatch;
mod negotiate;
mod source;

pub use device::{CaptureOptions, InputDevice};
pub use negotiate::{negotiate_sample_rate, StreamProber};
pub use source::{CpalFrameSource, Frame, FrameSource, PcmFrameSource};
