use crate::sink::switchbot::DEFAULT_BASE_URL;

pub const DEFAULT_SAMPLE_RATES: [u32; 2] = [48_000, 44_100];
pub const DEFAULT_BLOCK_SIZE: usize = 1024;
pub const DEFAULT_LOUDNESS_THRESHOLD_DB: f64 = -25.0;
pub const DEFAULT_BAND_THRESHOLD_DB: f64 = -20.0;
pub const DEFAULT_BAND_LOW_HZ: f64 = 800.0;
pub const DEFAULT_BAND_HIGH_HZ: f64 = 2000.0;
pub const DEFAULT_COOLDOWN_SECONDS: f64 = 3.0;
pub const DEFAULT_FRAME_QUEUE_CAPACITY: usize = 32;
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_PACE_MS: u64 = 5;
pub const DEFAULT_SWITCHBOT_COMMAND: &str = "turnOn";
pub const DEFAULT_SWITCHBOT_TIMEOUT_MS: u64 = 2000;

pub(super) const MIN_SAMPLE_RATE: u32 = 8_000;
pub(super) const MAX_SAMPLE_RATE: u32 = 192_000;
pub(super) const MIN_BLOCK_SIZE: usize = 64;
pub(super) const MAX_BLOCK_SIZE: usize = 16_384;
pub(super) const MIN_THRESHOLD_DB: f64 = -200.0;
pub(super) const MAX_THRESHOLD_DB: f64 = 60.0;
pub(super) const MAX_BAND_HZ: f64 = 96_000.0;
pub(super) const MAX_COOLDOWN_SECONDS: f64 = 600.0;
pub(super) const MAX_FRAME_QUEUE_CAPACITY: usize = 1024;
pub(super) const MIN_CAPTURE_TIMEOUT_MS: u64 = 100;
pub(super) const MAX_CAPTURE_TIMEOUT_MS: u64 = 60_000;
pub(super) const MAX_PACE_MS: u64 = 100;
pub(super) const MIN_SWITCHBOT_TIMEOUT_MS: u64 = 100;
pub(super) const MAX_SWITCHBOT_TIMEOUT_MS: u64 = 30_000;

pub(super) fn default_switchbot_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
