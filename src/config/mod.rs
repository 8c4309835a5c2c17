//! Command-line parsing and validation helpers.

mod defaults;
mod validation;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use defaults::default_switchbot_base_url;
pub use defaults::{
    DEFAULT_BAND_HIGH_HZ, DEFAULT_BAND_LOW_HZ, DEFAULT_BAND_THRESHOLD_DB, DEFAULT_BLOCK_SIZE,
    DEFAULT_CAPTURE_TIMEOUT_MS, DEFAULT_COOLDOWN_SECONDS, DEFAULT_FRAME_QUEUE_CAPACITY,
    DEFAULT_LOUDNESS_THRESHOLD_DB, DEFAULT_PACE_MS, DEFAULT_SAMPLE_RATES,
    DEFAULT_SWITCHBOT_COMMAND, DEFAULT_SWITCHBOT_TIMEOUT_MS,
};

/// CLI options for chimewatch. Validated once at startup, then frozen.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "chimewatch",
    about = "chimewatch: listens for a doorbell chime and fires a trigger",
    author,
    version
)]
pub struct AppConfig {
    /// Candidate capture sample rates, tried in order (Hz, comma separated)
    #[arg(
        long = "sample-rates",
        env = "CHIMEWATCH_SAMPLE_RATES",
        value_delimiter = ',',
        default_values_t = DEFAULT_SAMPLE_RATES.to_vec()
    )]
    pub sample_rates: Vec<u32>,

    /// Samples per analysis frame (power of two)
    #[arg(long = "block-size", env = "CHIMEWATCH_BLOCK_SIZE", default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: usize,

    /// Frame loudness that must be exceeded to fire (dBFS)
    #[arg(
        long = "loudness-threshold-db",
        env = "CHIMEWATCH_LOUDNESS_DB",
        allow_negative_numbers = true,
        default_value_t = DEFAULT_LOUDNESS_THRESHOLD_DB
    )]
    pub loudness_threshold_db: f64,

    /// In-band spectral energy that must be exceeded to fire (dB)
    #[arg(
        long = "band-threshold-db",
        env = "CHIMEWATCH_BAND_DB",
        allow_negative_numbers = true,
        default_value_t = DEFAULT_BAND_THRESHOLD_DB
    )]
    pub band_threshold_db: f64,

    /// Lower edge of the chime band (Hz, inclusive)
    #[arg(long = "band-low-hz", default_value_t = DEFAULT_BAND_LOW_HZ)]
    pub band_low_hz: f64,

    /// Upper edge of the chime band (Hz, inclusive)
    #[arg(long = "band-high-hz", default_value_t = DEFAULT_BAND_HIGH_HZ)]
    pub band_high_hz: f64,

    /// Quiet period after a trigger (seconds)
    #[arg(long = "cooldown-seconds", default_value_t = DEFAULT_COOLDOWN_SECONDS)]
    pub cooldown_seconds: f64,

    /// Frames buffered between capture and detection before the oldest is dropped
    #[arg(long = "frame-queue-capacity", default_value_t = DEFAULT_FRAME_QUEUE_CAPACITY)]
    pub frame_queue_capacity: usize,

    /// Give up on the device after this long without a frame (milliseconds)
    #[arg(long = "capture-timeout-ms", default_value_t = DEFAULT_CAPTURE_TIMEOUT_MS)]
    pub capture_timeout_ms: u64,

    /// Sleep after each processed frame (milliseconds, 0 disables)
    #[arg(long = "pace-ms", default_value_t = DEFAULT_PACE_MS)]
    pub pace_ms: u64,

    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Run detection over a mono WAV file instead of the microphone
    #[arg(long, value_name = "WAV")]
    pub replay: Option<PathBuf>,

    /// Where detections are delivered
    #[arg(long, value_enum, default_value_t = SinkKind::Console)]
    pub sink: SinkKind,

    /// SwitchBot API token
    #[arg(long = "switchbot-token", env = "SWITCHBOT_TOKEN", hide_env_values = true)]
    pub switchbot_token: Option<String>,

    /// SwitchBot API secret used for request signing
    #[arg(long = "switchbot-secret", env = "SWITCHBOT_SECRET", hide_env_values = true)]
    pub switchbot_secret: Option<String>,

    /// SwitchBot device that receives the command
    #[arg(long = "switchbot-device-id", env = "SWITCHBOT_DEVICE_ID")]
    pub switchbot_device_id: Option<String>,

    /// Optional second SwitchBot device
    #[arg(
        long = "switchbot-secondary-device-id",
        env = "SWITCHBOT_SECONDARY_DEVICE_ID"
    )]
    pub switchbot_secondary_device_id: Option<String>,

    /// Command sent to each SwitchBot device
    #[arg(long = "switchbot-command", default_value = DEFAULT_SWITCHBOT_COMMAND)]
    pub switchbot_command: String,

    /// SwitchBot API base URL
    #[arg(long = "switchbot-base-url", default_value_t = default_switchbot_base_url())]
    pub switchbot_base_url: String,

    /// SwitchBot request timeout (milliseconds)
    #[arg(long = "switchbot-timeout-ms", default_value_t = DEFAULT_SWITCHBOT_TIMEOUT_MS)]
    pub switchbot_timeout_ms: u64,

    /// Print devices registered to the SwitchBot account and exit
    #[arg(long = "list-switchbot-devices", default_value_t = false)]
    pub list_switchbot_devices: bool,

    /// Verbose logging (debug level unless CHIMEWATCH_LOG says otherwise)
    #[arg(long = "logs", env = "CHIMEWATCH_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "CHIMEWATCH_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Append logs to this file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

/// Trigger sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    Console,
    Switchbot,
    Both,
}

impl SinkKind {
    pub fn label(self) -> &'static str {
        match self {
            SinkKind::Console => "console",
            SinkKind::Switchbot => "switchbot",
            SinkKind::Both => "both",
        }
    }

    pub fn uses_console(self) -> bool {
        matches!(self, SinkKind::Console | SinkKind::Both)
    }

    pub fn uses_switchbot(self) -> bool {
        matches!(self, SinkKind::Switchbot | SinkKind::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
