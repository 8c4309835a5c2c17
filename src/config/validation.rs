use super::defaults::{
    MAX_BAND_HZ, MAX_BLOCK_SIZE, MAX_CAPTURE_TIMEOUT_MS, MAX_COOLDOWN_SECONDS,
    MAX_FRAME_QUEUE_CAPACITY, MAX_PACE_MS, MAX_SAMPLE_RATE, MAX_SWITCHBOT_TIMEOUT_MS,
    MAX_THRESHOLD_DB, MIN_BLOCK_SIZE, MIN_CAPTURE_TIMEOUT_MS, MIN_SAMPLE_RATE,
    MIN_SWITCHBOT_TIMEOUT_MS, MIN_THRESHOLD_DB,
};
use super::AppConfig;
use crate::audio::CaptureOptions;
use crate::detector::DetectorConfig;
use crate::sink::SwitchBotCredentials;
use anyhow::{bail, Result};
use std::time::Duration;

impl AppConfig {
    /// Check CLI values and normalize optional strings.
    pub fn validate(&mut self) -> Result<()> {
        if self.sample_rates.is_empty() {
            bail!("--sample-rates must list at least one rate");
        }
        for &rate in &self.sample_rates {
            if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) {
                bail!(
                    "--sample-rates entries must be between {MIN_SAMPLE_RATE} and {MAX_SAMPLE_RATE} Hz, got {rate}"
                );
            }
        }
        let mut seen = Vec::with_capacity(self.sample_rates.len());
        self.sample_rates.retain(|rate| {
            if seen.contains(rate) {
                false
            } else {
                seen.push(*rate);
                true
            }
        });

        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size)
            || !self.block_size.is_power_of_two()
        {
            bail!(
                "--block-size must be a power of two between {MIN_BLOCK_SIZE} and {MAX_BLOCK_SIZE}, got {}",
                self.block_size
            );
        }

        check_threshold("--loudness-threshold-db", self.loudness_threshold_db)?;
        check_threshold("--band-threshold-db", self.band_threshold_db)?;

        if !self.band_low_hz.is_finite() || !self.band_high_hz.is_finite() {
            bail!("--band-low-hz and --band-high-hz must be finite");
        }
        if self.band_low_hz < 0.0 || self.band_low_hz >= self.band_high_hz {
            bail!(
                "--band-low-hz ({}) must be >= 0 and below --band-high-hz ({})",
                self.band_low_hz,
                self.band_high_hz
            );
        }
        if self.band_high_hz > MAX_BAND_HZ {
            bail!(
                "--band-high-hz must be at most {MAX_BAND_HZ} Hz, got {}",
                self.band_high_hz
            );
        }

        if !self.cooldown_seconds.is_finite()
            || !(0.0..=MAX_COOLDOWN_SECONDS).contains(&self.cooldown_seconds)
        {
            bail!(
                "--cooldown-seconds must be between 0 and {MAX_COOLDOWN_SECONDS}, got {}",
                self.cooldown_seconds
            );
        }
        if !(1..=MAX_FRAME_QUEUE_CAPACITY).contains(&self.frame_queue_capacity) {
            bail!(
                "--frame-queue-capacity must be between 1 and {MAX_FRAME_QUEUE_CAPACITY}, got {}",
                self.frame_queue_capacity
            );
        }
        if !(MIN_CAPTURE_TIMEOUT_MS..=MAX_CAPTURE_TIMEOUT_MS).contains(&self.capture_timeout_ms) {
            bail!(
                "--capture-timeout-ms must be between {MIN_CAPTURE_TIMEOUT_MS} and {MAX_CAPTURE_TIMEOUT_MS} ms, got {}",
                self.capture_timeout_ms
            );
        }
        if self.pace_ms > MAX_PACE_MS {
            bail!(
                "--pace-ms must be between 0 and {MAX_PACE_MS} ms, got {}",
                self.pace_ms
            );
        }

        self.input_device = normalize_optional(self.input_device.take());
        self.switchbot_token = normalize_optional(self.switchbot_token.take());
        self.switchbot_secret = normalize_optional(self.switchbot_secret.take());
        self.switchbot_device_id = normalize_optional(self.switchbot_device_id.take());
        self.switchbot_secondary_device_id =
            normalize_optional(self.switchbot_secondary_device_id.take());

        if !(MIN_SWITCHBOT_TIMEOUT_MS..=MAX_SWITCHBOT_TIMEOUT_MS).contains(&self.switchbot_timeout_ms)
        {
            bail!(
                "--switchbot-timeout-ms must be between {MIN_SWITCHBOT_TIMEOUT_MS} and {MAX_SWITCHBOT_TIMEOUT_MS} ms, got {}",
                self.switchbot_timeout_ms
            );
        }
        let base_url = self.switchbot_base_url.trim();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            bail!("--switchbot-base-url must be an http(s) URL, got '{base_url}'");
        }
        self.switchbot_base_url = base_url.trim_end_matches('/').to_string();

        let needs_switchbot = self.sink.uses_switchbot() || self.list_switchbot_devices;
        if needs_switchbot && self.switchbot_credentials().is_none() {
            bail!("SwitchBot requires --switchbot-token and --switchbot-secret (or SWITCHBOT_TOKEN / SWITCHBOT_SECRET)");
        }
        if self.sink.uses_switchbot() {
            if self.switchbot_device_id.is_none() {
                bail!("--sink {} requires --switchbot-device-id", self.sink.label());
            }
            let command = self.switchbot_command.trim();
            if command.is_empty() || !command.chars().all(|ch| ch.is_ascii_alphanumeric()) {
                bail!("--switchbot-command must be a non-empty alphanumeric command name");
            }
            self.switchbot_command = command.to_string();
        }

        if let Some(path) = &self.replay {
            if !path.is_file() {
                bail!("--replay file '{}' does not exist", path.display());
            }
        }

        Ok(())
    }

    /// Freeze detection parameters once the capture rate is known.
    pub fn detector_config(&self, sample_rate: u32) -> DetectorConfig {
        DetectorConfig {
            sample_rate,
            block_size: self.block_size,
            loudness_threshold_db: self.loudness_threshold_db,
            band_threshold_db: self.band_threshold_db,
            band_low_hz: self.band_low_hz,
            band_high_hz: self.band_high_hz,
            cooldown_seconds: self.cooldown_seconds,
        }
    }

    pub fn capture_options(&self, sample_rate: u32) -> CaptureOptions {
        CaptureOptions {
            sample_rate,
            block_size: self.block_size,
            queue_capacity: self.frame_queue_capacity,
            capture_timeout: Duration::from_millis(self.capture_timeout_ms),
        }
    }

    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }

    pub fn switchbot_timeout(&self) -> Duration {
        Duration::from_millis(self.switchbot_timeout_ms)
    }

    pub fn switchbot_credentials(&self) -> Option<SwitchBotCredentials> {
        match (&self.switchbot_token, &self.switchbot_secret) {
            (Some(token), Some(secret)) => Some(SwitchBotCredentials {
                token: token.clone(),
                secret: secret.clone(),
            }),
            _ => None,
        }
    }
}

fn check_threshold(flag: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(MIN_THRESHOLD_DB..=MAX_THRESHOLD_DB).contains(&value) {
        bail!("{flag} must be between {MIN_THRESHOLD_DB} and {MAX_THRESHOLD_DB} dB, got {value}");
    }
    Ok(())
}

pub(super) fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}
