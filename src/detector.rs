//! Threshold and cooldown decision logic.
//!
//! The detector has two logical states encoded in a single counter: armed
//! when `cooldown_remaining == 0`, suppressed otherwise. It only decides;
//! delivering the event to a sink is the monitor's job, so a failed delivery
//! never rolls back the cooldown.

use crate::analysis::AnalysisResult;

/// Detection parameters, fixed for the session once the rate is negotiated.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub loudness_threshold_db: f64,
    pub band_threshold_db: f64,
    pub band_low_hz: f64,
    pub band_high_hz: f64,
    pub cooldown_seconds: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 1024,
            loudness_threshold_db: -25.0,
            band_threshold_db: -20.0,
            band_low_hz: 800.0,
            band_high_hz: 2000.0,
            cooldown_seconds: 3.0,
        }
    }
}

impl DetectorConfig {
    /// `round(sample_rate / block_size * cooldown_seconds)`.
    pub fn cooldown_frames(&self) -> u32 {
        if self.block_size == 0 {
            return 0;
        }
        let frames =
            (f64::from(self.sample_rate) / self.block_size as f64 * self.cooldown_seconds).round();
        if frames.is_finite() && frames > 0.0 {
            frames.min(f64::from(u32::MAX)) as u32
        } else {
            0
        }
    }
}

/// Outcome of feeding one frame to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Armed and both thresholds exceeded: deliver an event.
    Fire,
    /// Armed, thresholds not met.
    Idle,
    /// Inside the cooldown window; `remaining` frames left after this one.
    Suppressed { remaining: u32 },
}

#[derive(Debug, Clone)]
pub struct EventDetector {
    loudness_threshold_db: f64,
    band_threshold_db: f64,
    cooldown_frames: u32,
    cooldown_remaining: u32,
}

impl EventDetector {
    pub fn new(cfg: &DetectorConfig) -> Self {
        Self {
            loudness_threshold_db: cfg.loudness_threshold_db,
            band_threshold_db: cfg.band_threshold_db,
            cooldown_frames: cfg.cooldown_frames(),
            cooldown_remaining: 0,
        }
    }

    /// Advance the state machine by one frame.
    pub fn observe(&mut self, result: AnalysisResult) -> Decision {
        if self.cooldown_remaining > 0 {
            self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);
            return Decision::Suppressed {
                remaining: self.cooldown_remaining,
            };
        }

        if result.loudness_db > self.loudness_threshold_db
            && result.band_energy_db > self.band_threshold_db
        {
            self.cooldown_remaining = self.cooldown_frames;
            Decision::Fire
        } else {
            Decision::Idle
        }
    }

    pub fn is_armed(&self) -> bool {
        self.cooldown_remaining == 0
    }

    pub fn cooldown_remaining(&self) -> u32 {
        self.cooldown_remaining
    }

    pub fn cooldown_frames(&self) -> u32 {
        self.cooldown_frames
    }
}
