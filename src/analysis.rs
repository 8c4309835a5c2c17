//! Frame-wise loudness and band-energy estimation.
//!
//! Both measurements are pure functions of one frame. `SpectralAnalyzer`
//! caches the Hann window, FFT plan, and band bin range for a fixed
//! (rate, block size, band) so the per-frame path only allocates its FFT
//! buffer.

use crate::detector::DetectorConfig;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::ops::Range;
use std::sync::Arc;

/// Guard added before every logarithm so silence maps to a finite floor.
pub const EPS: f64 = 1e-12;

/// Loudness reported for an all-zero frame: `20*log10(sqrt(EPS) + EPS)`.
pub fn silence_floor_db() -> f64 {
    20.0 * (EPS.sqrt() + EPS).log10()
}

/// Band energy reported when the band holds no energy (or no bins).
pub fn band_floor_db() -> f64 {
    power_to_db(0.0)
}

/// Measurements derived from exactly one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisResult {
    pub loudness_db: f64,
    pub band_energy_db: f64,
}

/// RMS loudness in dB relative to full scale.
pub fn loudness_db(frame: &[f32]) -> f64 {
    let mean_square = if frame.is_empty() {
        0.0
    } else {
        frame
            .iter()
            .map(|&s| {
                let s = f64::from(s);
                s * s
            })
            .sum::<f64>()
            / frame.len() as f64
    };
    let rms = (mean_square + EPS).sqrt();
    20.0 * (rms + EPS).log10()
}

/// Mean squared DFT magnitude inside `[f_lo, f_hi]` Hz, in dB.
///
/// Plans a fresh FFT on every call; use [`SpectralAnalyzer`] on the hot path.
pub fn band_energy_db(frame: &[f32], rate: u32, f_lo: f64, f_hi: f64) -> f64 {
    if frame.is_empty() {
        return band_floor_db();
    }
    let window = hann_window(frame.len());
    let fft = FftPlanner::<f64>::new().plan_fft_forward(frame.len());
    let bins = band_bins(frame.len(), rate, f_lo, f_hi);
    windowed_band_db(frame, &window, fft.as_ref(), bins)
}

/// Symmetric Hann window `0.5 - 0.5*cos(2πk/(N-1))`.
pub fn hann_window(len: usize) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    let denom = len.saturating_sub(1) as f64;
    (0..len)
        .map(|k| 0.5 - 0.5 * (2.0 * PI * k as f64 / denom).cos())
        .collect()
}

/// One-sided DFT bins whose center frequency `k*rate/len` lies in the band.
///
/// Returns an empty range when no bin qualifies.
pub fn band_bins(len: usize, rate: u32, f_lo: f64, f_hi: f64) -> Range<usize> {
    if len == 0 {
        return 0..0;
    }
    let bin_hz = f64::from(rate) / len as f64;
    let mut start = None;
    let mut end = 0;
    for k in 0..=len / 2 {
        let freq = k as f64 * bin_hz;
        if freq >= f_lo && freq <= f_hi {
            start.get_or_insert(k);
            end = k + 1;
        }
    }
    match start {
        Some(start) => start..end,
        None => 0..0,
    }
}

fn power_to_db(power: f64) -> f64 {
    10.0 * (power + EPS).log10()
}

fn windowed_band_db(frame: &[f32], window: &[f64], fft: &dyn Fft<f64>, bins: Range<usize>) -> f64 {
    if bins.is_empty() {
        return band_floor_db();
    }
    let mut buffer: Vec<Complex<f64>> = frame
        .iter()
        .zip(window.iter())
        .map(|(&s, &w)| Complex::new(f64::from(s) * w, 0.0))
        .collect();
    fft.process(&mut buffer);

    let count = bins.len();
    let total: f64 = buffer[bins].iter().map(|c| c.norm_sqr()).sum();
    power_to_db(total / count as f64)
}

/// Precomputed analysis for a fixed rate, block size, and band.
pub struct SpectralAnalyzer {
    sample_rate: u32,
    block_size: usize,
    band_low_hz: f64,
    band_high_hz: f64,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
    bins: Range<usize>,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: u32, block_size: usize, band_low_hz: f64, band_high_hz: f64) -> Self {
        let block_size = block_size.max(1);
        Self {
            sample_rate,
            block_size,
            band_low_hz,
            band_high_hz,
            window: hann_window(block_size),
            fft: FftPlanner::<f64>::new().plan_fft_forward(block_size),
            bins: band_bins(block_size, sample_rate, band_low_hz, band_high_hz),
        }
    }

    pub fn from_config(cfg: &DetectorConfig) -> Self {
        Self::new(
            cfg.sample_rate,
            cfg.block_size,
            cfg.band_low_hz,
            cfg.band_high_hz,
        )
    }

    pub fn band_energy_db(&self, frame: &[f32]) -> f64 {
        if frame.len() != self.block_size {
            return band_energy_db(frame, self.sample_rate, self.band_low_hz, self.band_high_hz);
        }
        windowed_band_db(frame, &self.window, self.fft.as_ref(), self.bins.clone())
    }

    pub fn analyze(&self, frame: &[f32]) -> AnalysisResult {
        AnalysisResult {
            loudness_db: loudness_db(frame),
            band_energy_db: self.band_energy_db(frame),
        }
    }
}
