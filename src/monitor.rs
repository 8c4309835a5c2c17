//! The detection loop: frames in, analysis, decision, trigger out.
//!
//! Frames are processed strictly in source order on the calling thread. The
//! stop flag is checked once per iteration, before waiting for the next
//! frame, so shutdown never interrupts a frame mid-analysis.

use crate::analysis::SpectralAnalyzer;
use crate::audio::FrameSource;
use crate::detector::{Decision, DetectorConfig, EventDetector};
use crate::sink::{ChimeEvent, TriggerSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, trace, warn};

/// Why the loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The stop flag was raised.
    Stopped,
    /// A finite source ran out of frames.
    SourceExhausted,
    /// The live source failed; fatal for the session.
    CaptureError(String),
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Stopped => "stopped",
            StopReason::SourceExhausted => "source_exhausted",
            StopReason::CaptureError(_) => "capture_error",
        }
    }
}

/// Counters for one monitoring session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorMetrics {
    pub frames_processed: u64,
    pub frames_dropped: usize,
    pub triggers: u64,
    pub sink_failures: u64,
    pub stop_reason: StopReason,
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self {
            frames_processed: 0,
            frames_dropped: 0,
            triggers: 0,
            sink_failures: 0,
            stop_reason: StopReason::Stopped,
        }
    }
}

pub struct Monitor {
    analyzer: SpectralAnalyzer,
    detector: EventDetector,
    pace: Duration,
    metrics: MonitorMetrics,
}

impl Monitor {
    /// `pace` is slept after every frame to yield the CPU; zero disables it.
    pub fn new(cfg: &DetectorConfig, pace: Duration) -> Self {
        Self {
            analyzer: SpectralAnalyzer::from_config(cfg),
            detector: EventDetector::new(cfg),
            pace,
            metrics: MonitorMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &MonitorMetrics {
        &self.metrics
    }

    pub fn detector(&self) -> &EventDetector {
        &self.detector
    }

    /// Analyze one frame and notify the sink if the detector fires.
    ///
    /// Sink failures are logged and counted; the cooldown stays armed.
    pub fn process_frame(
        &mut self,
        frame: &[f32],
        sink: &mut dyn TriggerSink,
    ) -> Option<ChimeEvent> {
        let frame_index = self.metrics.frames_processed;
        self.metrics.frames_processed += 1;

        let analysis = self.analyzer.analyze(frame);
        let decision = self.detector.observe(analysis);
        trace!(
            frame_index,
            loudness_db = analysis.loudness_db,
            band_energy_db = analysis.band_energy_db,
            ?decision,
            "frame analyzed"
        );
        if decision != Decision::Fire {
            return None;
        }

        self.metrics.triggers += 1;
        let event = ChimeEvent {
            sequence: self.metrics.triggers,
            frame_index,
            detected_at: SystemTime::now(),
            analysis,
        };
        info!(
            event = event.sequence,
            frame_index,
            loudness_db = format_args!("{:.1}", analysis.loudness_db),
            band_energy_db = format_args!("{:.1}", analysis.band_energy_db),
            cooldown_frames = self.detector.cooldown_frames(),
            "chime detected"
        );
        if let Err(err) = sink.notify(&event) {
            self.metrics.sink_failures += 1;
            warn!(sink = sink.name(), error = %err, event = event.sequence, "trigger delivery failed");
        }
        Some(event)
    }

    /// Run until the stop flag is raised, the source ends, or capture fails.
    pub fn run(
        mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn TriggerSink,
        stop: &AtomicBool,
    ) -> MonitorMetrics {
        info!(
            sample_rate = source.sample_rate(),
            block_size = source.block_size(),
            sink = sink.name(),
            "listening"
        );
        let mut reported_drops = 0usize;

        let stop_reason = loop {
            if stop.load(Ordering::Relaxed) {
                break StopReason::Stopped;
            }
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::SourceExhausted,
                Err(err) => {
                    error!(error = %err, "frame source failed");
                    break StopReason::CaptureError(err.to_string());
                }
            };

            self.process_frame(&frame, sink);

            let dropped = source.dropped_frames();
            if dropped > reported_drops {
                warn!(
                    dropped_total = dropped,
                    "detection fell behind capture; oldest frames dropped"
                );
                reported_drops = dropped;
            }

            if !self.pace.is_zero() {
                std::thread::sleep(self.pace);
            }
        };

        self.metrics.frames_dropped = source.dropped_frames();
        self.metrics.stop_reason = stop_reason;
        debug!(
            frames = self.metrics.frames_processed,
            triggers = self.metrics.triggers,
            sink_failures = self.metrics.sink_failures,
            dropped = self.metrics.frames_dropped,
            reason = self.metrics.stop_reason.label(),
            "monitor stopped"
        );
        self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmFrameSource;
    use crate::{DetectorError, SinkError};
    use std::f64::consts::PI;

    const RATE: u32 = 48_000;
    const BLOCK: usize = 1024;

    #[derive(Default)]
    struct CollectingSink {
        events: Vec<ChimeEvent>,
        fail: bool,
    }

    impl TriggerSink for CollectingSink {
        fn notify(&mut self, event: &ChimeEvent) -> Result<(), SinkError> {
            self.events.push(event.clone());
            if self.fail {
                Err(SinkError::InvalidResponse("remote down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn tone_samples(freq_hz: f64, amplitude: f32, frames: usize) -> Vec<f32> {
        (0..frames * BLOCK)
            .map(|n| {
                let phase = 2.0 * PI * freq_hz * n as f64 / f64::from(RATE);
                amplitude * phase.sin() as f32
            })
            .collect()
    }

    fn reference_config() -> DetectorConfig {
        DetectorConfig {
            sample_rate: RATE,
            block_size: BLOCK,
            loudness_threshold_db: -25.0,
            band_threshold_db: -20.0,
            band_low_hz: 800.0,
            band_high_hz: 2000.0,
            cooldown_seconds: 3.0,
        }
    }

    fn run_offline(samples: Vec<f32>, sink: &mut CollectingSink) -> MonitorMetrics {
        let cfg = reference_config();
        let mut source = PcmFrameSource::new(samples, RATE, BLOCK);
        let stop = AtomicBool::new(false);
        Monitor::new(&cfg, Duration::ZERO).run(&mut source, sink, &stop)
    }

    #[test]
    fn tone_then_silence_fires_once_per_cooldown_window() {
        let cfg = reference_config();
        let cooldown = cfg.cooldown_frames() as u64;
        assert_eq!(cooldown, 141);

        let mut samples = tone_samples(1200.0, 1.0, 200);
        samples.extend(std::iter::repeat(0.0).take(200 * BLOCK));

        let mut sink = CollectingSink::default();
        let metrics = run_offline(samples, &mut sink);

        assert_eq!(metrics.frames_processed, 400);
        assert_eq!(metrics.stop_reason, StopReason::SourceExhausted);
        let fired: Vec<u64> = sink.events.iter().map(|e| e.frame_index).collect();
        // First tone frame fires, frames 1..=141 are suppressed, and the tone
        // is still present when the detector re-arms on frame 142.
        assert_eq!(fired, vec![0, cooldown + 1]);
        assert!(fired.iter().all(|&idx| idx < 200));
        assert_eq!(metrics.triggers, 2);
    }

    #[test]
    fn single_event_in_first_cooldown_window() {
        let mut samples = tone_samples(1200.0, 1.0, 141);
        samples.extend(std::iter::repeat(0.0).take(200 * BLOCK));
        let mut sink = CollectingSink::default();
        let metrics = run_offline(samples, &mut sink);
        assert_eq!(metrics.triggers, 1);
        assert_eq!(sink.events[0].frame_index, 0);
        assert_eq!(sink.events[0].sequence, 1);
    }

    #[test]
    fn silence_never_fires() {
        let mut sink = CollectingSink::default();
        let metrics = run_offline(vec![0.0; 50 * BLOCK], &mut sink);
        assert_eq!(metrics.triggers, 0);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn loud_out_of_band_tone_never_fires() {
        let mut sink = CollectingSink::default();
        let metrics = run_offline(tone_samples(100.0, 1.0, 50), &mut sink);
        assert_eq!(metrics.frames_processed, 50);
        assert_eq!(metrics.triggers, 0);
    }

    #[test]
    fn sink_failure_keeps_loop_running_and_cooldown_armed() {
        let mut sink = CollectingSink {
            fail: true,
            ..CollectingSink::default()
        };
        let metrics = run_offline(tone_samples(1200.0, 1.0, 150), &mut sink);
        assert_eq!(metrics.frames_processed, 150);
        assert_eq!(metrics.triggers, 2);
        assert_eq!(metrics.sink_failures, 2);
        let fired: Vec<u64> = sink.events.iter().map(|e| e.frame_index).collect();
        assert_eq!(fired, vec![0, 142]);
    }

    #[test]
    fn raised_stop_flag_ends_before_reading() {
        let cfg = reference_config();
        let mut source = PcmFrameSource::new(tone_samples(1200.0, 1.0, 10), RATE, BLOCK);
        let stop = AtomicBool::new(true);
        let mut sink = CollectingSink::default();
        let metrics = Monitor::new(&cfg, Duration::ZERO).run(&mut source, &mut sink, &stop);
        assert_eq!(metrics.stop_reason, StopReason::Stopped);
        assert_eq!(metrics.frames_processed, 0);
        assert_eq!(source.remaining_frames(), 10);
    }

    struct FailingSource {
        frames_left: usize,
    }

    impl FrameSource for FailingSource {
        fn next_frame(&mut self) -> Result<Option<Vec<f32>>, DetectorError> {
            if self.frames_left == 0 {
                return Err(DetectorError::Capture("device unplugged".to_string()));
            }
            self.frames_left -= 1;
            Ok(Some(vec![0.0; BLOCK]))
        }

        fn sample_rate(&self) -> u32 {
            RATE
        }

        fn block_size(&self) -> usize {
            BLOCK
        }

        fn dropped_frames(&self) -> usize {
            3
        }
    }

    #[test]
    fn capture_error_stops_the_session() {
        let cfg = reference_config();
        let mut source = FailingSource { frames_left: 2 };
        let stop = AtomicBool::new(false);
        let mut sink = CollectingSink::default();
        let metrics = Monitor::new(&cfg, Duration::ZERO).run(&mut source, &mut sink, &stop);
        assert_eq!(metrics.frames_processed, 2);
        assert_eq!(metrics.frames_dropped, 3);
        assert_eq!(metrics.stop_reason.label(), "capture_error");
        match metrics.stop_reason {
            StopReason::CaptureError(msg) => assert!(msg.contains("device unplugged")),
            other => panic!("unexpected stop reason: {other:?}"),
        }
    }

    #[test]
    fn process_frame_reports_fired_event() {
        let cfg = reference_config();
        let mut monitor = Monitor::new(&cfg, Duration::ZERO);
        let mut sink = CollectingSink::default();
        let frame = tone_samples(1200.0, 1.0, 1);
        let event = monitor.process_frame(&frame, &mut sink).unwrap();
        assert_eq!(event.frame_index, 0);
        assert!(event.analysis.loudness_db > -25.0);
        assert!(monitor.process_frame(&frame, &mut sink).is_none());
        assert!(!monitor.detector().is_armed());
        assert_eq!(monitor.metrics().triggers, 1);
    }
}
