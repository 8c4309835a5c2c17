//! Trigger sinks: where a detected chime goes.
//!
//! The detection loop calls [`TriggerSink::notify`] synchronously once per
//! event. A sink error is logged and counted by the caller but never stops
//! frame processing. Sinks that talk to the network hand the event to their
//! own thread so a call returns well within one frame period.

mod signing;
pub mod switchbot;

pub use signing::{sign_request, SignedHeaders};
pub use switchbot::{DeviceSummary, SwitchBotClient, SwitchBotCredentials, SwitchBotSink};

use crate::analysis::AnalysisResult;
use crate::SinkError;
use std::io::Write;
use std::time::SystemTime;
use tracing::warn;

/// A single detection, handed to every sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ChimeEvent {
    /// 1-based count of events fired this session.
    pub sequence: u64,
    /// Index of the frame that fired, counted from the start of the session.
    pub frame_index: u64,
    pub detected_at: SystemTime,
    pub analysis: AnalysisResult,
}

pub trait TriggerSink {
    fn notify(&mut self, event: &ChimeEvent) -> Result<(), SinkError>;

    fn name(&self) -> &'static str {
        "unknown_sink"
    }
}

/// Prints a one-line notice per event.
pub struct ConsoleSink<W: Write = std::io::Stdout> {
    out: W,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TriggerSink for ConsoleSink<W> {
    fn notify(&mut self, event: &ChimeEvent) -> Result<(), SinkError> {
        writeln!(
            self.out,
            "🔔 chime detected (event #{}, frame {}, loudness {:.1} dBFS, band {:.1} dB)",
            event.sequence,
            event.frame_index,
            event.analysis.loudness_db,
            event.analysis.band_energy_db
        )
        .and_then(|_| self.out.flush())
        .map_err(|err| SinkError::Config(format!("console write failed: {err}")))
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

/// Fans one event out to several sinks.
///
/// Every sink is attempted even if an earlier one fails; the first error is
/// returned once all have run.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn TriggerSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn TriggerSink>>) -> Self {
        Self { sinks }
    }
}

impl TriggerSink for MultiSink {
    fn notify(&mut self, event: &ChimeEvent) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(err) = sink.notify(event) {
                warn!(sink = sink.name(), error = %err, "sink failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "multi"
    }
}
