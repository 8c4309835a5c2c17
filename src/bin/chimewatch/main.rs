//! chimewatch entrypoint: listens on the microphone (or replays a WAV file)
//! and fires the configured trigger sink when a doorbell chime is heard.
//!
//! # Architecture
//!
//! - Capture callback: re-chunks device buffers into fixed frames
//! - Detection loop (main thread): analysis, threshold/cooldown decision, sink
//! - Signal handlers: raise a stop flag checked once per frame

mod cli_utils;
mod signals;

use anyhow::{bail, Context, Result};
use chimewatch::audio::{negotiate_sample_rate, FrameSource, InputDevice, PcmFrameSource};
use chimewatch::config::AppConfig;
use chimewatch::detector::DetectorConfig;
use chimewatch::init_tracing;
use chimewatch::monitor::{Monitor, MonitorMetrics, StopReason};
use chimewatch::sink::{ConsoleSink, MultiSink, SwitchBotClient, SwitchBotSink, TriggerSink};
use clap::Parser;
use tracing::{info, warn};

use crate::cli_utils::{list_input_devices, list_switchbot_devices};
use crate::signals::{install_stop_handlers, stop_flag};

fn main() -> Result<()> {
    let mut config = AppConfig::parse();
    if config.list_input_devices {
        list_input_devices()?;
        return Ok(());
    }

    config.validate()?;
    init_tracing(&config);

    if config.list_switchbot_devices {
        return list_switchbot_devices(&config);
    }

    install_stop_handlers()?;
    let mut sink = build_sink(&config)?;

    let metrics = match &config.replay {
        Some(path) => {
            let mut source = PcmFrameSource::from_wav(path, config.block_size)?;
            let detector = config.detector_config(source.sample_rate());
            info!(path = %path.display(), frames = source.remaining_frames(), "replaying recording");
            let metrics = run_monitor(&config, &detector, &mut source, sink.as_mut());
            println!(
                "replay finished: {} frames, {} trigger(s)",
                metrics.frames_processed, metrics.triggers
            );
            metrics
        }
        None => {
            let device = InputDevice::new(config.input_device.as_deref())?;
            let rate = negotiate_sample_rate(&device, &config.sample_rates, config.block_size)?;
            let detector = config.detector_config(rate);
            let mut source = device.open_frames(&config.capture_options(rate))?;
            run_monitor(&config, &detector, &mut source, sink.as_mut())
        }
    };

    if metrics.sink_failures > 0 {
        warn!(
            failures = metrics.sink_failures,
            "some triggers could not be delivered"
        );
    }
    match metrics.stop_reason {
        StopReason::CaptureError(reason) => bail!("capture failed: {reason}"),
        StopReason::Stopped | StopReason::SourceExhausted => Ok(()),
    }
}

fn run_monitor(
    config: &AppConfig,
    detector: &DetectorConfig,
    source: &mut dyn FrameSource,
    sink: &mut dyn TriggerSink,
) -> MonitorMetrics {
    info!(
        sample_rate = detector.sample_rate,
        block_size = detector.block_size,
        loudness_threshold_db = detector.loudness_threshold_db,
        band_threshold_db = detector.band_threshold_db,
        band_low_hz = detector.band_low_hz,
        band_high_hz = detector.band_high_hz,
        cooldown_frames = detector.cooldown_frames(),
        sink = config.sink.label(),
        "detector configured"
    );
    let metrics = Monitor::new(detector, config.pace()).run(source, sink, stop_flag());
    info!(
        frames = metrics.frames_processed,
        triggers = metrics.triggers,
        dropped = metrics.frames_dropped,
        reason = metrics.stop_reason.label(),
        "session finished"
    );
    metrics
}

fn build_sink(config: &AppConfig) -> Result<Box<dyn TriggerSink>> {
    let mut sinks: Vec<Box<dyn TriggerSink>> = Vec::new();
    if config.sink.uses_console() {
        sinks.push(Box::new(ConsoleSink::stdout()));
    }
    if config.sink.uses_switchbot() {
        let credentials = config
            .switchbot_credentials()
            .context("SwitchBot credentials missing")?;
        let device_id = config
            .switchbot_device_id
            .clone()
            .context("SwitchBot device id missing")?;
        let client = SwitchBotClient::new(
            &config.switchbot_base_url,
            credentials,
            config.switchbot_timeout(),
        )?;
        let switchbot = SwitchBotSink::new(
            client,
            device_id,
            config.switchbot_secondary_device_id.clone(),
            config.switchbot_command.clone(),
        );
        info!(targets = ?switchbot.targets(), command = %config.switchbot_command, "switchbot sink ready");
        sinks.push(Box::new(switchbot));
    }

    if sinks.len() == 1 {
        if let Some(only) = sinks.pop() {
            return Ok(only);
        }
    }
    Ok(Box::new(MultiSink::new(sinks)))
}
