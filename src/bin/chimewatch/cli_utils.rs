use anyhow::{Context, Result};
use chimewatch::audio::InputDevice;
use chimewatch::config::AppConfig;
use chimewatch::sink::{DeviceSummary, SwitchBotClient};

pub(crate) fn list_input_devices() -> Result<()> {
    // Support CHIMEWATCH_TEST_DEVICES for testing
    let devices = if let Ok(raw) = std::env::var("CHIMEWATCH_TEST_DEVICES") {
        parse_device_list(&raw)
    } else {
        InputDevice::list_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Available audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
    Ok(())
}

fn parse_device_list(raw: &str) -> Vec<String> {
    raw.trim()
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub(crate) fn list_switchbot_devices(config: &AppConfig) -> Result<()> {
    let credentials = config
        .switchbot_credentials()
        .context("SwitchBot credentials are required to list devices")?;
    let client = SwitchBotClient::new(
        &config.switchbot_base_url,
        credentials,
        config.switchbot_timeout(),
    )?;
    let devices = client
        .list_devices()
        .context("failed to list SwitchBot devices")?;

    if devices.is_empty() {
        println!("No SwitchBot devices registered.");
    } else {
        println!("SwitchBot devices:");
        for device in &devices {
            println!("  - {}", format_switchbot_device(device));
        }
    }
    Ok(())
}

fn format_switchbot_device(device: &DeviceSummary) -> String {
    match device.device_type.as_deref() {
        Some(kind) => format!("{} ({}, {kind})", device.device_id, device.device_name),
        None => format!("{} ({})", device.device_id, device.device_name),
    }
}
