use std::f32::consts::PI;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn chimewatch_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_chimewatch").expect("chimewatch test binary not built")
}

fn temp_wav(tag: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("chimewatch_cli_{tag}_{}_{stamp}.wav", std::process::id()))
}

/// 48 kHz mono: `tone_frames` of a 1200 Hz sine, then `silent_frames` of zeros.
fn write_chime_wav(path: &PathBuf, tone_frames: usize, silent_frames: usize) {
    const RATE: u32 = 48_000;
    const BLOCK: usize = 1024;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    for n in 0..tone_frames * BLOCK {
        let phase = 2.0 * PI * 1200.0 * n as f32 / RATE as f32;
        writer.write_sample(0.8 * phase.sin()).expect("write tone");
    }
    for _ in 0..silent_frames * BLOCK {
        writer.write_sample(0.0f32).expect("write silence");
    }
    writer.finalize().expect("finalize wav");
}

#[test]
fn chimewatch_help_mentions_name() {
    let output = Command::new(chimewatch_bin())
        .arg("--help")
        .output()
        .expect("run chimewatch --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("chimewatch"));
    assert!(combined.contains("--loudness-threshold-db"));
}

#[test]
fn chimewatch_list_input_devices_uses_test_override() {
    let output = Command::new(chimewatch_bin())
        .arg("--list-input-devices")
        .env("CHIMEWATCH_TEST_DEVICES", "USB Mic, Built-in Microphone")
        .output()
        .expect("run chimewatch --list-input-devices");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Available audio input devices"));
    assert!(stdout.contains("  - USB Mic"));
    assert!(stdout.contains("  - Built-in Microphone"));
}

#[test]
fn chimewatch_list_input_devices_reports_empty() {
    let output = Command::new(chimewatch_bin())
        .arg("--list-input-devices")
        .env("CHIMEWATCH_TEST_DEVICES", "")
        .output()
        .expect("run chimewatch --list-input-devices");
    assert!(output.status.success());
    assert!(combined_output(&output).contains("No audio input devices detected"));
}

#[test]
fn chimewatch_rejects_invalid_block_size() {
    let output = Command::new(chimewatch_bin())
        .args(["--block-size", "1000", "--no-logs"])
        .output()
        .expect("run chimewatch with bad block size");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("power of two"));
}

#[test]
fn chimewatch_switchbot_sink_without_credentials_fails() {
    let output = Command::new(chimewatch_bin())
        .args(["--sink", "switchbot", "--no-logs"])
        .env_remove("SWITCHBOT_TOKEN")
        .env_remove("SWITCHBOT_SECRET")
        .env_remove("SWITCHBOT_DEVICE_ID")
        .output()
        .expect("run chimewatch with switchbot sink");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("--switchbot-token"));
}

#[test]
fn chimewatch_replay_reports_one_chime() {
    let path = temp_wav("replay");
    write_chime_wav(&path, 20, 40);

    let output = Command::new(chimewatch_bin())
        .arg("--replay")
        .arg(&path)
        .args(["--pace-ms", "0", "--no-logs"])
        .output()
        .expect("run chimewatch --replay");
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("chime detected").count(), 1);
    assert!(stdout.contains("event #1, frame 0"));
    assert!(stdout.contains("replay finished: 60 frames, 1 trigger(s)"));
}

#[test]
fn chimewatch_replay_of_silence_stays_quiet() {
    let path = temp_wav("silence");
    write_chime_wav(&path, 0, 30);

    let output = Command::new(chimewatch_bin())
        .arg("--replay")
        .arg(&path)
        .args(["--pace-ms", "0", "--no-logs"])
        .output()
        .expect("run chimewatch --replay");
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success(), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("chime detected"));
    assert!(stdout.contains("0 trigger(s)"));
}
