//! SwitchBot cloud sink: turns detections into device commands.

use super::signing::{sign_now, SignedHeaders};
use super::{ChimeEvent, TriggerSink};
use crate::SinkError;
use crossbeam_channel::{bounded, Sender, TrySendError};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.switch-bot.com/v1.1";

/// `statusCode` the API returns on success.
const STATUS_SUCCESS: i64 = 100;

#[derive(Clone)]
pub struct SwitchBotCredentials {
    pub token: String,
    pub secret: String,
}

impl std::fmt::Debug for SwitchBotCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchBotCredentials")
            .field("token", &redact(&self.token))
            .field("secret", &"***")
            .finish()
    }
}

fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}***")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "deviceName", default)]
    pub device_name: String,
    #[serde(rename = "deviceType", default)]
    pub device_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(rename = "statusCode")]
    status_code: i64,
    #[serde(default)]
    message: String,
    body: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceListBody {
    #[serde(rename = "deviceList", default)]
    device_list: Vec<DeviceSummary>,
}

#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    command: &'a str,
    parameter: &'a str,
    #[serde(rename = "commandType")]
    command_type: &'a str,
}

fn check_status<T>(response: ApiResponse<T>) -> Result<Option<T>, SinkError> {
    if response.status_code == STATUS_SUCCESS {
        Ok(response.body)
    } else {
        Err(SinkError::Rejected {
            status: response.status_code,
            message: response.message,
        })
    }
}

fn header_map(signed: &SignedHeaders) -> Result<HeaderMap, SinkError> {
    fn value(raw: &str, name: &str) -> Result<HeaderValue, SinkError> {
        HeaderValue::from_str(raw)
            .map_err(|_| SinkError::Config(format!("{name} contains characters not allowed in a header")))
    }

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value(&signed.token, "token")?);
    headers.insert(HeaderName::from_static("sign"), value(&signed.sign, "sign")?);
    headers.insert(HeaderName::from_static("nonce"), value(&signed.nonce, "nonce")?);
    headers.insert(HeaderName::from_static("t"), value(&signed.t, "timestamp")?);
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf8"),
    );
    Ok(headers)
}

/// Blocking client for the handful of endpoints the sink needs.
pub struct SwitchBotClient {
    http: Client,
    base_url: String,
    credentials: SwitchBotCredentials,
}

impl SwitchBotClient {
    pub fn new(
        base_url: &str,
        credentials: SwitchBotCredentials,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn signed_headers(&self) -> Result<HeaderMap, SinkError> {
        let signed = sign_now(&self.credentials.token, &self.credentials.secret)?;
        header_map(&signed)
    }

    fn decode<T: DeserializeOwned>(
        response: reqwest::blocking::Response,
    ) -> Result<Option<T>, SinkError> {
        let status = response.status();
        let text = response.text()?;
        let parsed: ApiResponse<T> = serde_json::from_str(&text).map_err(|err| {
            SinkError::InvalidResponse(format!("HTTP {status}: {err}"))
        })?;
        check_status(parsed)
    }

    /// `GET /devices`: every device registered to the account.
    pub fn list_devices(&self) -> Result<Vec<DeviceSummary>, SinkError> {
        let response = self
            .http
            .get(format!("{}/devices", self.base_url))
            .headers(self.signed_headers()?)
            .send()?;
        let body: Option<DeviceListBody> = Self::decode(response)?;
        Ok(body.unwrap_or_default().device_list)
    }

    /// `POST /devices/{id}/commands` with a default-parameter command.
    pub fn send_command(&self, device_id: &str, command: &str) -> Result<(), SinkError> {
        let request = CommandRequest {
            command,
            parameter: "default",
            command_type: "command",
        };
        let response = self
            .http
            .post(format!("{}/devices/{device_id}/commands", self.base_url))
            .headers(self.signed_headers()?)
            .json(&request)
            .send()?;
        let _: Option<serde_json::Value> = Self::decode(response)?;
        Ok(())
    }
}

/// Events waiting for the delivery thread before new ones are dropped.
pub const DELIVERY_QUEUE_CAPACITY: usize = 8;

/// Sends one command per event to a primary device and, when configured, a
/// secondary one.
///
/// `notify` only queues the event. A dedicated thread owns the HTTP client,
/// signs and sends the commands, and logs failures, so the detection loop
/// never waits on the network.
pub struct SwitchBotSink {
    sender: Option<Sender<ChimeEvent>>,
    handle: Option<JoinHandle<()>>,
    targets: Vec<String>,
    failures: Arc<AtomicU64>,
}

impl SwitchBotSink {
    pub fn new(
        client: SwitchBotClient,
        primary_device: String,
        secondary_device: Option<String>,
        command: String,
    ) -> Self {
        Self::with_capacity(
            client,
            primary_device,
            secondary_device,
            command,
            DELIVERY_QUEUE_CAPACITY,
        )
    }

    fn with_capacity(
        client: SwitchBotClient,
        primary_device: String,
        secondary_device: Option<String>,
        command: String,
        queue_capacity: usize,
    ) -> Self {
        let mut targets = vec![primary_device];
        if let Some(secondary) = secondary_device.filter(|id| !id.trim().is_empty()) {
            targets.push(secondary);
        }

        let (sender, receiver) = bounded::<ChimeEvent>(queue_capacity.max(1));
        let failures = Arc::new(AtomicU64::new(0));
        let handle = {
            let targets = targets.clone();
            let failures = failures.clone();
            thread::spawn(move || {
                for event in receiver {
                    if deliver(&client, &targets, &command, &event).is_err() {
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
                debug!("switchbot delivery thread stopped");
            })
        };

        Self {
            sender: Some(sender),
            handle: Some(handle),
            targets,
            failures,
        }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Stop accepting events, wait for queued deliveries, and return the
    /// number of events that failed for at least one target.
    fn finish(&mut self) -> u64 {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("switchbot delivery thread panicked");
            }
            let failures = self.failures.load(Ordering::Relaxed);
            if failures > 0 {
                warn!(failures, "switchbot deliveries failed during session");
            }
        }
        self.failures.load(Ordering::Relaxed)
    }
}

impl Drop for SwitchBotSink {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// Send the command to every target; the first error is returned after all
/// targets have been tried.
fn deliver(
    client: &SwitchBotClient,
    targets: &[String],
    command: &str,
    event: &ChimeEvent,
) -> Result<(), SinkError> {
    let mut first_error = None;
    for device_id in targets {
        match client.send_command(device_id, command) {
            Ok(()) => {
                info!(device_id = %device_id, command = %command, event = event.sequence, "switchbot command sent");
            }
            Err(err) => {
                warn!(device_id = %device_id, error = %err, event = event.sequence, "switchbot command failed");
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl TriggerSink for SwitchBotSink {
    fn notify(&mut self, event: &ChimeEvent) -> Result<(), SinkError> {
        let Some(sender) = &self.sender else {
            return Err(SinkError::WorkerStopped);
        };
        match sender.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(event = event.sequence, "switchbot queue full; event dropped");
                Err(SinkError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(SinkError::WorkerStopped),
        }
    }

    fn name(&self) -> &'static str {
        "switchbot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisResult;
    use std::net::TcpListener;
    use std::time::{Instant, SystemTime};

    fn client(base_url: &str) -> SwitchBotClient {
        SwitchBotClient::new(
            base_url,
            SwitchBotCredentials {
                token: "token".to_string(),
                secret: "secret".to_string(),
            },
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn success_status_returns_body() {
        let json = r#"{"statusCode":100,"message":"success","body":{"deviceList":[
            {"deviceId":"C271111EC0AB","deviceName":"Hall Bot","deviceType":"Bot"}
        ]}}"#;
        let parsed: ApiResponse<DeviceListBody> = serde_json::from_str(json).unwrap();
        let body = check_status(parsed).unwrap().unwrap();
        assert_eq!(
            body.device_list,
            vec![DeviceSummary {
                device_id: "C271111EC0AB".to_string(),
                device_name: "Hall Bot".to_string(),
                device_type: Some("Bot".to_string()),
            }]
        );
    }

    #[test]
    fn non_success_status_is_rejected() {
        let json = r#"{"statusCode":161,"message":"device offline","body":{}}"#;
        let parsed: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        match check_status(parsed) {
            Err(SinkError::Rejected { status, message }) => {
                assert_eq!(status, 161);
                assert_eq!(message, "device offline");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn command_body_uses_api_field_names() {
        let body = serde_json::to_value(CommandRequest {
            command: "turnOn",
            parameter: "default",
            command_type: "command",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"command": "turnOn", "parameter": "default", "commandType": "command"})
        );
    }

    #[test]
    fn header_map_carries_signature_fields() {
        let signed = SignedHeaders {
            token: "tok".to_string(),
            sign: "SIGN=".to_string(),
            nonce: "n-1".to_string(),
            t: "1700000000000".to_string(),
        };
        let headers = header_map(&signed).unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "tok");
        assert_eq!(headers.get("sign").unwrap(), "SIGN=");
        assert_eq!(headers.get("nonce").unwrap(), "n-1");
        assert_eq!(headers.get("t").unwrap(), "1700000000000");
        assert_eq!(
            headers.get("content-type").unwrap(),
            "application/json; charset=utf8"
        );
    }

    #[test]
    fn header_map_rejects_token_with_newline() {
        let signed = SignedHeaders {
            token: "bad\ntoken".to_string(),
            sign: "S".to_string(),
            nonce: "n".to_string(),
            t: "1".to_string(),
        };
        assert!(matches!(header_map(&signed), Err(SinkError::Config(_))));
    }

    #[test]
    fn missing_secondary_device_is_skipped() {
        let sink = SwitchBotSink::new(client(DEFAULT_BASE_URL), "A".to_string(), None, "turnOn".to_string());
        assert_eq!(sink.targets(), ["A".to_string()]);

        let sink = SwitchBotSink::new(
            client(DEFAULT_BASE_URL),
            "A".to_string(),
            Some("  ".to_string()),
            "turnOn".to_string(),
        );
        assert_eq!(sink.targets().len(), 1);

        let sink = SwitchBotSink::new(
            client(DEFAULT_BASE_URL),
            "A".to_string(),
            Some("B".to_string()),
            "turnOn".to_string(),
        );
        assert_eq!(sink.targets(), ["A".to_string(), "B".to_string()]);
    }

    fn sample_event(sequence: u64) -> ChimeEvent {
        ChimeEvent {
            sequence,
            frame_index: 0,
            detected_at: SystemTime::UNIX_EPOCH,
            analysis: AnalysisResult {
                loudness_db: -3.0,
                band_energy_db: 30.0,
            },
        }
    }

    /// Accepts connections and holds them open without ever answering.
    fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => held.push(stream),
                    Err(_) => break,
                }
            }
        });
        format!("http://{addr}/v1.1")
    }

    #[test]
    fn deliver_tries_every_target_and_reports_first_error() {
        // Nothing listens on port 9 of localhost.
        let client = client("http://127.0.0.1:9/v1.1");
        let targets = vec!["A".to_string(), "B".to_string()];
        let result = deliver(&client, &targets, "turnOn", &sample_event(1));
        assert!(matches!(result, Err(SinkError::Http(_))));
    }

    #[test]
    fn failed_deliveries_are_counted_by_the_worker() {
        let mut sink = SwitchBotSink::new(
            client("http://127.0.0.1:9/v1.1"),
            "A".to_string(),
            Some("B".to_string()),
            "turnOn".to_string(),
        );
        assert!(sink.notify(&sample_event(1)).is_ok());
        assert!(sink.notify(&sample_event(2)).is_ok());
        assert_eq!(sink.finish(), 2);
    }

    #[test]
    fn notify_returns_within_a_frame_period_when_api_hangs() {
        let frame_period = Duration::from_secs_f64(1024.0 / 48_000.0);
        let mut sink = SwitchBotSink::new(
            client(&silent_server()),
            "A".to_string(),
            Some("B".to_string()),
            "turnOn".to_string(),
        );

        let started = Instant::now();
        let result = sink.notify(&sample_event(1));
        let took = started.elapsed();

        assert!(result.is_ok());
        assert!(took < frame_period, "notify took {took:?}");
        // Both targets time out on the delivery thread.
        assert_eq!(sink.finish(), 1);
    }

    #[test]
    fn full_queue_drops_event_without_blocking() {
        let mut sink = SwitchBotSink::with_capacity(
            client(&silent_server()),
            "A".to_string(),
            None,
            "turnOn".to_string(),
            1,
        );

        let started = Instant::now();
        let outcomes: Vec<Result<(), SinkError>> =
            (1..=4).map(|seq| sink.notify(&sample_event(seq))).collect();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(SinkError::QueueFull))));
        assert!(outcomes[0].is_ok());
    }

    #[test]
    fn notify_after_shutdown_reports_stopped_worker() {
        let mut sink = SwitchBotSink::new(
            client(DEFAULT_BASE_URL),
            "A".to_string(),
            None,
            "turnOn".to_string(),
        );
        sink.finish();
        assert!(matches!(
            sink.notify(&sample_event(1)),
            Err(SinkError::WorkerStopped)
        ));
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = SwitchBotCredentials {
            token: "abcdefgh".to_string(),
            secret: "very-secret".to_string(),
        };
        let text = format!("{creds:?}");
        assert!(!text.contains("very-secret"));
        assert!(!text.contains("abcdefgh"));
        assert!(text.contains("abcd***"));
    }
}
