use thiserror::Error;

/// Failures of the detection core. Both variants end the session.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// None of the candidate rates could open a mono input stream.
    #[error("no supported sample rate found (tried {candidates:?} Hz)")]
    NoSupportedRate { candidates: Vec<u32> },

    /// The live audio source failed mid-stream.
    #[error("audio capture failed: {0}")]
    Capture(String),
}

/// Failures reported by a trigger sink. Never fatal to the detection loop.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote rejected the request (status {status}): {message}")]
    Rejected { status: i64, message: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("sink misconfigured: {0}")]
    Config(String),

    #[error("delivery queue full; event dropped")]
    QueueFull,

    #[error("delivery thread is not running")]
    WorkerStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_supported_rate_lists_candidates() {
        let err = DetectorError::NoSupportedRate {
            candidates: vec![48_000, 44_100],
        };
        assert_eq!(
            err.to_string(),
            "no supported sample rate found (tried [48000, 44100] Hz)"
        );
    }

    #[test]
    fn rejected_includes_status_and_message() {
        let err = SinkError::Rejected {
            status: 190,
            message: "device internal error".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("190"));
        assert!(text.contains("device internal error"));
    }
}
