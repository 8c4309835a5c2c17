//! Request signing for the SwitchBot cloud API.
//!
//! `sign = UPPER(base64(HMAC-SHA256(secret, token + t + nonce)))`, sent with
//! the token, millisecond timestamp `t`, and a one-time nonce.

use crate::SinkError;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Header values for one signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub token: String,
    pub sign: String,
    pub nonce: String,
    pub t: String,
}

pub fn sign_request(
    token: &str,
    secret: &str,
    t_millis: u64,
    nonce: &str,
) -> Result<SignedHeaders, SinkError> {
    let t = t_millis.to_string();
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| SinkError::Config(format!("invalid signing secret: {err}")))?;
    mac.update(token.as_bytes());
    mac.update(t.as_bytes());
    mac.update(nonce.as_bytes());
    let sign = STANDARD.encode(mac.finalize().into_bytes()).to_uppercase();

    Ok(SignedHeaders {
        token: token.to_string(),
        sign,
        nonce: nonce.to_string(),
        t,
    })
}

/// Sign with the current time and a fresh UUID v4 nonce.
pub(crate) fn sign_now(token: &str, secret: &str) -> Result<SignedHeaders, SinkError> {
    let t_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default();
    sign_request(token, secret, t_millis, &Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_signature() {
        let headers = sign_request(
            "token-abc",
            "secret-key",
            1_700_000_000_000,
            "0f8fad5b-d9cb-469f-a165-70867728950e",
        )
        .unwrap();
        assert_eq!(headers.sign, "RQ08QGHNEFM7R32W3EMXCMYINTYV2MTTFDIOIMNKDWS=");
        assert_eq!(headers.t, "1700000000000");
        assert_eq!(headers.token, "token-abc");
        assert_eq!(headers.nonce, "0f8fad5b-d9cb-469f-a165-70867728950e");
    }

    #[test]
    fn fresh_signatures_use_unique_nonces() {
        let first = sign_now("token", "secret").unwrap();
        let second = sign_now("token", "secret").unwrap();
        assert_ne!(first.nonce, second.nonce);
        assert!(Uuid::parse_str(&first.nonce).is_ok());
        assert!(first.t.parse::<u64>().unwrap() > 1_600_000_000_000);
    }
}
