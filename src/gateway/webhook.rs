//! Webhook authenticity. The gateway signs the raw request body with a
//! shared secret and sends `t=<unix-ts>,v1=<hex-hmac>` in the signature
//! header; the HMAC covers `"{timestamp}.{raw_body}"`. Verification must run
//! on the raw bytes before any payload parsing, and a stale timestamp is as
//! fatal as a bad digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::GatewayError;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verify a signed gateway notification.
///
/// Returns `Ok(())` only when the header parses, the timestamp is within
/// `tolerance` seconds of now, and the digest matches. Every failure mode
/// collapses to `WebhookVerificationFailed` so callers cannot leak which
/// check rejected the payload.
pub fn verify_webhook_signature(
    raw_body: &str,
    signature: &str,
    webhook_secret: &str,
    tolerance: Option<i64>,
) -> Result<(), GatewayError> {
    let (timestamp, received_hex) = split_signature_header(signature)?;

    let sent_at = timestamp
        .parse::<i64>()
        .map_err(|_| GatewayError::WebhookVerificationFailed)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| GatewayError::WebhookVerificationFailed)?
        .as_secs() as i64;
    if (now - sent_at).abs() > tolerance.unwrap_or(DEFAULT_TOLERANCE_SECS) {
        return Err(GatewayError::WebhookVerificationFailed);
    }

    let expected = sign_payload(timestamp, raw_body, webhook_secret)?;
    let received =
        hex::decode(received_hex).map_err(|_| GatewayError::WebhookVerificationFailed)?;

    if constant_time_eq(&expected, &received) {
        Ok(())
    } else {
        Err(GatewayError::WebhookVerificationFailed)
    }
}

/// Compute the HMAC the gateway would have produced for this body.
pub fn sign_payload(
    timestamp: &str,
    raw_body: &str,
    webhook_secret: &str,
) -> Result<Vec<u8>, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|_| GatewayError::WebhookVerificationFailed)?;
    mac.update(format!("{timestamp}.{raw_body}").as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn split_signature_header(signature: &str) -> Result<(&str, &str), GatewayError> {
    let mut timestamp = None;
    let mut digest = None;
    for part in signature.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            digest = Some(v);
        }
    }
    match (timestamp, digest) {
        (Some(t), Some(v)) => Ok((t, v)),
        _ => Err(GatewayError::WebhookVerificationFailed),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forge(body: &str, timestamp: i64, secret: &str) -> String {
        let digest = sign_payload(&timestamp.to_string(), body, secret).unwrap();
        format!("t={},v1={}", timestamp, hex::encode(digest))
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    #[test]
    fn accepts_freshly_signed_payload() {
        let body = r#"{"type":"transfer.created","data":{"object":{"id":"tr_123"}}}"#;
        let signature = forge(body, now(), "whsec_test_secret");
        assert!(verify_webhook_signature(body, &signature, "whsec_test_secret", None).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let signature = forge(r#"{"amount":100}"#, now(), "whsec_test_secret");
        let result =
            verify_webhook_signature(r#"{"amount":999}"#, &signature, "whsec_test_secret", None);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_wrong_secret_and_garbage_digest() {
        let body = r#"{"type":"account.updated"}"#;
        let signature = forge(body, now(), "whsec_other_secret");
        assert!(verify_webhook_signature(body, &signature, "whsec_test_secret", None).is_err());

        let garbage = format!("t={},v1=not_even_hex", now());
        assert!(verify_webhook_signature(body, &garbage, "whsec_test_secret", None).is_err());
    }

    #[test]
    fn rejects_stale_timestamp_even_with_valid_digest() {
        let body = r#"{"type":"account.updated"}"#;
        let signature = forge(body, 1_000_000, "whsec_test_secret");
        assert!(
            verify_webhook_signature(body, &signature, "whsec_test_secret", Some(300)).is_err()
        );
    }

    #[test]
    fn rejects_header_missing_parts() {
        let body = "{}";
        assert!(verify_webhook_signature(body, "v1=abcd", "s", None).is_err());
        assert!(verify_webhook_signature(body, "t=123", "s", None).is_err());
        assert!(verify_webhook_signature(body, "", "s", None).is_err());
    }
}
