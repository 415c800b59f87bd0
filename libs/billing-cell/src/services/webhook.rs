use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::BillingError;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Check a `t=<unix>,v1=<hex>` signature header against the raw request body.
///
/// The signed payload is `"{t}.{body}"`. Any one matching `v1` entry is
/// accepted, and the timestamp must lie within the tolerance of `now`.
/// An empty secret verifies nothing.
pub fn verify_signature(header: &str, payload: &[u8], secret: &str, now: i64) -> Result<(), BillingError> {
    if secret.trim().is_empty() {
        return Err(BillingError::NotConfigured);
    }

    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| BillingError::InvalidSignature("missing timestamp".to_string()))?;

    if signatures.is_empty() {
        return Err(BillingError::InvalidSignature("missing v1 signature".to_string()));
    }

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(BillingError::InvalidSignature("timestamp outside tolerance".to_string()));
    }

    let matched = signatures.iter().any(|expected| {
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(expected).is_ok()
    });

    if matched {
        Ok(())
    } else {
        Err(BillingError::InvalidSignature("no matching signature".to_string()))
    }
}

/// Build a header value the way the provider does. Used by tests and local tooling.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, BillingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BillingError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    let digest = mac.finalize().into_bytes();

    Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
}
