//! HMAC-SHA256 session id signing and constant-time verification.
//!
//! Grounded on `armature-webhooks::signature::WebhookSignature`, simplified to the
//! fixed `id.hex-hmac` format this framework's cookie needs (no timestamp component).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const MIN_SECRET_LEN: usize = 32;

/// Signs and verifies session identifiers against a shared secret.
pub struct SessionSigner {
    secret: Vec<u8>,
}

impl SessionSigner {
    /// Builds a signer, failing with `AppError::Configuration` if the secret is
    /// empty or shorter than 32 bytes.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, AppError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Configuration(format!(
                "session signer secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(Self { secret })
    }

    /// Produces `"<id>.<hex-hmac-sha256>"`.
    pub fn sign(&self, id: &str) -> String {
        let mac = self.compute(id.as_bytes());
        format!("{id}.{}", hex::encode(mac))
    }

    /// Splits on the last `.`, recomputes the MAC, and compares in constant time.
    /// Returns `None` on any malformed input, length mismatch, or signature mismatch.
    pub fn verify(&self, signed: &str) -> Option<String> {
        let dot = signed.rfind('.')?;
        let (id, sig_hex) = (&signed[..dot], &signed[dot + 1..]);
        if id.is_empty() {
            return None;
        }
        let given = hex::decode(sig_hex).ok()?;
        let expected = self.compute(id.as_bytes());

        if given.len() != expected.len() {
            return None;
        }
        if given.ct_eq(&expected).unwrap_u8() == 1 {
            Some(id.to_string())
        } else {
            None
        }
    }

    fn compute(&self, data: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts a key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> SessionSigner {
        SessionSigner::new("0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn rejects_short_secret() {
        assert!(matches!(
            SessionSigner::new("short"),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn round_trip() {
        let s = signer();
        let signed = s.sign("a-session-id");
        assert_eq!(s.verify(&signed).as_deref(), Some("a-session-id"));
    }

    #[test]
    fn tampered_signature_fails() {
        let s = signer();
        let mut signed = s.sign("a-session-id");
        let last = signed.pop().unwrap();
        let flipped = if last == '0' { '1' } else { '0' };
        signed.push(flipped);
        assert!(s.verify(&signed).is_none());
    }

    #[test]
    fn tampered_id_fails() {
        let s = signer();
        let signed = s.sign("a-session-id");
        let tampered = signed.replacen("a-session-id", "b-session-id", 1);
        assert!(s.verify(&tampered).is_none());
    }

    #[test]
    fn malformed_input_fails() {
        let s = signer();
        assert!(s.verify("no-dot-here").is_none());
        assert!(s.verify(".deadbeef").is_none());
    }
}
