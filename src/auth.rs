//! Signed request envelopes
//!
//! Every mutating call arrives wrapped in a `SignedRequest`: the sender's
//! Ed25519 public key, a per-sender nonce, a timestamp and a signature over
//! the request path plus the JSON payload. The caller address handed to the
//! engine is derived from the verified key, never taken from the body.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::wager::Address;

/// Requests older than this are rejected
pub const REQUEST_EXPIRY_SECS: u64 = 300;

/// Tolerated clock skew for timestamps in the future
pub const MAX_CLOCK_SKEW_SECS: u64 = 60;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    InvalidPubkey(String),
    InvalidSignature(String),
    SignatureMismatch,
    Expired { timestamp: u64, now: u64 },
    StaleNonce { last: u64, got: u64 },
    InvalidPayload(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidPubkey(msg) => write!(f, "Invalid pubkey: {}", msg),
            AuthError::InvalidSignature(msg) => write!(f, "Invalid signature: {}", msg),
            AuthError::SignatureMismatch => write!(f, "Signature does not match request"),
            AuthError::Expired { timestamp, now } => {
                write!(f, "Request timestamp {} outside the accepted window at {}", timestamp, now)
            }
            AuthError::StaleNonce { last, got } => {
                write!(f, "Nonce {} already used (last accepted {})", got, last)
            }
            AuthError::InvalidPayload(msg) => write!(f, "Invalid payload: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

// ============================================================================
// ADDRESSES
// ============================================================================

/// `0x` + the last 20 bytes of SHA-256(pubkey)
pub fn address_from_pubkey(key: &VerifyingKey) -> Address {
    let digest = Sha256::digest(key.as_bytes());
    Address::new(format!("0x{}", hex::encode(&digest[12..])))
}

// ============================================================================
// ENVELOPE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedRequest {
    /// Sender's Ed25519 public key (64 hex chars)
    pub sender_pubkey: String,
    /// Must be greater than the last nonce accepted from this sender
    pub nonce: u64,
    /// Unix seconds when the request was signed
    pub timestamp: u64,
    #[serde(default = "empty_payload")]
    pub payload: Value,
    /// Ed25519 signature (128 hex chars)
    pub signature: String,
}

fn empty_payload() -> Value {
    Value::Object(Default::default())
}

impl SignedRequest {
    /// Signs `payload` for `path`; what a client does before POSTing
    pub fn sign(key: &SigningKey, path: &str, nonce: u64, timestamp: u64, payload: Value) -> Self {
        let mut request = SignedRequest {
            sender_pubkey: hex::encode(key.verifying_key().as_bytes()),
            nonce,
            timestamp,
            payload,
            signature: String::new(),
        };
        let signature = key.sign(&request.signing_bytes(path));
        request.signature = hex::encode(signature.to_bytes());
        request
    }

    /// SHA256(len(path) || path || nonce || timestamp || pubkey || payload_json)
    pub fn signing_bytes(&self, path: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update((path.len() as u32).to_be_bytes());
        hasher.update(path.as_bytes());
        hasher.update(self.nonce.to_be_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        if let Ok(pubkey_bytes) = hex::decode(&self.sender_pubkey) {
            hasher.update(&pubkey_bytes);
        }
        hasher.update(serde_json::to_vec(&self.payload).unwrap_or_default());
        hasher.finalize().to_vec()
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, AuthError> {
        let pubkey_bytes = hex::decode(&self.sender_pubkey).map_err(|e| AuthError::InvalidPubkey(e.to_string()))?;
        let pubkey_array: [u8; 32] = pubkey_bytes
            .try_into()
            .map_err(|b: Vec<u8>| AuthError::InvalidPubkey(format!("Expected 32 bytes, got {}", b.len())))?;
        VerifyingKey::from_bytes(&pubkey_array).map_err(|e| AuthError::InvalidPubkey(e.to_string()))
    }

    /// Checks the signature against `path` and returns the sender's address
    pub fn verify(&self, path: &str) -> Result<Address, AuthError> {
        let verifying_key = self.verifying_key()?;

        let sig_bytes = hex::decode(&self.signature).map_err(|e| AuthError::InvalidSignature(e.to_string()))?;
        let sig_array: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|b: Vec<u8>| AuthError::InvalidSignature(format!("Expected 64 bytes, got {}", b.len())))?;
        let signature = Signature::from_bytes(&sig_array);

        verifying_key
            .verify(&self.signing_bytes(path), &signature)
            .map_err(|_| AuthError::SignatureMismatch)?;
        Ok(address_from_pubkey(&verifying_key))
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.timestamp > now.saturating_add(MAX_CLOCK_SKEW_SECS)
            || now > self.timestamp.saturating_add(REQUEST_EXPIRY_SECS)
    }

    /// Expiry, then signature
    pub fn validate(&self, path: &str, now: u64) -> Result<Address, AuthError> {
        if self.is_expired_at(now) {
            return Err(AuthError::Expired { timestamp: self.timestamp, now });
        }
        self.verify(path)
    }
}

// ============================================================================
// NONCES
// ============================================================================

/// Highest accepted nonce per sender
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NonceRegistry {
    last: BTreeMap<Address, u64>,
}

impl NonceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_nonce(&self, sender: &Address) -> Option<u64> {
        self.last.get(sender).copied()
    }

    pub fn check_and_record(&mut self, sender: &Address, nonce: u64) -> Result<(), AuthError> {
        if let Some(&last) = self.last.get(sender) {
            if nonce <= last {
                return Err(AuthError::StaleNonce { last, got: nonce });
            }
        }
        self.last.insert(sender.clone(), nonce);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: u64 = 1_700_000_000;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn test_sign_and_verify() {
        let alice = key(1);
        let req = SignedRequest::sign(&alice, "/markets/1/accept", 1, NOW, json!({ "amount": "0.5" }));
        assert_eq!(req.signature.len(), 128);
        let caller = req.validate("/markets/1/accept", NOW).unwrap();
        assert_eq!(caller, address_from_pubkey(&alice.verifying_key()));
        assert_eq!(caller.as_str().len(), 42);
    }

    #[test]
    fn test_signature_bound_to_path_and_payload() {
        let alice = key(1);
        let req = SignedRequest::sign(&alice, "/markets/1/accept", 1, NOW, json!({ "amount": "0.5" }));
        assert_eq!(req.verify("/markets/2/accept"), Err(AuthError::SignatureMismatch));

        let mut tampered = req.clone();
        tampered.payload = json!({ "amount": "5" });
        assert_eq!(tampered.verify("/markets/1/accept"), Err(AuthError::SignatureMismatch));
    }

    #[test]
    fn test_swapped_pubkey_rejected() {
        let alice = key(1);
        let mallory = key(2);
        let mut req = SignedRequest::sign(&mallory, "/admin/withdraw-fees", 1, NOW, json!({}));
        req.sender_pubkey = hex::encode(alice.verifying_key().as_bytes());
        assert_eq!(req.verify("/admin/withdraw-fees"), Err(AuthError::SignatureMismatch));

        req.sender_pubkey = "abcd".into();
        assert!(matches!(req.verify("/admin/withdraw-fees"), Err(AuthError::InvalidPubkey(_))));
    }

    #[test]
    fn test_expiry_window() {
        let req = SignedRequest::sign(&key(3), "/x", 1, NOW, json!({}));
        assert!(!req.is_expired_at(NOW + REQUEST_EXPIRY_SECS));
        assert!(req.is_expired_at(NOW + REQUEST_EXPIRY_SECS + 1));
        assert!(!req.is_expired_at(NOW - MAX_CLOCK_SKEW_SECS));
        assert!(req.is_expired_at(NOW - MAX_CLOCK_SKEW_SECS - 1));
        assert!(matches!(req.validate("/x", NOW + 10_000), Err(AuthError::Expired { .. })));
    }

    #[test]
    fn test_missing_payload_defaults_to_empty_object() {
        let signed = SignedRequest::sign(&key(4), "/markets/3/leave", 9, NOW, json!({}));
        let mut body = serde_json::to_value(&signed).unwrap();
        body.as_object_mut().unwrap().remove("payload");
        let parsed: SignedRequest = serde_json::from_value(body).unwrap();
        assert!(parsed.verify("/markets/3/leave").is_ok());
    }

    #[test]
    fn test_nonces_strictly_increase() {
        let mut nonces = NonceRegistry::new();
        let a = Address::new("0xa");
        nonces.check_and_record(&a, 5).unwrap();
        assert_eq!(nonces.check_and_record(&a, 5), Err(AuthError::StaleNonce { last: 5, got: 5 }));
        assert!(nonces.check_and_record(&a, 4).is_err());
        nonces.check_and_record(&a, 6).unwrap();
        nonces.check_and_record(&Address::new("0xb"), 1).unwrap();
        assert_eq!(nonces.last_nonce(&a), Some(6));
    }
}
