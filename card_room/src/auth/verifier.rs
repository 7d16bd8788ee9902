//! Signature verification behind a trait.
//!
//! The engine never inspects signature bytes itself; it hands the whole
//! envelope to a [`SignatureVerifier`]. Production uses BIP-340 schnorr
//! over the sha256 event id; tests swap in a permissive double.

use super::models::SignedEvent;
use k256::schnorr::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};

pub trait SignatureVerifier: Send + Sync {
    /// Does the envelope's signature verify against its claimed key?
    fn verify(&self, event: &SignedEvent) -> bool;
}

/// BIP-340 schnorr verification: the event id must be the sha256 of the
/// canonical serialization, and the signature must verify over the id
/// under the x-only public key.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchnorrVerifier;

impl SignatureVerifier for SchnorrVerifier {
    fn verify(&self, event: &SignedEvent) -> bool {
        let digest = Sha256::digest(event.canonical_bytes());
        let Ok(claimed) = hex::decode(&event.id) else {
            return false;
        };
        if claimed != digest.as_slice() {
            return false;
        }
        let Ok(pubkey_bytes) = hex::decode(&event.pubkey) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&pubkey_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(&event.sig) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(sig_bytes.as_slice()) else {
            return false;
        };
        key.verify_raw(digest.as_slice(), &signature).is_ok()
    }
}

/// Accepts everything. Test and local-development double only; never
/// wire this into a deployment that holds real chips.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveVerifier;

impl SignatureVerifier for PermissiveVerifier {
    fn verify(&self, _event: &SignedEvent) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::AUTH_EVENT_KIND;
    use k256::schnorr::SigningKey;
    use rand::rngs::OsRng;

    fn signed_event(key: &SigningKey, nonce: &str) -> SignedEvent {
        let pubkey = hex::encode(key.verifying_key().to_bytes());
        let mut event = SignedEvent {
            pubkey,
            created_at: 1_700_000_000,
            kind: AUTH_EVENT_KIND,
            tags: vec![vec!["challenge".to_string(), nonce.to_string()]],
            content: String::new(),
            id: String::new(),
            sig: String::new(),
        };
        let digest = Sha256::digest(event.canonical_bytes());
        event.id = hex::encode(digest);
        let signature = key
            .sign_raw(digest.as_slice(), &[0u8; 32])
            .expect("signing succeeds");
        event.sig = hex::encode(signature.to_bytes());
        event
    }

    #[test]
    fn test_valid_signature_accepted() {
        let key = SigningKey::random(&mut OsRng);
        let event = signed_event(&key, "abcd");
        assert!(SchnorrVerifier.verify(&event));
    }

    #[test]
    fn test_tampered_content_rejected() {
        let key = SigningKey::random(&mut OsRng);
        let mut event = signed_event(&key, "abcd");
        event.content = "evil".to_string();
        assert!(!SchnorrVerifier.verify(&event));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = SigningKey::random(&mut OsRng);
        let other = SigningKey::random(&mut OsRng);
        let mut event = signed_event(&key, "abcd");
        event.pubkey = hex::encode(other.verifying_key().to_bytes());
        // The id still matches the canonical bytes only if recomputed.
        let digest = Sha256::digest(event.canonical_bytes());
        event.id = hex::encode(digest);
        assert!(!SchnorrVerifier.verify(&event));
    }

    #[test]
    fn test_garbage_hex_rejected() {
        let key = SigningKey::random(&mut OsRng);
        let mut event = signed_event(&key, "abcd");
        event.sig = "zz".to_string();
        assert!(!SchnorrVerifier.verify(&event));
    }
}
