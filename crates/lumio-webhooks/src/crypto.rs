//! Cryptographic operations: payload signing and secrets at rest.
//!
//! The signature covers `{timestamp}.{body}` so a receiver can reject
//! stale timestamps (replay protection is the receiver's call). Signing
//! secrets are stored AES-256-GCM encrypted and decrypted just-in-time
//! by the delivery executor.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::WebhookError;

/// Nonce size for AES-GCM (96 bits).
const NONCE_SIZE: usize = 12;

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// HMAC-SHA256 payload signing
// ---------------------------------------------------------------------------

/// Sign a delivery body with the subscriber's secret.
///
/// Deterministic: the hex digest of HMAC-SHA256 over
/// `{timestamp}.{body}`, keyed by the secret. `timestamp` is the same
/// unix-millisecond string carried in the `X-Webhook-Timestamp` header.
#[must_use]
pub fn sign_payload(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");

    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature in constant time.
///
/// Receiver-side helper; the engine itself only signs.
#[must_use]
pub fn verify_signature(expected_hex: &str, secret: &str, timestamp: &str, body: &[u8]) -> bool {
    let computed = sign_payload(secret, timestamp, body);
    constant_time_eq(expected_hex.as_bytes(), computed.as_bytes())
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

// ---------------------------------------------------------------------------
// AES-256-GCM for signing secrets at rest
// ---------------------------------------------------------------------------

/// Encrypt a plaintext signing secret for storage.
///
/// Output format: base64(nonce || ciphertext || auth tag).
pub fn encrypt_secret(plaintext: &str, key: &[u8]) -> Result<String, WebhookError> {
    let cipher = build_cipher(key)?;

    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(&out))
}

/// Decrypt a stored signing secret back to plaintext.
pub fn decrypt_secret(encoded: &str, key: &[u8]) -> Result<String, WebhookError> {
    let cipher = build_cipher(key)?;

    let sealed = BASE64
        .decode(encoded)
        .map_err(|e| WebhookError::EncryptionFailed(format!("Base64 decode failed: {e}")))?;

    if sealed.len() <= NONCE_SIZE {
        return Err(WebhookError::EncryptionFailed(
            "Sealed secret is too short".to_string(),
        ));
    }

    let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
    let plaintext = cipher
        .decrypt(nonce, &sealed[NONCE_SIZE..])
        .map_err(|e| WebhookError::EncryptionFailed(e.to_string()))?;

    String::from_utf8(plaintext).map_err(|e| WebhookError::EncryptionFailed(e.to_string()))
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm, WebhookError> {
    if key.len() != 32 {
        return Err(WebhookError::EncryptionFailed(format!(
            "Invalid key length: expected 32 bytes, got {}",
            key.len()
        )));
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| WebhookError::EncryptionFailed(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [0x5au8; 32]
    }

    // --- signing ---

    #[test]
    fn test_sign_payload_deterministic() {
        let a = sign_payload("whsec_1", "1754500000000", b"{\"event\":\"USER_CREATED\"}");
        let b = sign_payload("whsec_1", "1754500000000", b"{\"event\":\"USER_CREATED\"}");
        assert_eq!(a, b);
    }

    #[test]
    fn test_sign_payload_is_hex_sha256() {
        let sig = sign_payload("secret", "1754500000000", b"body");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_signature_changes_with_any_input() {
        let base = sign_payload("secret", "1754500000000", b"body");
        assert_ne!(base, sign_payload("secret2", "1754500000000", b"body"));
        assert_ne!(base, sign_payload("secret", "1754500000001", b"body"));
        assert_ne!(base, sign_payload("secret", "1754500000000", b"bodY"));
    }

    #[test]
    fn test_verify_signature_roundtrip() {
        let sig = sign_payload("s", "1754500000000", b"payload");
        assert!(verify_signature(&sig, "s", "1754500000000", b"payload"));
        assert!(!verify_signature(&sig, "s", "1754500000000", b"tampered"));
        assert!(!verify_signature("deadbeef", "s", "1754500000000", b"payload"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    // --- secrets at rest ---

    #[test]
    fn test_secret_roundtrip() {
        let sealed = encrypt_secret("whsec_roundtrip", &test_key()).unwrap();
        assert_eq!(decrypt_secret(&sealed, &test_key()).unwrap(), "whsec_roundtrip");
    }

    #[test]
    fn test_encryption_is_randomized() {
        let a = encrypt_secret("same", &test_key()).unwrap();
        let b = encrypt_secret("same", &test_key()).unwrap();
        assert_ne!(a, b);
        assert_eq!(
            decrypt_secret(&a, &test_key()).unwrap(),
            decrypt_secret(&b, &test_key()).unwrap()
        );
    }

    #[test]
    fn test_wrong_key_rejected() {
        let sealed = encrypt_secret("secret", &test_key()).unwrap();
        assert!(decrypt_secret(&sealed, &[0x00u8; 32]).is_err());
    }

    #[test]
    fn test_short_key_rejected() {
        let err = encrypt_secret("secret", &[0u8; 16]).unwrap_err();
        assert!(err.to_string().contains("Invalid key length"));
    }

    #[test]
    fn test_garbage_ciphertext_rejected() {
        assert!(decrypt_secret("%%%not-base64%%%", &test_key()).is_err());
        assert!(decrypt_secret(&BASE64.encode([0u8; 4]), &test_key()).is_err());
    }
}
