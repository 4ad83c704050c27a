//! Tests for the signature engine.
//!
//! The signature is pure and deterministic: same secret, timestamp and
//! body always produce the same hex digest, and any changed byte
//! produces a different one.

use lumio_webhooks::crypto::{decrypt_secret, encrypt_secret, sign_payload, verify_signature};

const SECRET: &str = "whsec_test_secret_key_12345";
const TIMESTAMP: &str = "1754500000000";

#[test]
fn signature_is_deterministic() {
    let body = br#"{"event":"USER_CREATED","data":{"userId":"u1"}}"#;

    let first = sign_payload(SECRET, TIMESTAMP, body);
    let second = sign_payload(SECRET, TIMESTAMP, body);

    assert_eq!(first, second);
}

#[test]
fn signature_is_hex_encoded_sha256() {
    let sig = sign_payload(SECRET, TIMESTAMP, b"payload");

    assert_eq!(sig.len(), 64, "SHA-256 digest is 64 hex characters");
    assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(sig, sig.to_lowercase(), "hex encoding is lowercase");
}

#[test]
fn changing_any_payload_byte_changes_signature() {
    let base = sign_payload(SECRET, TIMESTAMP, b"{\"userId\":\"u1\"}");

    assert_ne!(base, sign_payload(SECRET, TIMESTAMP, b"{\"userId\":\"u2\"}"));
    assert_ne!(base, sign_payload(SECRET, TIMESTAMP, b"{\"userId\":\"u1\"} "));
    assert_ne!(base, sign_payload(SECRET, TIMESTAMP, b""));
}

#[test]
fn changing_secret_or_timestamp_changes_signature() {
    let base = sign_payload(SECRET, TIMESTAMP, b"payload");

    assert_ne!(base, sign_payload("whsec_other", TIMESTAMP, b"payload"));
    assert_ne!(base, sign_payload(SECRET, "1754500000001", b"payload"));
}

#[test]
fn receiver_side_verification_accepts_genuine_signature() {
    let body = br#"{"event":"COURSE_PUBLISHED","data":{"courseId":"c42"}}"#;
    let sig = sign_payload(SECRET, TIMESTAMP, body);

    assert!(verify_signature(&sig, SECRET, TIMESTAMP, body));
}

#[test]
fn receiver_side_verification_rejects_tampering() {
    let body = br#"{"event":"COURSE_PUBLISHED","data":{"courseId":"c42"}}"#;
    let sig = sign_payload(SECRET, TIMESTAMP, body);

    // Tampered body
    assert!(!verify_signature(
        &sig,
        SECRET,
        TIMESTAMP,
        br#"{"event":"COURSE_PUBLISHED","data":{"courseId":"c43"}}"#
    ));
    // Replayed signature under a different timestamp
    assert!(!verify_signature(&sig, SECRET, "1754500099999", body));
    // Wrong secret
    assert!(!verify_signature(&sig, "whsec_other", TIMESTAMP, body));
    // Not a signature at all
    assert!(!verify_signature("deadbeef", SECRET, TIMESTAMP, body));
}

#[test]
fn stored_secret_roundtrips_through_encryption() {
    let key = [0x42u8; 32];

    let sealed = encrypt_secret(SECRET, &key).unwrap();
    assert_ne!(sealed, SECRET, "secret is not stored in plaintext");
    assert_eq!(decrypt_secret(&sealed, &key).unwrap(), SECRET);
}

#[test]
fn signing_works_with_decrypted_secret() {
    let key = [0x42u8; 32];
    let sealed = encrypt_secret(SECRET, &key).unwrap();
    let recovered = decrypt_secret(&sealed, &key).unwrap();

    assert_eq!(
        sign_payload(&recovered, TIMESTAMP, b"body"),
        sign_payload(SECRET, TIMESTAMP, b"body"),
    );
}
