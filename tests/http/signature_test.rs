//! Tests for webhook HMAC-SHA256 verification in `src/http/mod.rs`.

use axum::http::{HeaderMap, HeaderValue};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use remobot::http::verify_signature;

fn sign(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn headers_with(signature: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-hub-signature-256",
        HeaderValue::from_str(signature).expect("valid header value"),
    );
    headers
}

#[test]
fn valid_signature_passes() {
    let body = br#"{"object":"whatsapp_business_account"}"#;
    let headers = headers_with(&sign(body, "app-secret"));
    verify_signature(&headers, body, "app-secret").expect("signature should verify");
}

#[test]
fn wrong_secret_fails() {
    let body = b"payload";
    let headers = headers_with(&sign(body, "other-secret"));
    assert!(verify_signature(&headers, body, "app-secret").is_err());
}

#[test]
fn tampered_body_fails() {
    let headers = headers_with(&sign(b"original", "app-secret"));
    assert!(verify_signature(&headers, b"tampered", "app-secret").is_err());
}

#[test]
fn missing_header_fails() {
    let headers = HeaderMap::new();
    let err = verify_signature(&headers, b"x", "s").expect_err("should fail");
    assert!(err.contains("missing"));
}

#[test]
fn malformed_header_fails() {
    let headers = headers_with("md5=abcdef");
    assert!(verify_signature(&headers, b"x", "s").is_err());

    let headers = headers_with("sha256=zzzz");
    assert!(verify_signature(&headers, b"x", "s").is_err());
}
