//! Integration tests for `src/http/` request verification.

#[path = "http/signature_test.rs"]
mod signature_test;
