//! Integration tests for `src/ai/` retrieval logic.

#[path = "retrieval/cache_key_test.rs"]
mod cache_key_test;
#[path = "retrieval/rrf_test.rs"]
mod rrf_test;
#[path = "retrieval/tsquery_test.rs"]
mod tsquery_test;
