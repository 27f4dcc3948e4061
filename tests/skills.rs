//! Integration tests for `src/skills/`.

#[path = "skills/loader_test.rs"]
mod loader_test;
