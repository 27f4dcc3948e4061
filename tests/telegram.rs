//! Integration tests for `src/telegram/` pure logic.

#[path = "telegram/callback_test.rs"]
mod callback_test;
#[path = "telegram/format_test.rs"]
mod format_test;
#[path = "telegram/fsm_test.rs"]
mod fsm_test;
#[path = "telegram/gate_test.rs"]
mod gate_test;
