//! Integration tests for `src/services/`.

#[path = "services/budget_test.rs"]
mod budget_test;
#[path = "services/dates_test.rs"]
mod dates_test;
#[path = "services/launch_test.rs"]
mod launch_test;
#[path = "services/notification_test.rs"]
mod notification_test;
#[path = "services/payment_test.rs"]
mod payment_test;
#[path = "services/report_test.rs"]
mod report_test;
#[path = "services/roles_test.rs"]
mod roles_test;
#[path = "services/templates_test.rs"]
mod templates_test;
