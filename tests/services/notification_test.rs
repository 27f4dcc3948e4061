//! Tests for notification builders and the recipient policy in
//! `src/services/notification.rs`.

use chrono::{TimeZone, Utc};

use remobot::domain::RoleType;
use remobot::services::notification::{
    build_budget_warning, build_checkpoint_reached, build_deadline_approaching,
    build_deadline_overdue, build_furniture_order_reminder, NotificationType,
};

#[test]
fn deadline_approaching_carries_date_and_recipients() {
    let end = Utc.with_ymd_and_hms(2026, 3, 20, 0, 0, 0).single().expect("valid");
    let n = build_deadline_approaching(
        1,
        "Квартира",
        10,
        "Электрика",
        end,
        Some("Мастер Иван"),
        vec![1, 2, 3],
    );

    assert_eq!(n.notification_type, NotificationType::DeadlineApproaching);
    assert_eq!(n.recipient_user_ids, vec![1, 2, 3]);
    assert_eq!(n.stage_id, Some(10));
    assert!(n.body.contains("20.03.2026"));
    assert!(n.body.contains("Мастер Иван"));
    assert_eq!(n.extra["end_date"], "20.03.2026");
}

#[test]
fn overdue_notification_counts_days() {
    let end = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("valid");
    let n = build_deadline_overdue(1, "Квартира", 10, "Плитка", end, 6, None, vec![1]);
    assert!(n.body.contains("просрочен"));
    assert!(n.body.contains('6'));
    assert_eq!(n.extra["days_overdue"], 6);
}

#[test]
fn checkpoint_goes_to_owners_only() {
    assert_eq!(
        NotificationType::CheckpointReached.recipient_roles(),
        &[RoleType::Owner]
    );

    let n = build_checkpoint_reached(1, "Квартира", 6, "Плитка", vec![42]);
    assert!(n.body.contains("контрольная точка"));
    assert_eq!(n.recipient_user_ids, vec![42]);
}

#[test]
fn deadline_policy_includes_foreman() {
    let roles = NotificationType::DeadlineApproaching.recipient_roles();
    assert!(roles.contains(&RoleType::Owner));
    assert!(roles.contains(&RoleType::CoOwner));
    assert!(roles.contains(&RoleType::Foreman));
    assert!(!roles.contains(&RoleType::Viewer));
}

#[test]
fn status_prompt_has_dynamic_recipients() {
    assert!(NotificationType::StatusUpdateRequest
        .recipient_roles()
        .is_empty());
}

#[test]
fn furniture_reminder_includes_designer() {
    let roles = NotificationType::FurnitureOrderReminder.recipient_roles();
    assert!(roles.contains(&RoleType::Designer));

    let date = Utc.with_ymd_and_hms(2026, 5, 10, 0, 0, 0).single().expect("valid");
    let n = build_furniture_order_reminder(1, "Квартира", 100, "Кухня → Монтаж", date, 40, vec![7]);
    assert!(n.body.contains("40"));
    assert!(n.body.contains("10.05.2026"));
}

#[test]
fn budget_warning_formats_amounts() {
    let n = build_budget_warning(1, "Квартира", 920_000.0, 1_000_000.0, 92.0, vec![1]);
    assert!(n.body.contains("92%"));
    assert!(n.body.contains("920 000"));
    assert!(n.body.contains("1 000 000"));
}
