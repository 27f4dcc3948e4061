//! Tests for callback-data encoding in `src/telegram/callbacks.rs`.

use remobot::domain::{BudgetCategory, PaymentStatus, RenovationType, RoleType, StageStatus};
use remobot::telegram::callbacks::{Callback, StageAction};

#[test]
fn encode_parse_round_trip() {
    let samples = vec![
        Callback::ProjectSelect(42),
        Callback::ProjectLink(7),
        Callback::ProjectDelete(3),
        Callback::WizardType(RenovationType::Standard),
        Callback::WizardItemToggle("kitchen".to_owned()),
        Callback::WizardItemsDone,
        Callback::WizardConfirm,
        Callback::WizardCancel,
        Callback::StageOpen(11),
        Callback::StageAction(StageAction::Duration, 11),
        Callback::StageStatus(StageStatus::InProgress, 11),
        Callback::PaymentStatus(PaymentStatus::Verified, 11),
        Callback::CheckpointApprove(6),
        Callback::CheckpointReject(6),
        Callback::InviteRole(RoleType::Foreman),
        Callback::ExpenseCategory(BudgetCategory::Tiling),
        Callback::ExpenseConfirm(99),
    ];

    for callback in samples {
        let encoded = callback.encode();
        let parsed = Callback::parse(&encoded).expect("payload should parse back");
        assert_eq!(parsed, callback, "payload: {encoded}");
    }
}

#[test]
fn payloads_use_the_documented_prefixes() {
    assert_eq!(Callback::StageOpen(5).encode(), "stg:5");
    assert_eq!(
        Callback::PaymentStatus(PaymentStatus::Paid, 12).encode(),
        "bpysts:paid:12"
    );
    assert_eq!(Callback::ProjectSelect(8).encode(), "prjsel:8");
}

#[test]
fn payloads_stay_under_sixty_four_bytes() {
    let worst_cases = [
        Callback::StageStatus(StageStatus::InProgress, i64::MAX).encode(),
        Callback::PaymentStatus(PaymentStatus::InProgress, i64::MAX).encode(),
        Callback::StageAction(StageAction::Responsible, i64::MAX).encode(),
        Callback::InviteRole(RoleType::Tradesperson).encode(),
    ];
    for payload in worst_cases {
        assert!(payload.len() <= 64, "too long: {payload}");
    }
}

#[test]
fn unknown_and_malformed_payloads_parse_to_none() {
    assert!(Callback::parse("nonsense").is_none());
    assert!(Callback::parse("stg:abc").is_none());
    assert!(Callback::parse("ststs:flying:1").is_none());
    assert!(Callback::parse("").is_none());
}
