//! Tests for the payment status machine in `src/services/budget.rs`.

use remobot::domain::{PaymentStatus, StageStatus};
use remobot::services::budget::{
    allowed_payment_transitions, check_payment_risk, validate_payment_transition,
};

#[test]
fn forward_path_is_allowed() {
    let path = [
        (PaymentStatus::Recorded, PaymentStatus::InProgress),
        (PaymentStatus::InProgress, PaymentStatus::Verified),
        (PaymentStatus::Verified, PaymentStatus::Paid),
        (PaymentStatus::Paid, PaymentStatus::Closed),
    ];
    for (from, to) in path {
        validate_payment_transition(from, to).expect("forward transition should be allowed");
    }
}

#[test]
fn rollback_steps_back_exactly_one_state() {
    validate_payment_transition(PaymentStatus::InProgress, PaymentStatus::Recorded)
        .expect("rollback to recorded");
    validate_payment_transition(PaymentStatus::Verified, PaymentStatus::InProgress)
        .expect("rollback to in_progress");
    validate_payment_transition(PaymentStatus::Paid, PaymentStatus::Verified)
        .expect("rollback to verified");

    // Two-step rollbacks are not transitions.
    assert!(validate_payment_transition(PaymentStatus::Paid, PaymentStatus::Recorded).is_err());
    assert!(
        validate_payment_transition(PaymentStatus::Verified, PaymentStatus::Recorded).is_err()
    );
}

#[test]
fn closed_is_terminal() {
    assert!(allowed_payment_transitions(PaymentStatus::Closed).is_empty());
    for next in [
        PaymentStatus::Recorded,
        PaymentStatus::InProgress,
        PaymentStatus::Verified,
        PaymentStatus::Paid,
    ] {
        assert!(validate_payment_transition(PaymentStatus::Closed, next).is_err());
    }
}

#[test]
fn skipping_states_is_rejected() {
    assert!(validate_payment_transition(PaymentStatus::Recorded, PaymentStatus::Paid).is_err());
    assert!(
        validate_payment_transition(PaymentStatus::Recorded, PaymentStatus::Verified).is_err()
    );
    assert!(validate_payment_transition(PaymentStatus::InProgress, PaymentStatus::Paid).is_err());
}

#[test]
fn rejection_message_names_allowed_transitions() {
    let err = validate_payment_transition(PaymentStatus::Recorded, PaymentStatus::Closed)
        .expect_err("should be rejected");
    let message = err.user_message();
    assert!(message.contains("В процессе"), "message: {message}");
}

#[test]
fn paid_before_completion_is_flagged() {
    let risk = check_payment_risk(StageStatus::InProgress, PaymentStatus::Paid)
        .expect("risk should be flagged");
    assert!(risk.contains("не завершён"));
}

#[test]
fn completed_without_payment_is_hinted() {
    assert!(check_payment_risk(StageStatus::Completed, PaymentStatus::Recorded).is_some());
}

#[test]
fn normal_flow_has_no_risk() {
    assert!(check_payment_risk(StageStatus::InProgress, PaymentStatus::Recorded).is_none());
    assert!(check_payment_risk(StageStatus::Completed, PaymentStatus::Closed).is_none());
}
