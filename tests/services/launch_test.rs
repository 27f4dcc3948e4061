//! Tests for launch readiness and the stage status table in
//! `src/services/stage.rs`.

use chrono::{Duration, Utc};

use remobot::domain::{PaymentStatus, Stage, StageStatus};
use remobot::services::stage::{
    checkpoint_description, validate_launch_readiness, validate_status_transition,
};

fn test_stage(order: i32, name: &str) -> Stage {
    Stage {
        id: i64::from(order),
        project_id: 1,
        name: name.to_owned(),
        order,
        status: StageStatus::Planned,
        payment_status: PaymentStatus::Recorded,
        budget: None,
        start_date: None,
        end_date: None,
        responsible_user_id: None,
        responsible_contact: None,
        is_parallel: false,
        is_checkpoint: false,
        last_activity_at: Utc::now(),
        created_at: Utc::now(),
    }
}

#[test]
fn project_without_stages_is_not_launchable() {
    let check = validate_launch_readiness(&[]);
    assert!(!check.ready);
}

#[test]
fn first_stage_needs_a_start_date() {
    let stages = vec![test_stage(1, "Демонтаж"), test_stage(2, "Электрика")];
    let check = validate_launch_readiness(&stages);
    assert!(!check.ready);
    assert!(check.warnings[0].contains("дату начала"));
}

#[test]
fn ready_project_lists_nonblocking_warnings() {
    let mut first = test_stage(1, "Демонтаж");
    first.start_date = Some(Utc::now());
    let second = test_stage(2, "Электрика");

    let check = validate_launch_readiness(&[first, second]);
    assert!(check.ready);
    // The first stage misses responsible + budget; the second misses
    // all three.
    assert_eq!(check.warnings.len(), 5);
    assert!(check.warnings.iter().any(|w| w.contains("Электрика")));
}

#[test]
fn parallel_stages_do_not_block_launch() {
    let mut first = test_stage(1, "Демонтаж");
    first.start_date = Some(Utc::now() + Duration::days(1));
    first.responsible_contact = Some("Прораб".to_owned());
    first.budget = Some(100_000.0);

    let mut parallel = test_stage(100, "Кухня → Замер");
    parallel.is_parallel = true;

    let check = validate_launch_readiness(&[first, parallel]);
    assert!(check.ready);
    assert!(check.warnings.is_empty());
}

#[test]
fn status_transitions_follow_the_diagram() {
    use StageStatus::*;

    validate_status_transition(Planned, InProgress).expect("planned → in_progress");
    validate_status_transition(InProgress, Completed).expect("in_progress → completed");
    validate_status_transition(InProgress, Delayed).expect("in_progress → delayed");
    validate_status_transition(Delayed, InProgress).expect("delayed → in_progress");
    validate_status_transition(Delayed, Completed).expect("delayed → completed");
    // Checkpoint rejection path.
    validate_status_transition(Completed, Delayed).expect("completed → delayed");

    assert!(validate_status_transition(Planned, Completed).is_err());
    assert!(validate_status_transition(Completed, InProgress).is_err());
    assert!(validate_status_transition(Planned, Delayed).is_err());
}

#[test]
fn checkpoint_descriptions_cover_the_canonical_stages() {
    assert!(checkpoint_description("Электрика").contains("розеток"));
    assert!(checkpoint_description("Плитка").contains("эксперта"));
    assert!(checkpoint_description("Финальная приёмка").contains("проверка"));
    // Unknown checkpoints get the generic hint.
    assert!(checkpoint_description("Балкон").contains("Контрольная точка"));
}
