//! Tests for report building and quick commands in
//! `src/services/report.rs`.

use chrono::{Duration, Utc};

use remobot::domain::{PaymentStatus, Stage, StageStatus};
use remobot::services::report::{
    build_deadline_report, build_status_report, build_weekly_report, parse_quick_command,
    QuickCommand,
};

fn test_stage(order: i32, name: &str, status: StageStatus) -> Stage {
    Stage {
        id: i64::from(order),
        project_id: 1,
        name: name.to_owned(),
        order,
        status,
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
fn weekly_report_classifies_stages() {
    let now = Utc::now();

    let completed = test_stage(1, "Демонтаж", StageStatus::Completed);
    let mut current = test_stage(2, "Электрика", StageStatus::InProgress);
    current.end_date = Some(now + Duration::days(10));
    let mut overdue = test_stage(3, "Сантехника", StageStatus::InProgress);
    overdue.end_date = Some(now - Duration::days(4));
    let mut upcoming = test_stage(4, "Штукатурка", StageStatus::Planned);
    upcoming.start_date = Some(now + Duration::days(3));
    let mut far_future = test_stage(5, "Стяжка пола", StageStatus::Planned);
    far_future.start_date = Some(now + Duration::days(30));

    let report = build_weekly_report(
        "Квартира",
        Some(1_000_000.0),
        &[completed, current, overdue, upcoming, far_future],
        400_000.0,
        Vec::new(),
        now,
    );

    assert_eq!(report.stages_summary.total, 5);
    assert_eq!(report.stages_summary.completed, 1);
    assert_eq!(report.stages_summary.in_progress, 2);
    assert_eq!(report.stages_summary.planned, 2);

    assert_eq!(report.overdue_stages.len(), 1);
    assert_eq!(report.overdue_stages[0].days_overdue, 4);

    // Only the stage starting within 7 days is "upcoming".
    assert_eq!(report.upcoming_stages.len(), 1);
    assert_eq!(report.upcoming_stages[0].name, "Штукатурка");
}

#[test]
fn status_report_computes_progress() {
    let stages = vec![
        test_stage(1, "Демонтаж", StageStatus::Completed),
        test_stage(2, "Электрика", StageStatus::Completed),
        test_stage(3, "Сантехника", StageStatus::InProgress),
        test_stage(4, "Штукатурка", StageStatus::Planned),
    ];
    let report = build_status_report("Квартира", &stages, Utc::now());
    assert_eq!(report.total, 4);
    assert_eq!(report.completed, 2);
    assert!((report.progress_pct - 50.0).abs() < f64::EPSILON);
    assert_eq!(report.stages.len(), 4);
}

#[test]
fn deadline_report_buckets_by_urgency() {
    let now = Utc::now();

    let mut overdue = test_stage(1, "Демонтаж", StageStatus::InProgress);
    overdue.end_date = Some(now - Duration::days(2));
    let mut due_soon = test_stage(2, "Электрика", StageStatus::InProgress);
    due_soon.end_date = Some(now + Duration::days(2));
    let mut on_track = test_stage(3, "Сантехника", StageStatus::InProgress);
    on_track.end_date = Some(now + Duration::days(20));
    let mut done = test_stage(4, "Штукатурка", StageStatus::Completed);
    done.end_date = Some(now - Duration::days(1));

    let report = build_deadline_report("Квартира", &[overdue, due_soon, on_track, done], now);
    assert_eq!(report.overdue.len(), 1);
    assert_eq!(report.due_soon.len(), 1);
    assert_eq!(report.on_track.len(), 1);
}

#[test]
fn quick_commands_are_bilingual() {
    assert_eq!(parse_quick_command("бюджет"), Some(QuickCommand::Budget));
    assert_eq!(parse_quick_command("budget"), Some(QuickCommand::Budget));
    assert_eq!(parse_quick_command("Этапы"), Some(QuickCommand::Stages));
    assert_eq!(parse_quick_command("ОТЧЁТ"), Some(QuickCommand::Report));
    assert_eq!(parse_quick_command("отчет"), Some(QuickCommand::Report));
    assert_eq!(
        parse_quick_command("следующий этап"),
        Some(QuickCommand::NextStage)
    );
    assert_eq!(parse_quick_command("мой этап"), Some(QuickCommand::MyStage));
    assert_eq!(parse_quick_command("дедлайн"), Some(QuickCommand::Deadline));
    assert_eq!(parse_quick_command("эксперт"), Some(QuickCommand::Expert));
}

#[test]
fn quick_commands_ignore_free_text() {
    assert_eq!(parse_quick_command("какой бюджет у нас?"), None);
    assert_eq!(parse_quick_command(""), None);
}
