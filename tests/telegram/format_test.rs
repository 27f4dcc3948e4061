//! Tests for HTML formatting in `src/telegram/format.rs`.

use chrono::Utc;

use remobot::domain::{PaymentStatus, Project, RenovationType, Stage, StageStatus};
use remobot::services::budget::analyze_budget;
use remobot::services::report::build_status_report;
use remobot::telegram::format::{
    escape_html, format_budget_summary, format_project_card, format_status_report,
};

fn test_project(name: &str) -> Project {
    Project {
        id: 1,
        tenant_id: Some(1),
        name: name.to_owned(),
        address: Some("ул. Абая 10".to_owned()),
        area_sqm: Some(65.0),
        renovation_type: RenovationType::Standard,
        total_budget: Some(5_000_000.0),
        telegram_chat_id: None,
        is_active: true,
        created_at: Utc::now(),
    }
}

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
fn escape_html_neutralises_markup() {
    assert_eq!(
        escape_html("<b>жирный</b> & <i>курсив</i>"),
        "&lt;b&gt;жирный&lt;/b&gt; &amp; &lt;i&gt;курсив&lt;/i&gt;"
    );
    assert_eq!(escape_html("обычный текст"), "обычный текст");
}

#[test]
fn project_card_shows_budget_with_grouping() {
    let card = format_project_card(&test_project("Квартира на Абая"));
    assert!(card.contains("Квартира на Абая"));
    assert!(card.contains("5 000 000"));
    assert!(card.contains("Стандартный"));
}

#[test]
fn project_name_is_escaped_in_cards() {
    let card = format_project_card(&test_project("Квартира <script>"));
    assert!(card.contains("&lt;script&gt;"));
    assert!(!card.contains("<script>"));
}

#[test]
fn status_report_marks_parallel_stages() {
    let mut stages = vec![
        test_stage(1, "Демонтаж", StageStatus::Completed),
        test_stage(2, "Электрика", StageStatus::InProgress),
    ];
    let mut parallel = test_stage(100, "Кухня → Замер", StageStatus::Planned);
    parallel.is_parallel = true;
    stages.push(parallel);

    let report = build_status_report("Квартира", &stages, Utc::now());
    let text = format_status_report(&report);

    assert!(text.contains("Кухня"));
    assert!(text.contains('∥'), "parallel marker expected: {text}");
    assert!(text.contains("1/3") || text.contains("33%") || text.contains("Прогресс"));
}

#[test]
fn budget_summary_includes_analysis_message() {
    let project = test_project("Квартира");
    let analysis = analyze_budget(project.total_budget, 4_600_000.0);
    let text = format_budget_summary(&project, &[], &analysis, 4_600_000.0);

    assert!(text.contains("4 600 000"));
    assert!(text.contains("Бюджет на исходе"));
}
