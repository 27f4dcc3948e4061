//! Tests for amount parsing, formatting, and budget analysis in
//! `src/services/budget.rs`.

use remobot::domain::BudgetCategory;
use remobot::services::budget::{
    analyze_budget, format_amount, guess_category_from_stage, parse_amount, BudgetHealth,
};

#[test]
fn parse_amount_handles_thousand_spaces() {
    assert_eq!(parse_amount("500 000"), Some(500_000.0));
    assert_eq!(parse_amount("5 000 000"), Some(5_000_000.0));
}

#[test]
fn parse_amount_handles_comma_decimals() {
    assert_eq!(parse_amount("1500,50"), Some(1500.5));
}

#[test]
fn parse_amount_strips_currency_symbols() {
    assert_eq!(parse_amount("80000 ₸"), Some(80_000.0));
    assert_eq!(parse_amount("250 000 руб"), Some(250_000.0));
    assert_eq!(parse_amount("99₽"), Some(99.0));
}

#[test]
fn parse_amount_rejects_negative_and_garbage() {
    assert_eq!(parse_amount("-100"), None);
    assert_eq!(parse_amount("дорого"), None);
    assert_eq!(parse_amount(""), None);
}

#[test]
fn format_amount_groups_thousands_with_spaces() {
    assert_eq!(format_amount(152_340.0), "152 340");
    assert_eq!(format_amount(5_000.0), "5 000");
    assert_eq!(format_amount(1_234_567.0), "1 234 567");
    assert_eq!(format_amount(999.0), "999");
}

#[test]
fn analyze_budget_without_cap() {
    let analysis = analyze_budget(None, 100_000.0);
    assert!(!analysis.has_budget);
    assert_eq!(analysis.status, BudgetHealth::Ok);
}

#[test]
fn analyze_budget_ok_below_ninety_percent() {
    let analysis = analyze_budget(Some(1_000_000.0), 500_000.0);
    assert_eq!(analysis.status, BudgetHealth::Ok);
    assert_eq!(analysis.remaining, 500_000.0);
}

#[test]
fn analyze_budget_warns_at_ninety_percent() {
    let analysis = analyze_budget(Some(1_000_000.0), 920_000.0);
    assert_eq!(analysis.status, BudgetHealth::Warning);
}

#[test]
fn analyze_budget_flags_overrun() {
    let analysis = analyze_budget(Some(1_000_000.0), 1_150_000.0);
    assert_eq!(analysis.status, BudgetHealth::Over);
    assert!(analysis.remaining < 0.0);
    assert!(analysis.message.contains("превышен"));
}

#[test]
fn category_guessing_matches_stage_names() {
    assert_eq!(
        guess_category_from_stage("Электрика"),
        BudgetCategory::Electrical
    );
    assert_eq!(
        guess_category_from_stage("Чистовая сантехника"),
        BudgetCategory::Plumbing
    );
    assert_eq!(
        guess_category_from_stage("Кухня → Монтаж"),
        BudgetCategory::Furniture
    );
    assert_eq!(
        guess_category_from_stage("Неизвестный этап"),
        BudgetCategory::Other
    );
}
