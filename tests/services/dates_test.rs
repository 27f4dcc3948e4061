//! Tests for date parsing and formatting in `src/services/stage.rs`.

use chrono::{Datelike, TimeZone, Utc};

use remobot::services::stage::{days_between, format_date, parse_date};

#[test]
fn parse_date_accepts_dotted_format() {
    let dt = parse_date("15.03.2026").expect("should parse");
    assert_eq!((dt.year(), dt.month(), dt.day()), (2026, 3, 15));
    assert_eq!(dt.timezone(), Utc);
}

#[test]
fn parse_date_accepts_slash_and_iso_formats() {
    let slash = parse_date("15/03/2026").expect("should parse");
    let iso = parse_date("2026-03-15").expect("should parse");
    assert_eq!(slash, iso);
}

#[test]
fn parse_date_trims_whitespace() {
    assert!(parse_date("  01.01.2027  ").is_some());
}

#[test]
fn parse_date_rejects_garbage() {
    assert!(parse_date("вчера").is_none());
    assert!(parse_date("32.01.2026").is_none());
    assert!(parse_date("2026-13-01").is_none());
    assert!(parse_date("").is_none());
}

#[test]
fn format_date_round_trips() {
    let dt = parse_date("05.11.2026").expect("should parse");
    assert_eq!(format_date(Some(dt)), "05.11.2026");
}

#[test]
fn format_date_renders_dash_for_none() {
    assert_eq!(format_date(None), "—");
}

#[test]
fn days_between_counts_whole_days() {
    let start = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).single().expect("valid");
    let end = Utc.with_ymd_and_hms(2026, 3, 20, 0, 0, 0).single().expect("valid");
    assert_eq!(days_between(start, end), 5);
}
