//! Tests for SKILL.md parsing and registry precedence in
//! `src/skills/mod.rs`.

use std::path::{Path, PathBuf};

use remobot::skills::{parse_skill_file, SkillRegistry};

fn write_skill(dir: &Path, folder: &str, body: &str) -> PathBuf {
    let skill_dir = dir.join(folder);
    std::fs::create_dir_all(&skill_dir).expect("mkdir should succeed");
    let path = skill_dir.join("SKILL.md");
    std::fs::write(&path, body).expect("write should succeed");
    path
}

#[test]
fn parses_frontmatter_and_body() {
    let raw = "---\nname: budget-analysis\ndescription: Анализ бюджета\npriority: 10\n---\n\
               Ты — аналитик бюджета ремонта.\nОтвечай кратко.";
    let skill = parse_skill_file(Path::new("SKILL.md"), raw).expect("should parse");

    assert_eq!(skill.name, "budget-analysis");
    assert_eq!(skill.description, "Анализ бюджета");
    assert_eq!(skill.priority, 10);
    assert!(skill.instructions.starts_with("Ты — аналитик"));
    assert!(skill.instructions.ends_with("кратко."));
}

#[test]
fn missing_frontmatter_is_rejected() {
    assert!(parse_skill_file(Path::new("SKILL.md"), "Просто текст без фронтматтера").is_none());
    assert!(parse_skill_file(Path::new("SKILL.md"), "---\nname: x").is_none());
}

#[test]
fn invalid_yaml_is_rejected() {
    let raw = "---\nname: [broken\n---\nbody";
    assert!(parse_skill_file(Path::new("SKILL.md"), raw).is_none());
}

#[test]
fn later_directory_overrides_by_name() {
    let builtin = tempfile::tempdir().expect("tempdir");
    let custom = tempfile::tempdir().expect("tempdir");

    write_skill(
        builtin.path(),
        "greeting",
        "---\nname: greeting\ndescription: базовый\n---\nБазовая версия.",
    );
    write_skill(
        custom.path(),
        "greeting",
        "---\nname: greeting\ndescription: кастомный\n---\nКастомная версия.",
    );

    let registry = SkillRegistry::load_from_dirs(&[
        builtin.path().to_path_buf(),
        custom.path().to_path_buf(),
    ]);

    assert_eq!(registry.len(), 1);
    let skill = registry.get("greeting").expect("skill should load");
    assert_eq!(skill.description, "кастомный");
}

#[test]
fn higher_priority_wins_within_a_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_skill(
        dir.path(),
        "low",
        "---\nname: helper\npriority: 1\ndescription: низкий\n---\nlow",
    );
    write_skill(
        dir.path(),
        "z-high",
        "---\nname: helper\npriority: 5\ndescription: высокий\n---\nhigh",
    );

    let registry = SkillRegistry::load_from_dirs(&[dir.path().to_path_buf()]);
    let skill = registry.get("helper").expect("skill should load");
    assert_eq!(skill.priority, 5);
}

#[test]
fn combined_prompt_joins_with_separators() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_skill(
        dir.path(),
        "one",
        "---\nname: one\ndescription: Первый\n---\nТело один.",
    );
    write_skill(
        dir.path(),
        "two",
        "---\nname: two\ndescription: Второй\n---\nТело два.",
    );

    let registry = SkillRegistry::load_from_dirs(&[dir.path().to_path_buf()]);
    let prompt = registry.combined_prompt(&["one", "two", "missing"]);

    assert!(prompt.contains("=== Первый ==="));
    assert!(prompt.contains("Тело один."));
    assert!(prompt.contains("=== Второй ==="));
}

#[test]
fn xml_listing_escapes_markup() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_skill(
        dir.path(),
        "xmlish",
        "---\nname: a<b\ndescription: x & y\n---\nbody",
    );

    let registry = SkillRegistry::load_from_dirs(&[dir.path().to_path_buf()]);
    let listing = registry.format_for_prompt();

    assert!(listing.starts_with("<available_skills>"));
    assert!(listing.contains("a&lt;b"));
    assert!(listing.contains("x &amp; y"));
}

#[test]
fn empty_registry_produces_empty_listing() {
    let registry = SkillRegistry::load_from_dirs(&[]);
    assert!(registry.is_empty());
    assert_eq!(registry.format_for_prompt(), "");
}
