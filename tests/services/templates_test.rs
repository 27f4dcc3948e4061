//! Tests for stage template expansion in `src/domain/templates.rs`.

use remobot::domain::templates::{
    build_parallel_stages, custom_item_label, standard_stages, STANDARD_STAGES,
};

#[test]
fn standard_template_has_thirteen_sequential_stages() {
    let stages = standard_stages();
    assert_eq!(stages.len(), 13);

    let orders: Vec<i32> = stages.iter().map(|s| s.order).collect();
    assert_eq!(orders, (1..=13).collect::<Vec<i32>>());
    assert!(stages.iter().all(|s| !s.is_parallel));
}

#[test]
fn five_canonical_checkpoints() {
    let checkpoints: Vec<&str> = STANDARD_STAGES
        .iter()
        .filter(|(_, _, is_checkpoint)| *is_checkpoint)
        .map(|(name, _, _)| *name)
        .collect();
    assert_eq!(
        checkpoints,
        ["Электрика", "Сантехника", "Плитка", "Шпаклёвка", "Финальная приёмка"]
    );
}

#[test]
fn first_stage_is_demolition() {
    let stages = standard_stages();
    let first = stages.first().expect("template is not empty");
    assert_eq!(first.name, "Демонтаж");
    assert_eq!(first.order, 1);
    assert!(!first.is_checkpoint);
}

#[test]
fn one_custom_item_expands_to_five_parallel_stages() {
    let stages = build_parallel_stages(&["kitchen".to_owned()]);
    assert_eq!(stages.len(), 5);

    let orders: Vec<i32> = stages.iter().map(|s| s.order).collect();
    assert_eq!(orders, [100, 101, 102, 103, 104]);
    assert!(stages.iter().all(|s| s.is_parallel && !s.is_checkpoint));
    assert_eq!(stages[0].name, "Кухня → Замер");
    assert_eq!(stages[4].name, "Кухня → Монтаж");
}

#[test]
fn second_item_starts_at_one_hundred_ten() {
    let stages = build_parallel_stages(&["kitchen".to_owned(), "wardrobes".to_owned()]);
    assert_eq!(stages.len(), 10);
    assert_eq!(stages[5].order, 110);
    assert!(stages[5].name.starts_with("Шкафы"));
}

#[test]
fn unknown_item_key_falls_back_to_the_key() {
    assert_eq!(custom_item_label("walkin"), "Гардеробная");
    assert_eq!(custom_item_label("sauna"), "sauna");
}
