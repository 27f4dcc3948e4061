//! Standard renovation stages and parallel (custom furniture) pipelines.
//!
//! These templates define the stages auto-generated at project creation.
//! Orders 1..13 are the sequential main pipeline; parallel furniture
//! pipelines start at order 100 with a step of 10 per item.

/// Definition of a stage to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTemplate {
    /// Stage name.
    pub name: String,
    /// Position within the project.
    pub order: i32,
    /// Whether completion requires owner approval.
    pub is_checkpoint: bool,
    /// Whether the stage is off the main critical path.
    pub is_parallel: bool,
}

/// The 13 standard sequential stages of an apartment renovation.
///
/// `is_checkpoint` marks the stages where client approval is required
/// before work proceeds.
pub const STANDARD_STAGES: [(&str, i32, bool); 13] = [
    ("Демонтаж", 1, false),
    ("Электрика", 2, true),
    ("Сантехника", 3, true),
    ("Штукатурка", 4, false),
    ("Стяжка пола", 5, false),
    ("Плитка", 6, true),
    ("Шпаклёвка", 7, true),
    ("Покраска / обои", 8, false),
    ("Напольное покрытие", 9, false),
    ("Установка дверей", 10, false),
    ("Чистовая электрика", 11, false),
    ("Чистовая сантехника", 12, false),
    ("Финальная приёмка", 13, true),
];

/// Order offset for parallel stages — high so they sort after main stages.
pub const PARALLEL_ORDER_BASE: i32 = 100;

/// Custom items that get a parallel sub-pipeline: key → Russian label.
pub const CUSTOM_ITEMS: [(&str, &str); 4] = [
    ("kitchen", "Кухня"),
    ("wardrobes", "Шкафы"),
    ("walkin", "Гардеробная"),
    ("doors", "Двери на заказ"),
];

/// The sub-flow every custom item follows, in order.
pub const CUSTOM_ITEM_SUBSTAGES: [&str; 5] = [
    "Замер",
    "Договор и предоплата",
    "Производство",
    "Доставка",
    "Монтаж",
];

/// Russian label for a custom-item key, falling back to the key itself.
pub fn custom_item_label(key: &str) -> &str {
    CUSTOM_ITEMS
        .iter()
        .find(|(k, _)| *k == key)
        .map_or(key, |(_, label)| label)
}

/// Returns `true` when `key` names a known custom item.
pub fn is_known_custom_item(key: &str) -> bool {
    CUSTOM_ITEMS.iter().any(|(k, _)| *k == key)
}

/// Build the main-pipeline stage definitions.
pub fn standard_stages() -> Vec<StageTemplate> {
    STANDARD_STAGES
        .iter()
        .map(|&(name, order, is_checkpoint)| StageTemplate {
            name: name.to_owned(),
            order,
            is_checkpoint,
            is_parallel: false,
        })
        .collect()
}

/// Build parallel stage definitions for the selected custom items.
///
/// Each item expands to 5 stages named `"<item> → <sub>"` with orders
/// `100 + 10*i + j` for item index `i` and sub-stage index `j`.
pub fn build_parallel_stages(selected_items: &[String]) -> Vec<StageTemplate> {
    let mut stages = Vec::with_capacity(selected_items.len() * CUSTOM_ITEM_SUBSTAGES.len());
    for (item_idx, key) in selected_items.iter().enumerate() {
        let label = custom_item_label(key);
        for (sub_idx, sub_name) in CUSTOM_ITEM_SUBSTAGES.iter().enumerate() {
            stages.push(StageTemplate {
                name: format!("{label} → {sub_name}"),
                order: PARALLEL_ORDER_BASE + (item_idx as i32) * 10 + sub_idx as i32,
                is_checkpoint: false,
                is_parallel: true,
            });
        }
    }
    stages
}
