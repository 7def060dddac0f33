//! Category model and category ordering

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Key prefix for user-created categories.
pub const CUSTOM_CATEGORY_PREFIX: &str = "custom_";

/// Mapping of category key to category, as persisted under `categories`.
pub type Categories = BTreeMap<String, Category>;

/// A user-visible note category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Display name
    pub name: String,
    /// Glyph shown next to the name
    pub icon: String,
    /// Display color token
    pub color: String,
}

impl Category {
    #[must_use]
    pub fn new(name: impl Into<String>, icon: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            icon: icon.into(),
            color: color.into(),
        }
    }

    /// Placeholder rendered for notes whose category no longer exists.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new("Unknown", "❓", "gray")
    }
}

/// Generate a key for a user-created category.
#[must_use]
pub fn custom_category_key(timestamp_ms: i64) -> String {
    format!("{CUSTOM_CATEGORY_PREFIX}{timestamp_ms}")
}

/// Categories used when no prior data exists.
#[must_use]
pub fn default_categories() -> (Categories, Vec<String>) {
    let defaults = [
        ("work", Category::new("Work", "💼", "blue")),
        ("personal", Category::new("Personal", "🏠", "green")),
        ("idea", Category::new("Idea", "💡", "yellow")),
        ("todo", Category::new("To-do", "✅", "red")),
    ];
    let order = defaults.iter().map(|(key, _)| (*key).to_string()).collect();
    let categories = defaults
        .into_iter()
        .map(|(key, category)| (key.to_string(), category))
        .collect();
    (categories, order)
}

/// Bring a category order in line with the category map.
///
/// Keys that no longer exist and repeated keys are dropped; keys present in
/// the map but missing from the order are appended in key order.
#[must_use]
pub fn normalize_category_order(categories: &Categories, order: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut normalized: Vec<String> = order
        .iter()
        .filter(|key| categories.contains_key(key.as_str()))
        .filter(|key| seen.insert(key.as_str()))
        .cloned()
        .collect();

    for key in categories.keys() {
        if !seen.contains(key.as_str()) {
            normalized.push(key.clone());
        }
    }
    normalized
}

/// Resolve a category for display; dangling keys get the unknown placeholder.
#[must_use]
pub fn category_label(categories: &Categories, key: &str) -> Category {
    categories.get(key).cloned().unwrap_or_else(Category::unknown)
}
