//! Non-destructive filtered and sorted views over the note collection.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{Note, NoteId};

/// Ordering applied to the visible notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Position in the user's manual note order
    #[default]
    Manual,
    Newest,
    Oldest,
    /// Position of the note's category in the category order
    Category,
}

impl SortMode {
    pub const ALL: [Self; 4] = [Self::Manual, Self::Newest, Self::Oldest, Self::Category];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Category => "category",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == value)
            .ok_or_else(|| {
                format!("unknown sort mode '{s}' (expected manual, newest, oldest or category)")
            })
    }
}

/// Which notes are visible
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilter {
    /// Only notes with this category key
    pub category: Option<String>,
    pub hide_completed: bool,
}

impl NoteFilter {
    pub fn matches(&self, note: &Note) -> bool {
        if self.hide_completed && note.completed {
            return false;
        }
        self.category
            .as_deref()
            .map_or(true, |category| note.category == category)
    }
}

/// Filter and sort `notes` without touching the collection.
///
/// All sorts are stable. In manual mode ids missing from `note_order` come
/// first in collection order; in category mode notes with an unknown
/// category come after all known ones.
pub fn visible_notes<'a>(
    notes: &'a [Note],
    note_order: &[NoteId],
    category_order: &[String],
    filter: &NoteFilter,
    sort: SortMode,
) -> Vec<&'a Note> {
    let mut visible: Vec<&Note> = notes.iter().filter(|note| filter.matches(note)).collect();

    match sort {
        SortMode::Manual => {
            let positions = index_of(note_order.iter().copied());
            // None sorts before Some
            visible.sort_by_key(|note| positions.get(&note.id).copied());
        }
        SortMode::Newest => visible.sort_by(|a, b| b.id.cmp(&a.id)),
        SortMode::Oldest => visible.sort_by_key(|note| note.id),
        SortMode::Category => {
            let positions = index_of(category_order.iter().map(String::as_str));
            visible.sort_by_key(|note| {
                positions
                    .get(note.category.as_str())
                    .copied()
                    .unwrap_or(usize::MAX)
            });
        }
    }
    visible
}

fn index_of<K: std::hash::Hash + Eq>(keys: impl Iterator<Item = K>) -> HashMap<K, usize> {
    let mut positions = HashMap::new();
    for (index, key) in keys.enumerate() {
        positions.entry(key).or_insert(index);
    }
    positions
}
