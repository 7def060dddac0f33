//! Note model

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::util::{datetime_from_millis, parse_display_timestamp, DISPLAY_TIMESTAMP_FORMAT};

static LAST_ISSUED_ID: AtomicI64 = AtomicI64::new(0);

/// A note identifier: the note's creation time in unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(i64);

impl NoteId {
    /// Issue a fresh id from the current time.
    ///
    /// Ids are monotonic within a process: two notes created in the same
    /// millisecond get consecutive ids instead of colliding.
    #[must_use]
    pub fn generate() -> Self {
        let now = Utc::now().timestamp_millis();
        let mut last = LAST_ISSUED_ID.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_ISSUED_ID.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Self(next),
                Err(observed) => last = observed,
            }
        }
    }

    /// Wrap a raw id value.
    #[must_use]
    pub const fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// The raw integer value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Creation time encoded in the id, if it is a plausible timestamp.
    pub fn created_at(self) -> Option<DateTime<Utc>> {
        datetime_from_millis(self.0)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// A note in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Stable identity across local and remote copies
    pub id: NoteId,
    /// Plain text content
    pub text: String,
    /// Category key (may reference a deleted category)
    pub category: String,
    /// Human-readable creation time, display only
    pub timestamp: String,
    /// Completion flag
    #[serde(default)]
    pub completed: bool,
    /// Last mutation time, the merge authority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Tombstone; only an explicit `true` marks the note as removed
    #[serde(default)]
    pub deleted: bool,
}

impl Note {
    /// Create a new note with the given text and category
    #[must_use]
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        let id = NoteId::generate();
        let now = id.created_at().unwrap_or_else(Utc::now);
        Self {
            id,
            text: text.into(),
            category: category.into(),
            timestamp: now.format(DISPLAY_TIMESTAMP_FORMAT).to_string(),
            completed: false,
            updated_at: Some(now),
            deleted: false,
        }
    }

    /// Refresh `updated_at`; the new value is always later than the old one.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = Some(match self.updated_at {
            Some(previous) if previous >= now => previous + Duration::milliseconds(1),
            _ => now,
        });
    }

    /// The time used to decide which copy of a note is newer.
    ///
    /// `updated_at` when present, else the display timestamp, else the
    /// creation time carried by the id.
    pub fn recency(&self) -> Option<DateTime<Utc>> {
        self.updated_at
            .or_else(|| parse_display_timestamp(&self.timestamp))
            .or_else(|| self.id.created_at())
    }

    /// Get first line as title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.text
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }

    /// Check if note text is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_unique_within_same_millisecond() {
        let ids: Vec<NoteId> = (0..50).map(|_| NoteId::generate()).collect();
        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::generate();
        let parsed: NoteId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_new() {
        let note = Note::new("Buy milk", "todo");
        assert_eq!(note.text, "Buy milk");
        assert_eq!(note.category, "todo");
        assert!(!note.deleted);
        assert!(!note.completed);
        assert!(note.updated_at.is_some());
        assert!(!note.timestamp.is_empty());
    }

    #[test]
    fn test_touch_always_moves_forward() {
        let mut note = Note::new("future", "work");
        let future = Utc::now() + Duration::days(1);
        note.updated_at = Some(future);
        note.touch();
        assert_eq!(note.updated_at, Some(future + Duration::milliseconds(1)));

        let mut stale = Note::new("past", "work");
        let past = Utc::now() - Duration::days(1);
        stale.updated_at = Some(past);
        stale.touch();
        assert!(stale.updated_at.unwrap() > past);
    }

    #[test]
    fn test_recency_falls_back_to_timestamp_then_id() {
        let mut note = Note::new("x", "work");
        note.updated_at = None;
        note.timestamp = "2024-01-02 03:04:05".to_string();
        assert_eq!(
            note.recency().unwrap().to_rfc3339(),
            "2024-01-02T03:04:05+00:00"
        );

        note.timestamp = "not a date".to_string();
        assert_eq!(note.recency(), note.id.created_at());
    }

    #[test]
    fn test_missing_flags_deserialize_as_false() {
        let note: Note = serde_json::from_str(
            r#"{"id": 1700000000000, "text": "a", "category": "work", "timestamp": "t"}"#,
        )
        .unwrap();
        assert!(!note.deleted);
        assert!(!note.completed);
        assert!(note.updated_at.is_none());
    }

    #[test]
    fn test_serializes_camel_case() {
        let note = Note::new("a", "work");
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("updatedAt").is_some());
        assert!(json.get("updated_at").is_none());
    }

    #[test]
    fn test_title_preview() {
        let note = Note::new("First line\nSecond line", "work");
        assert_eq!(note.title_preview(50), "First line");
        assert_eq!(note.title_preview(5), "First");
    }
}
