//! Export and import of the full note collection.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{normalize_category_order, category_label, Categories, Note, NoteId};
use crate::sync::{reconcile_order, supersedes};

/// Version written into every JSON export.
pub const EXPORT_VERSION: &str = "1.0";

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Summary counts carried by an export document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStats {
    pub total_notes: usize,
    pub completed_notes: usize,
    pub active_notes: usize,
    pub total_categories: usize,
}

impl ExportStats {
    pub fn compute(notes: &[Note], categories: &Categories) -> Self {
        let completed_notes = notes.iter().filter(|note| note.completed).count();
        Self {
            total_notes: notes.len(),
            completed_notes,
            active_notes: notes.len() - completed_notes,
            total_categories: categories.len(),
        }
    }
}

/// The JSON export document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: String,
    pub export_date: DateTime<Utc>,
    pub notes: Vec<Note>,
    pub categories: Categories,
    pub category_order: Vec<String>,
    pub note_order: Vec<NoteId>,
    pub stats: ExportStats,
}

impl ExportDocument {
    pub fn new(
        notes: &[Note],
        categories: &Categories,
        category_order: &[String],
        note_order: &[NoteId],
        export_date: DateTime<Utc>,
    ) -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            export_date,
            notes: notes.to_vec(),
            categories: categories.clone(),
            category_order: category_order.to_vec(),
            note_order: note_order.to_vec(),
            stats: ExportStats::compute(notes, categories),
        }
    }
}

/// Collections recovered from an import document, ready to replace state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedData {
    pub notes: Vec<Note>,
    pub categories: Categories,
    pub category_order: Vec<String>,
    pub note_order: Vec<NoteId>,
}

/// Render an export document as pretty-printed JSON.
pub fn render_json_export(document: &ExportDocument) -> serde_json::Result<String> {
    serde_json::to_string_pretty(document)
}

/// Render notes in Markdown with a front-matter block per note.
#[must_use]
pub fn render_markdown_export(document: &ExportDocument) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Quick Memo export");
    let _ = writeln!(output);
    let _ = writeln!(output, "Exported: {}", document.export_date.to_rfc3339());
    let _ = writeln!(
        output,
        "Notes: {} ({} completed, {} active)",
        document.stats.total_notes, document.stats.completed_notes, document.stats.active_notes
    );

    for note in &document.notes {
        let category = category_label(&document.categories, &note.category);
        output.push('\n');
        let _ = writeln!(output, "---");
        let _ = writeln!(output, "id: {}", note.id);
        let _ = writeln!(output, "category: {} {}", category.icon, category.name);
        let _ = writeln!(output, "completed: {}", note.completed);
        let _ = writeln!(output, "timestamp: {}", note.timestamp);
        if let Some(updated_at) = note.updated_at {
            let _ = writeln!(output, "updated_at: {}", updated_at.to_rfc3339());
        }
        let _ = writeln!(output, "---");
        let _ = writeln!(output);
        output.push_str(&note.text);
        output.push('\n');
    }

    output
}

/// Render a document in the selected format.
pub fn render_export(document: &ExportDocument, format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(document),
        ExportFormat::Markdown => Ok(render_markdown_export(document)),
    }
}

/// Build a deterministic default file name for exports.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    format!("quick-memo-export-{timestamp_ms}.{}", format.extension())
}

/// Parse and validate an import document.
///
/// Nothing is returned unless the whole document is valid, so callers can
/// apply the result by plain assignment.
pub fn parse_import(payload: &str) -> Result<ImportedData> {
    let document: Value = serde_json::from_str(payload)
        .map_err(|error| Error::Validation(format!("import file is not valid JSON: {error}")))?;
    let Value::Object(mut fields) = document else {
        return Err(Error::Validation(
            "import file must contain a JSON object".to_string(),
        ));
    };

    let notes = match fields.remove("notes") {
        Some(value @ Value::Array(_)) => serde_json::from_value::<Vec<Note>>(value)
            .map_err(|error| Error::Validation(format!("invalid note in 'notes': {error}")))?,
        Some(_) => return Err(Error::Validation("'notes' must be an array".to_string())),
        None => return Err(Error::Validation("missing required field 'notes'".to_string())),
    };

    let categories = match fields.remove("categories") {
        Some(value @ Value::Object(_)) => serde_json::from_value::<Categories>(value)
            .map_err(|error| Error::Validation(format!("invalid 'categories': {error}")))?,
        Some(_) => {
            return Err(Error::Validation(
                "'categories' must be an object".to_string(),
            ))
        }
        None => {
            return Err(Error::Validation(
                "missing required field 'categories'".to_string(),
            ))
        }
    };

    if let Some(note) = notes.iter().find(|note| note.is_empty()) {
        return Err(Error::Validation(format!("note {} has empty text", note.id)));
    }

    let category_order: Vec<String> = optional_field(&mut fields, "categoryOrder")?;
    let note_order: Vec<NoteId> = optional_field(&mut fields, "noteOrder")?;

    let notes: Vec<Note> = collapse_duplicate_ids(notes)
        .into_iter()
        .filter(|note| !note.deleted)
        .collect();
    let category_order = normalize_category_order(&categories, &category_order);
    let note_order = reconcile_order(&notes, &note_order);

    tracing::debug!(
        "Parsed import with {} note(s) and {} categories",
        notes.len(),
        categories.len()
    );
    Ok(ImportedData {
        notes,
        categories,
        category_order,
        note_order,
    })
}

/// Keep one copy per id, the most recent one, where the id first appeared.
fn collapse_duplicate_ids(notes: Vec<Note>) -> Vec<Note> {
    let mut positions: HashMap<NoteId, usize> = HashMap::with_capacity(notes.len());
    let mut kept: Vec<Note> = Vec::with_capacity(notes.len());
    for note in notes {
        if let Some(&index) = positions.get(&note.id) {
            if supersedes(&note, &kept[index]) {
                kept[index] = note;
            }
        } else {
            positions.insert(note.id, kept.len());
            kept.push(note);
        }
    }
    kept
}

fn optional_field<T: serde::de::DeserializeOwned + Default>(
    fields: &mut serde_json::Map<String, Value>,
    name: &str,
) -> Result<T> {
    match fields.remove(name) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|error| Error::Validation(format!("invalid '{name}': {error}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::default_categories;
    use pretty_assertions::assert_eq;

    fn note(id: i64, text: &str, completed: bool) -> Note {
        Note {
            id: NoteId::from_raw(id),
            text: text.to_string(),
            category: "work".to_string(),
            timestamp: "2024-03-01 09:30:00".to_string(),
            completed,
            updated_at: None,
            deleted: false,
        }
    }

    fn document() -> ExportDocument {
        let (categories, order) = default_categories();
        let notes = vec![note(2, "second", true), note(1, "first", false)];
        let note_order = vec![NoteId::from_raw(2), NoteId::from_raw(1)];
        let date = DateTime::from_timestamp(1_709_285_400, 0).unwrap();
        ExportDocument::new(&notes, &categories, &order, &note_order, date)
    }

    #[test]
    fn stats_count_completed_and_active() {
        let stats = document().stats;
        assert_eq!(
            stats,
            ExportStats {
                total_notes: 2,
                completed_notes: 1,
                active_notes: 1,
                total_categories: 4,
            }
        );
    }

    #[test]
    fn json_export_uses_camel_case_fields() {
        let rendered = render_json_export(&document()).unwrap();
        assert!(rendered.contains("\"exportDate\""));
        assert!(rendered.contains("\"categoryOrder\""));
        assert!(rendered.contains("\"noteOrder\""));
        assert!(rendered.contains("\"totalNotes\": 2"));
        assert!(rendered.contains("\"version\": \"1.0\""));
    }

    #[test]
    fn exported_document_imports_back() {
        let document = document();
        let imported = parse_import(&render_json_export(&document).unwrap()).unwrap();

        assert_eq!(imported.notes, document.notes);
        assert_eq!(imported.categories, document.categories);
        assert_eq!(imported.category_order, document.category_order);
        assert_eq!(imported.note_order, document.note_order);
    }

    #[test]
    fn import_without_notes_fails_validation() {
        let error = parse_import(r#"{"version":"1.0","categories":{}}"#).unwrap_err();
        assert!(matches!(error, Error::Validation(ref message) if message.contains("'notes'")));
    }

    #[test]
    fn import_rejects_wrong_shapes_and_empty_text() {
        assert!(matches!(
            parse_import(r#"{"notes":{},"categories":{}}"#),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            parse_import(r#"{"notes":[],"categories":[]}"#),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            parse_import(r#"{"notes":[{"id":1,"text":"  ","category":"work","timestamp":""}],"categories":{}}"#),
            Err(Error::Validation(_))
        ));
        assert!(matches!(parse_import("not json"), Err(Error::Validation(_))));
    }

    #[test]
    fn missing_orders_are_rebuilt() {
        let payload = r#"{
            "notes": [
                {"id": 10, "text": "older", "category": "idea", "timestamp": "2024-01-01 10:00:00"},
                {"id": 20, "text": "newer", "category": "idea", "timestamp": "2024-02-01 10:00:00"}
            ],
            "categories": {
                "idea": {"name": "Idea", "icon": "💡", "color": "yellow"},
                "work": {"name": "Work", "icon": "💼", "color": "blue"}
            }
        }"#;

        let imported = parse_import(payload).unwrap();
        assert_eq!(imported.category_order, vec!["idea", "work"]);
        assert_eq!(
            imported.note_order,
            vec![NoteId::from_raw(20), NoteId::from_raw(10)]
        );
    }

    #[test]
    fn duplicate_ids_collapse_to_most_recent_copy() {
        let payload = r#"{
            "notes": [
                {"id": 10, "text": "stale", "category": "idea", "timestamp": "2024-01-01 10:00:00"},
                {"id": 20, "text": "other", "category": "idea", "timestamp": "2024-01-05 10:00:00"},
                {"id": 10, "text": "fresh", "category": "idea", "timestamp": "2024-01-01 10:00:00",
                 "updatedAt": "2024-03-01T10:00:00Z"},
                {"id": 20, "text": "older other", "category": "idea", "timestamp": "2024-01-02 10:00:00"}
            ],
            "categories": {"idea": {"name": "Idea", "icon": "💡", "color": "yellow"}}
        }"#;

        let imported = parse_import(payload).unwrap();

        let texts: Vec<&str> = imported.notes.iter().map(|note| note.text.as_str()).collect();
        assert_eq!(texts, vec!["fresh", "other"]);
        assert_eq!(imported.note_order.len(), 2);
    }

    #[test]
    fn duplicate_whose_latest_copy_is_deleted_is_dropped() {
        let payload = r#"{
            "notes": [
                {"id": 10, "text": "live", "category": "idea", "timestamp": "2024-01-01 10:00:00"},
                {"id": 10, "text": "live", "category": "idea", "timestamp": "2024-01-01 10:00:00",
                 "updatedAt": "2024-03-01T10:00:00Z", "deleted": true}
            ],
            "categories": {"idea": {"name": "Idea", "icon": "💡", "color": "yellow"}}
        }"#;

        assert!(parse_import(payload).unwrap().notes.is_empty());
    }

    #[test]
    fn markdown_export_includes_front_matter() {
        let rendered = render_markdown_export(&document());
        assert!(rendered.contains("id: 2"));
        assert!(rendered.contains("category: 💼 Work"));
        assert!(rendered.contains("completed: true"));
        assert!(rendered.contains("\nfirst\n"));
    }

    #[test]
    fn suggested_file_name_uses_format_extension() {
        assert_eq!(
            suggested_export_file_name(ExportFormat::Json, 123),
            "quick-memo-export-123.json"
        );
        assert_eq!(
            suggested_export_file_name(ExportFormat::Markdown, 456),
            "quick-memo-export-456.md"
        );
    }
}
