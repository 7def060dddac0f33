//! Shared utility functions used across multiple modules.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Display formats accepted when a note has no `updatedAt` and its
/// human-readable `timestamp` has to stand in for recency.
const DISPLAY_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y, %I:%M:%S %p",
];

/// Format used for newly created notes' display timestamp.
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parse a human-readable note timestamp.
///
/// RFC 3339 is tried first, then the display formats (interpreted as UTC).
pub fn parse_display_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    DISPLAY_TIMESTAMP_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    })
}

/// Convert unix milliseconds to a UTC date-time, if representable.
pub fn datetime_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" groceries ".to_string())),
            Some("groceries".to_string())
        );
    }

    #[test]
    fn parse_display_timestamp_accepts_rfc3339_and_display_formats() {
        let rfc = parse_display_timestamp("2024-03-01T10:00:00Z").unwrap();
        let display = parse_display_timestamp("2024-03-01 10:00:00").unwrap();
        assert_eq!(rfc, display);

        let us_style = parse_display_timestamp("3/1/2024, 10:00:00 AM").unwrap();
        assert_eq!(us_style, rfc);
    }

    #[test]
    fn parse_display_timestamp_rejects_garbage() {
        assert!(parse_display_timestamp("").is_none());
        assert!(parse_display_timestamp("yesterday-ish").is_none());
        // Day-first 24-hour dates are ambiguous with the US form
        assert!(parse_display_timestamp("3/1/2024, 10:00:00").is_none());
    }
}
