//! Utility functions for quota month keys and log-friendly string handling.

use chrono::{DateTime, Utc};

/// Calendar month key used for mirror quota accounting.
///
/// Keys are derived from UTC, so every run of a given calendar month lands
/// on the same counter row regardless of where the scheduler runs.
///
/// # Arguments
///
/// * `at` - The instant to classify
///
/// # Returns
///
/// A `"YYYY-MM"` string, e.g. `"2025-07"`.
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and a
/// dropped-character count appended. Counts characters, not bytes, so
/// multi-byte input never splits mid-codepoint.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of characters to keep
///
/// # Returns
///
/// The original string if within `max`, otherwise a truncated version with
/// `"…(+N chars)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 chars)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let total = s.chars().count();
    if total <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max).collect();
        format!("{kept}…(+{} chars)", total - max)
    }
}
