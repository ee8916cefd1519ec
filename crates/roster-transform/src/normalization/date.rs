//! Date reparsing to ISO 8601 (`YYYY-MM-DD`).

use chrono::{NaiveDate, NaiveDateTime};

const ISO_DATE: &str = "%Y-%m-%d";

/// Converts a token pattern such as `DD/MM/YYYY` into a chrono format
/// string. Patterns that already contain `%` are returned unchanged.
pub fn to_chrono_pattern(pattern: &str) -> String {
    if pattern.contains('%') {
        return pattern.to_string();
    }
    pattern
        .replace("YYYY", "%Y")
        .replace("YY", "%y")
        .replace("MM", "%m")
        .replace("DD", "%d")
}

/// Parses `value` with `pattern` and renders it as `YYYY-MM-DD`.
///
/// Values already in ISO form, with or without a time part, are accepted
/// too since spreadsheet exports often mix both.
pub fn reparse_date(value: &str, pattern: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let format = to_chrono_pattern(pattern);
    NaiveDate::parse_from_str(trimmed, &format)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, ISO_DATE))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date())
        })
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .ok()
        .map(|date| date.format(ISO_DATE).to_string())
}
