//! Header folding for case- and diacritic-insensitive comparison.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Folds a header or alias for comparison.
///
/// Decomposes accented letters and drops the marks, lowercases, turns
/// separators into spaces and collapses whitespace: `"Téléphone_Parent-1"`
/// becomes `"telephone parent 1"`.
pub fn fold_header(raw: &str) -> String {
    let stripped: String = raw
        .trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    stripped
        .replace(['_', '-', '.', '/', '\\', '\'', '(', ')', ':'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compares two headers after folding.
pub fn same_header(a: &str, b: &str) -> bool {
    fold_header(a) == fold_header(b)
}
