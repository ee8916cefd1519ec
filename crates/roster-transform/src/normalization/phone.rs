//! Phone number normalization to `+<country code><national number>`.

/// Separators tolerated inside a written phone number.
const SEPARATORS: &[char] = &[' ', '-', '.', '(', ')', '/', '\u{a0}'];

/// Rewrites `value` in international form.
///
/// Accepted spellings, with `country_code = "237"` and
/// `national_length = 9`:
///
/// - `699 00 00 00` and `0699000000` become `+237699000000`
/// - `237699000000`, `00237699000000` and `+237 699-000-000` become
///   `+237699000000`
/// - any other `+`-prefixed or `00`-prefixed number keeps its own country
///   code
///
/// Returns `None` for anything that is not a phone number.
pub fn normalize_phone(value: &str, country_code: &str, national_length: usize) -> Option<String> {
    let compact: String = value.trim().chars().filter(|c| !SEPARATORS.contains(c)).collect();
    if compact.is_empty() {
        return None;
    }

    let (international, digits) = if let Some(rest) = compact.strip_prefix('+') {
        (true, rest)
    } else if let Some(rest) = compact.strip_prefix("00") {
        (true, rest)
    } else {
        (false, compact.as_str())
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if international {
        return Some(format!("+{digits}"));
    }

    let country_code = country_code.trim_start_matches('+');
    if digits.len() == national_length {
        return Some(format!("+{country_code}{digits}"));
    }
    if digits.len() == national_length + 1
        && let Some(national) = digits.strip_prefix('0')
    {
        return Some(format!("+{country_code}{national}"));
    }
    if digits.len() == country_code.len() + national_length && digits.starts_with(country_code) {
        return Some(format!("+{digits}"));
    }
    None
}
