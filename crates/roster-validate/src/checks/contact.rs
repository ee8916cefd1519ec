//! Email and phone format checks.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use roster_model::{ErrorCode, ErrorDescriptor, TenantRules, fields, fields::present};

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("Invalid email regex")
});

/// E.164: `+`, a non-zero digit, then 7 to 14 digits.
static E164_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{7,14}$").expect("Invalid E.164 regex"));

const PHONE_FIELDS: [&str; 3] = [fields::PHONE, fields::PARENT_PHONE_1, fields::PARENT_PHONE_2];

pub fn check_email(normalized: &BTreeMap<String, String>) -> Vec<ErrorDescriptor> {
    let Some(email) = present(normalized, fields::EMAIL) else {
        return Vec::new();
    };
    if !EMAIL_REGEX.is_match(email) {
        return vec![ErrorDescriptor::error(
            Some(fields::EMAIL),
            ErrorCode::InvalidEmail,
            "Email address is not valid",
        )];
    }
    let raw = normalized.get(fields::EMAIL).map_or("", String::as_str);
    if raw != email.to_lowercase() {
        return vec![ErrorDescriptor::warning(
            Some(fields::EMAIL),
            ErrorCode::InvalidEmail,
            "Email address is not case-normalized",
        )];
    }
    Vec::new()
}

pub fn check_phones(
    normalized: &BTreeMap<String, String>,
    rules: &TenantRules,
) -> Vec<ErrorDescriptor> {
    let mut issues = Vec::new();
    for field in PHONE_FIELDS {
        let Some(phone) = present(normalized, field) else {
            continue;
        };
        if !E164_REGEX.is_match(phone) {
            issues.push(ErrorDescriptor::error(
                Some(field),
                ErrorCode::InvalidPhone,
                "Phone number is not in international format",
            ));
        } else if !rules.accepts_prefix(phone) {
            issues.push(ErrorDescriptor::error(
                Some(field),
                ErrorCode::InvalidPhone,
                format!(
                    "Phone prefix is not accepted (expected one of {})",
                    rules.accepted_prefixes.join(", ")
                ),
            ));
        }
    }
    issues
}
