//! Identifier and required-field presence.

use std::collections::BTreeMap;

use roster_model::{ErrorCode, ErrorDescriptor, RequiredTarget, TenantRules, fields::present};

/// Strong identifier group, tenant-mandatory fields, then mapping targets.
pub fn check(
    normalized: &BTreeMap<String, String>,
    rules: &TenantRules,
    required: &[RequiredTarget],
) -> Vec<ErrorDescriptor> {
    let mut issues = Vec::new();
    let has = |field: &str| present(normalized, field).is_some();

    if !rules.strong_identifiers.is_empty() && !rules.strong_identifiers.iter().any(|f| has(f)) {
        issues.push(ErrorDescriptor::error(
            None,
            ErrorCode::MissingIdentifier,
            format!("One of {} is required", rules.strong_identifiers.join(", ")),
        ));
    }

    for field in &rules.mandatory_fields {
        if !has(field) {
            issues.push(missing_field(field));
        }
    }

    for target in required {
        match target {
            RequiredTarget::Field(field) => {
                if !has(field) {
                    issues.push(missing_field(field));
                }
            }
            RequiredTarget::AnyOf(group) => {
                if group.iter().any(|f| has(f)) {
                    continue;
                }
                let message = format!("One of {} is required", group.join(", "));
                let code = if target.is_identifier_group() {
                    ErrorCode::MissingIdentifier
                } else {
                    ErrorCode::MissingRequiredField
                };
                issues.push(ErrorDescriptor::error(None, code, message));
            }
        }
    }

    // Mapping targets often repeat the tenant rules.
    let mut unique: Vec<ErrorDescriptor> = Vec::with_capacity(issues.len());
    for issue in issues {
        let repeated = unique.iter().any(|u| {
            u.code == issue.code
                && u.field == issue.field
                && (u.code == ErrorCode::MissingIdentifier || u.message == issue.message)
        });
        if !repeated {
            unique.push(issue);
        }
    }
    unique
}

fn missing_field(field: &str) -> ErrorDescriptor {
    ErrorDescriptor::error(
        Some(field),
        ErrorCode::MissingRequiredField,
        format!("Required field '{field}' is missing"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_missing_identifier_reported_once() {
        let group = RequiredTarget::AnyOf(vec![
            "email".to_string(),
            "phone".to_string(),
            "matricule".to_string(),
        ]);
        let issues = check(
            &row(&[("full_name", "Jane"), ("email", "  ")]),
            &TenantRules::default(),
            &[group],
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, ErrorCode::MissingIdentifier);
    }

    #[test]
    fn test_mandatory_and_required_fields() {
        let rules = TenantRules {
            mandatory_fields: vec!["full_name".to_string()],
            ..TenantRules::default()
        };
        let issues = check(
            &row(&[("email", "a@b.cm")]),
            &rules,
            &[
                RequiredTarget::Field("full_name".to_string()),
                RequiredTarget::Field("level".to_string()),
            ],
        );
        let fields: Vec<_> = issues.iter().filter_map(|i| i.field.as_deref()).collect();
        assert_eq!(fields, vec!["full_name", "level"]);
    }

    #[test]
    fn test_non_identifier_group() {
        let issues = check(
            &row(&[("phone", "+237699000000")]),
            &TenantRules::default(),
            &[RequiredTarget::AnyOf(vec![
                "level".to_string(),
                "department".to_string(),
            ])],
        );
        assert_eq!(issues[0].code, ErrorCode::MissingRequiredField);
    }
}
