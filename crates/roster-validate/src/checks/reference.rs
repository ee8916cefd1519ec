//! Level and department code resolution.

use std::collections::BTreeMap;

use roster_model::{ErrorCode, ErrorDescriptor, ReferenceKind, TenantId, fields, fields::present};
use roster_store::{LookupCache, Result};

const REFERENCE_FIELDS: [(&str, ReferenceKind); 2] = [
    (fields::LEVEL, ReferenceKind::Level),
    (fields::DEPARTMENT, ReferenceKind::Department),
];

pub fn check(
    normalized: &BTreeMap<String, String>,
    tenant: &TenantId,
    lookup: &LookupCache,
) -> Result<Vec<ErrorDescriptor>> {
    let mut issues = Vec::new();
    for (field, kind) in REFERENCE_FIELDS {
        let Some(code) = present(normalized, field) else {
            continue;
        };
        if lookup.resolve(tenant, kind, code)?.is_none() {
            issues.push(ErrorDescriptor::error(
                Some(field),
                ErrorCode::UnresolvedReference,
                format!("Unknown {kind} code '{code}'"),
            ));
        }
    }
    Ok(issues)
}
