//! Checks against already-committed records.
//!
//! A row resolves to an existing record by email, then phone, then
//! matricule. The matricule is only a conflict when a higher-priority
//! identifier points at a different record than the one owning the
//! matricule; a matricule-only match is the record being updated.

use std::collections::BTreeMap;

use roster_model::{ErrorCode, ErrorDescriptor, Identifier, RecordId, TenantId, fields};
use roster_store::{RecordStore, Result, RetryPolicy};

pub fn check(
    normalized: &BTreeMap<String, String>,
    tenant: &TenantId,
    records: &dyn RecordStore,
    retry: &RetryPolicy,
) -> Result<Vec<ErrorDescriptor>> {
    let mut email_match: Option<RecordId> = None;
    let mut phone_match: Option<RecordId> = None;
    let mut matricule: Option<(String, RecordId)> = None;

    for identifier in Identifier::from_normalized(normalized) {
        let found = retry
            .run("record lookup", || records.find_by_identifier(tenant, &identifier))?
            .map(|record| record.id);
        let Some(id) = found else { continue };
        match identifier {
            Identifier::Email(_) => email_match = Some(id),
            Identifier::Phone(_) => phone_match = Some(id),
            Identifier::Matricule(value) => matricule = Some((value, id)),
        }
    }

    let mut issues = Vec::new();
    if let (Some(by_email), Some(by_phone)) = (email_match, phone_match)
        && by_email != by_phone
    {
        issues.push(ErrorDescriptor::warning(
            Some(fields::PHONE),
            ErrorCode::IdentifierAmbiguity,
            "Email and phone match different existing records; the email match is used",
        ));
    }
    if let Some((value, owner)) = matricule
        && let Some(primary) = email_match.or(phone_match)
        && primary != owner
    {
        issues.push(ErrorDescriptor::error(
            Some(fields::MATRICULE),
            ErrorCode::DuplicateMatricule,
            format!("Matricule '{value}' already belongs to another record"),
        ));
    }
    Ok(issues)
}
