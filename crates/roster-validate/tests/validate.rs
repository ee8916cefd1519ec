//! Batch validation scenarios.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use roster_model::{
    BatchId, ErrorCode, ImportMapping, RawRow, RecordDraft, ReferenceId, ReferenceKind,
    RequiredTarget, RowHash, RowStatus, Severity, StagingRow, TenantId, TenantRules,
};
use roster_store::{
    InMemoryRecordStore, InMemoryReferenceSource, LookupCache, RecordStore,
};
use roster_validate::ValidationEngine;

struct Fixture {
    tenant: TenantId,
    records: Arc<InMemoryRecordStore>,
    engine: ValidationEngine,
}

fn fixture() -> Fixture {
    let tenant = TenantId::new("lycee-a").expect("tenant");
    let source = Arc::new(InMemoryReferenceSource::new());
    source
        .insert(&tenant, ReferenceKind::Level, "6EME", ReferenceId::new("lvl-6"))
        .expect("seed level");
    let records = Arc::new(InMemoryRecordStore::new());
    let mapping = ImportMapping::new(tenant.clone(), "contacts")
        .expect("mapping")
        .with_required(RequiredTarget::AnyOf(vec![
            "email".to_string(),
            "phone".to_string(),
            "matricule".to_string(),
        ]));
    let engine = ValidationEngine::new(
        tenant.clone(),
        TenantRules::default(),
        &mapping,
        Arc::new(LookupCache::new(source)),
        records.clone(),
    )
    .with_today(NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"));
    Fixture {
        tenant,
        records,
        engine,
    }
}

fn staged(tenant: &TenantId, index: u32, pairs: &[(&str, &str)]) -> StagingRow {
    let normalized: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let mut row = StagingRow::new(
        BatchId::new(),
        tenant.clone(),
        RawRow::new(index, BTreeMap::new()).expect("raw row"),
    );
    row.set_normalized(normalized, RowHash::from_digest([index as u8; 32]));
    row
}

fn codes(row: &StagingRow) -> Vec<ErrorCode> {
    row.errors.iter().map(|e| e.code).collect()
}

#[test]
fn test_normalized_contact_row_is_valid() {
    let f = fixture();
    let mut rows = vec![staged(
        &f.tenant,
        1,
        &[("email", "jane.doe@ex.com"), ("phone", "+237699000000")],
    )];
    let summary = f.engine.validate_batch(&mut rows).expect("validate");
    assert_eq!(summary.valid, 1);
    assert_eq!(rows[0].status, RowStatus::Valid);
    assert!(rows[0].errors.is_empty());
}

#[test]
fn test_school_year_must_span_consecutive_years() {
    let f = fixture();
    let mut rows = vec![staged(
        &f.tenant,
        1,
        &[("email", "a@ex.com"), ("school_year", "2024-2026")],
    )];
    f.engine.validate_batch(&mut rows).expect("validate");
    assert_eq!(rows[0].status, RowStatus::Error);
    assert_eq!(codes(&rows[0]), vec![ErrorCode::InvalidSchoolYear]);
}

#[test]
fn test_second_row_with_same_matricule_is_duplicate() {
    let f = fixture();
    let mut rows = vec![
        staged(&f.tenant, 2, &[("matricule", "A123"), ("email", "b@ex.com")]),
        staged(&f.tenant, 1, &[("matricule", "A123"), ("email", "a@ex.com")]),
    ];
    let summary = f.engine.validate_batch(&mut rows).expect("validate");
    assert_eq!(summary.valid, 1);
    assert_eq!(summary.error, 1);
    // Row 1 claims the matricule even though it comes second in the slice.
    assert_eq!(rows[1].status, RowStatus::Valid);
    assert_eq!(codes(&rows[0]), vec![ErrorCode::DuplicateMatricule]);
}

#[test]
fn test_invalid_row_does_not_claim_matricule() {
    let f = fixture();
    let mut rows = vec![
        staged(&f.tenant, 1, &[("matricule", "A1"), ("email", "broken@")]),
        staged(&f.tenant, 2, &[("matricule", "A1")]),
    ];
    f.engine.validate_batch(&mut rows).expect("validate");
    assert_eq!(rows[0].status, RowStatus::Error);
    assert_eq!(rows[1].status, RowStatus::Valid);
}

#[test]
fn test_missing_identifier_and_unknown_level() {
    let f = fixture();
    let mut rows = vec![
        staged(&f.tenant, 1, &[("full_name", "Jane Doe"), ("level", "6eme")]),
        staged(&f.tenant, 2, &[("email", "x@ex.com"), ("level", "TERMINALE")]),
    ];
    f.engine.validate_batch(&mut rows).expect("validate");
    assert_eq!(codes(&rows[0]), vec![ErrorCode::MissingIdentifier]);
    assert_eq!(codes(&rows[1]), vec![ErrorCode::UnresolvedReference]);
}

#[test]
fn test_committed_records_drive_matricule_and_ambiguity() {
    let f = fixture();
    let seed = |pairs: &[(&str, &str)]| {
        let normalized: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        f.records
            .create(&f.tenant, RecordDraft::from_normalized(&normalized, None, None), None)
            .expect("seed record")
    };
    seed(&[("email", "jane@ex.com"), ("matricule", "A1")]);
    seed(&[("phone", "+237677000000"), ("matricule", "B2")]);

    let mut rows = vec![
        // Same student as the first record: not a duplicate.
        staged(&f.tenant, 1, &[("email", "jane@ex.com"), ("matricule", "A1")]),
        // Matricule-only match: the record to update.
        staged(&f.tenant, 2, &[("matricule", "B2")]),
        // Email points at the first record, matricule at the second.
        staged(&f.tenant, 3, &[("email", "jane@ex.com"), ("matricule", "B2")]),
        // Email and phone point at different records.
        staged(
            &f.tenant,
            4,
            &[("email", "jane@ex.com"), ("phone", "+237677000000")],
        ),
    ];
    f.engine.validate_batch(&mut rows).expect("validate");

    assert_eq!(rows[0].status, RowStatus::Valid);
    assert_eq!(rows[1].status, RowStatus::Valid);
    assert_eq!(codes(&rows[2]), vec![ErrorCode::DuplicateMatricule]);
    assert_eq!(rows[3].status, RowStatus::Valid);
    assert_eq!(codes(&rows[3]), vec![ErrorCode::IdentifierAmbiguity]);
    assert_eq!(rows[3].errors[0].severity, Severity::Warning);
}

#[test]
fn test_revalidation_is_idempotent() {
    let f = fixture();
    let mut rows = vec![staged(
        &f.tenant,
        1,
        &[("email", "Jane@Ex.com"), ("phone", "0699"), ("date_of_birth", "2030-01-01")],
    )];
    f.engine.validate_batch(&mut rows).expect("validate");
    let first = rows[0].errors.clone();
    f.engine.validate_batch(&mut rows).expect("validate");
    assert_eq!(rows[0].errors, first);

    let rendered: Vec<String> = first
        .iter()
        .map(|e| format!("{} {} {}", e.severity, e.code, e.field.as_deref().unwrap_or("-")))
        .collect();
    insta::assert_snapshot!(rendered.join("\n"), @r"
    warning InvalidEmail email
    error InvalidPhone phone
    error InvalidDateOfBirth date_of_birth
    ");
}

#[test]
fn test_rows_of_other_tenants_are_rejected() {
    let f = fixture();
    let other = TenantId::new("college-b").expect("tenant");
    let mut rows = vec![staged(&other, 1, &[("email", "a@ex.com")])];
    assert!(f.engine.validate_batch(&mut rows).is_err());
}
