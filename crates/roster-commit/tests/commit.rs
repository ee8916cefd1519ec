//! Commit engine behavior against in-memory collaborators.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use roster_commit::{
    CancellationToken, CommitEngine, CommitError, CommitSettings, TenantLockCoordinator,
};
use roster_model::{
    BatchId, BatchRequest, BatchStatus, CanonicalRecord, CommitOutcome, DedupStrategy, Identifier,
    ImportBatch, Provenance, RawRow, RecordDraft, SourceFormat, StagingRow, TenantId,
    UploadManifest,
};
use roster_store::{
    InMemoryRecordStore, InMemoryReferenceSource, InMemoryStagingStore, LookupCache, RecordStore,
    RecordWrite, RetryPolicy, StagingStore, WriteOutcome, row_hash,
};

struct Harness {
    staging: Arc<InMemoryStagingStore>,
    records: Arc<InMemoryRecordStore>,
    locks: Arc<TenantLockCoordinator>,
    engine: CommitEngine,
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 2,
    }
}

fn engine(
    staging: Arc<InMemoryStagingStore>,
    records: Arc<dyn RecordStore>,
    locks: Arc<TenantLockCoordinator>,
    chunk_size: usize,
) -> CommitEngine {
    let lookup = Arc::new(LookupCache::new(Arc::new(InMemoryReferenceSource::new())));
    CommitEngine::new(
        staging,
        records,
        lookup,
        locks,
        CommitSettings {
            chunk_size,
            sample_size: 3,
            lock_wait: Duration::from_millis(20),
            retry: fast_retry(),
        },
    )
}

fn harness(chunk_size: usize) -> Harness {
    let staging = Arc::new(InMemoryStagingStore::new());
    let records = Arc::new(InMemoryRecordStore::new());
    let locks = TenantLockCoordinator::new(Duration::from_secs(30));
    let engine = engine(staging.clone(), records.clone(), locks.clone(), chunk_size);
    Harness {
        staging,
        records,
        locks,
        engine,
    }
}

fn fields(pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Stages `rows` as valid rows of a new `ready_to_commit` batch.
fn ready_batch(
    h: &Harness,
    tenant: &TenantId,
    strategy: DedupStrategy,
    rows: Vec<BTreeMap<String, String>>,
) -> BatchId {
    let mut batch = ImportBatch::new(BatchRequest {
        tenant: tenant.clone(),
        created_by: "registrar".to_string(),
        school_year: "2025-2026".to_string(),
        strategy,
        manifest: UploadManifest {
            original_filename: "eleves.csv".to_string(),
            format: SourceFormat::Csv,
            checksum_sha256: String::new(),
            mime_type: None,
            encoding: None,
            delimiter: Some(';'),
            sheet_name: None,
            headers: Vec::new(),
            row_count: rows.len(),
        },
    })
    .expect("batch");
    h.staging.insert_batch(batch.clone()).expect("insert batch");

    let staged: Vec<StagingRow> = rows
        .into_iter()
        .enumerate()
        .map(|(i, normalized)| {
            let index = u32::try_from(i + 1).expect("index");
            let mut row = StagingRow::new(
                batch.id,
                tenant.clone(),
                RawRow::new(index, BTreeMap::new()).expect("raw"),
            );
            let hash = row_hash(&normalized).expect("hash");
            row.set_normalized(normalized, hash);
            row.apply_findings(Vec::new());
            row
        })
        .collect();
    h.staging
        .upsert_rows(tenant, batch.id, staged)
        .expect("stage rows");

    for next in [
        BatchStatus::Mapped,
        BatchStatus::Validated,
        BatchStatus::ReadyToCommit,
    ] {
        batch.transition(next).expect("transition");
    }
    h.staging
        .update_batch(&batch, BatchStatus::Uploaded)
        .expect("update batch");
    batch.id
}

fn student(i: usize) -> BTreeMap<String, String> {
    fields(&[
        ("email", format!("eleve{i}@lycee.cm")),
        ("matricule", format!("M{i:05}")),
        ("full_name", format!("Eleve {i}")),
    ])
}

/// Record store that requests cancellation once `after` chunks were written.
struct CancelAfter {
    inner: Arc<InMemoryRecordStore>,
    token: CancellationToken,
    after: usize,
}

impl RecordStore for CancelAfter {
    fn find_by_identifier(
        &self,
        tenant: &TenantId,
        identifier: &Identifier,
    ) -> roster_store::Result<Option<CanonicalRecord>> {
        self.inner.find_by_identifier(tenant, identifier)
    }

    fn find_by_provenance(
        &self,
        tenant: &TenantId,
        provenance: &Provenance,
    ) -> roster_store::Result<Option<CanonicalRecord>> {
        self.inner.find_by_provenance(tenant, provenance)
    }

    fn create(
        &self,
        tenant: &TenantId,
        draft: RecordDraft,
        provenance: Option<Provenance>,
    ) -> roster_store::Result<CanonicalRecord> {
        self.inner.create(tenant, draft, provenance)
    }

    fn update(
        &self,
        tenant: &TenantId,
        record: CanonicalRecord,
    ) -> roster_store::Result<CanonicalRecord> {
        self.inner.update(tenant, record)
    }

    fn apply_chunk(
        &self,
        tenant: &TenantId,
        writes: Vec<RecordWrite>,
    ) -> roster_store::Result<Vec<WriteOutcome>> {
        let outcomes = self.inner.apply_chunk(tenant, writes)?;
        if self.inner.chunk_writes() >= self.after {
            self.token.cancel();
        }
        Ok(outcomes)
    }

    fn count(&self, tenant: &TenantId) -> roster_store::Result<usize> {
        self.inner.count(tenant)
    }
}

fn seed(h: &Harness, tenant: &TenantId, normalized: &BTreeMap<String, String>) {
    h.records
        .create(tenant, RecordDraft::from_normalized(normalized, None, None), None)
        .expect("seed");
}

#[test]
fn test_ten_thousand_rows_in_chunks_of_a_thousand() {
    let h = harness(1000);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    let batch_id = ready_batch(
        &h,
        &tenant,
        DedupStrategy::Merge,
        (1..=10_000).map(student).collect(),
    );

    let log = h
        .engine
        .commit(&tenant, batch_id, &CancellationToken::new())
        .expect("commit");
    assert_eq!(log.outcome, CommitOutcome::Completed);
    assert_eq!(log.counts.processed(), 10_000);
    assert_eq!(log.counts.created, 10_000);
    assert_eq!(log.chunks_applied, 10);
    assert_eq!(h.records.chunk_writes(), 10);
    assert_eq!(log.sample.len(), 3);
    assert_eq!(
        h.staging.batch(&tenant, batch_id).expect("batch").status,
        BatchStatus::Committed
    );
    assert_eq!(h.staging.commit_log(&tenant, batch_id).expect("log"), Some(log));
}

#[test]
fn test_resubmitted_rows_create_nothing() {
    let h = harness(4);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    let rows: Vec<_> = (1..=10).map(student).collect();

    let first = ready_batch(&h, &tenant, DedupStrategy::Merge, rows.clone());
    h.engine
        .commit(&tenant, first, &CancellationToken::new())
        .expect("first commit");
    assert_eq!(h.records.count(&tenant).expect("count"), 10);

    let second = ready_batch(&h, &tenant, DedupStrategy::Merge, rows);
    let log = h
        .engine
        .commit(&tenant, second, &CancellationToken::new())
        .expect("second commit");
    assert_eq!(log.counts.created, 0);
    assert_eq!(log.counts.updated, 10);
    assert_eq!(h.records.count(&tenant).expect("count"), 10);
}

#[test]
fn test_merge_updates_the_matched_record_only() {
    let h = harness(100);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    seed(
        &h,
        &tenant,
        &fields(&[
            ("phone", "+237699000000".to_string()),
            ("address", "Douala".to_string()),
        ]),
    );

    let batch_id = ready_batch(
        &h,
        &tenant,
        DedupStrategy::Merge,
        vec![fields(&[
            ("phone", "+237699000000".to_string()),
            ("address", "Yaounde".to_string()),
            ("email", "jane@ex.com".to_string()),
        ])],
    );
    let log = h
        .engine
        .commit(&tenant, batch_id, &CancellationToken::new())
        .expect("commit");
    assert_eq!((log.counts.created, log.counts.updated), (0, 1));

    let records = h.records.records(&tenant).expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].profile.address.as_deref(), Some("Yaounde"));
    assert_eq!(records[0].person.email.as_deref(), Some("jane@ex.com"));
    assert_eq!(records[0].profile.school_year.as_deref(), Some("2025-2026"));
}

#[test]
fn test_skip_strategy_leaves_matches_untouched() {
    let h = harness(100);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    seed(&h, &tenant, &student(1));
    let mut changed = student(1);
    changed.insert("full_name".to_string(), "Renamed".to_string());

    let batch_id = ready_batch(&h, &tenant, DedupStrategy::Skip, vec![changed, student(2)]);
    let log = h
        .engine
        .commit(&tenant, batch_id, &CancellationToken::new())
        .expect("commit");
    assert_eq!((log.counts.created, log.counts.skipped), (1, 1));
    let kept = h
        .records
        .find_by_identifier(
            &tenant,
            &Identifier::Email("eleve1@lycee.cm".to_string()),
        )
        .expect("lookup")
        .expect("record");
    assert_eq!(kept.person.full_name.as_deref(), Some("Eleve 1"));
}

#[test]
fn test_fail_strategy_keeps_earlier_chunks_only() {
    let h = harness(2);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    seed(&h, &tenant, &student(5));

    let batch_id = ready_batch(
        &h,
        &tenant,
        DedupStrategy::Fail,
        (1..=6).map(student).collect(),
    );
    let log = h
        .engine
        .commit(&tenant, batch_id, &CancellationToken::new())
        .expect("commit log");

    match &log.outcome {
        CommitOutcome::Aborted {
            chunk_index,
            row_index,
            ..
        } => {
            assert_eq!(*chunk_index, 2);
            assert_eq!(*row_index, Some(5));
        }
        other => panic!("expected abort, got {other:?}"),
    }
    assert_eq!(log.counts.created, 4);
    assert_eq!(log.chunks_applied, 2);
    // Seeded record plus rows 1 to 4; nothing of chunk 2 or later.
    assert_eq!(h.records.count(&tenant).expect("count"), 5);

    let batch = h.staging.batch(&tenant, batch_id).expect("batch");
    assert_eq!(batch.status, BatchStatus::Failed);
    assert!(batch.failure_reason.is_some());
}

#[test]
fn test_cancelled_run_records_partial_progress() {
    let h = harness(10);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    let batch_id = ready_batch(
        &h,
        &tenant,
        DedupStrategy::Merge,
        (1..=30).map(student).collect(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let log = h.engine.commit(&tenant, batch_id, &cancel).expect("log");
    assert_eq!(log.outcome, CommitOutcome::Cancelled { chunk_index: 0 });
    assert_eq!(log.counts.processed(), 0);
    assert_eq!(
        h.staging.batch(&tenant, batch_id).expect("batch").status,
        BatchStatus::Failed
    );
}

#[test]
fn test_cancel_mid_run_keeps_finished_chunks() {
    let h = harness(10);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    let batch_id = ready_batch(
        &h,
        &tenant,
        DedupStrategy::Merge,
        (1..=50).map(student).collect(),
    );
    let cancel = CancellationToken::new();
    let cancelling = engine(
        h.staging.clone(),
        Arc::new(CancelAfter {
            inner: h.records.clone(),
            token: cancel.clone(),
            after: 2,
        }),
        h.locks.clone(),
        10,
    );

    let log = cancelling.commit(&tenant, batch_id, &cancel).expect("log");
    // Chunk 1 finishes after the request; chunk 2 never starts.
    assert_eq!(log.outcome, CommitOutcome::Cancelled { chunk_index: 2 });
    assert_eq!(log.chunks_applied, 2);
    assert_eq!(log.counts.created, 20);
    assert_eq!(h.records.count(&tenant).expect("count"), 20);
    assert_eq!(
        h.staging.commit_log(&tenant, batch_id).expect("log"),
        Some(log)
    );

    let batch = h.staging.batch(&tenant, batch_id).expect("batch");
    assert_eq!(batch.status, BatchStatus::Failed);
    assert_eq!(batch.failure_reason.as_deref(), Some("commit cancelled"));
}

#[test]
fn test_merge_keeps_phone_claimed_by_earlier_row() {
    for chunk_size in [1, 10] {
        let h = harness(chunk_size);
        let tenant = TenantId::new("lycee-a").expect("tenant");
        seed(&h, &tenant, &fields(&[("email", "a@ex.com".to_string())]));

        let batch_id = ready_batch(
            &h,
            &tenant,
            DedupStrategy::Merge,
            vec![
                fields(&[
                    ("email", "c@ex.com".to_string()),
                    ("phone", "+237699000000".to_string()),
                ]),
                fields(&[
                    ("email", "a@ex.com".to_string()),
                    ("phone", "+237699000000".to_string()),
                ]),
            ],
        );
        let log = h
            .engine
            .commit(&tenant, batch_id, &CancellationToken::new())
            .expect("commit");
        assert_eq!(log.outcome, CommitOutcome::Completed, "chunk size {chunk_size}");
        assert_eq!((log.counts.created, log.counts.updated), (1, 1));
        assert_eq!(h.records.count(&tenant).expect("count"), 2);

        let phone = Identifier::Phone("+237699000000".to_string());
        let owner = h
            .records
            .find_by_identifier(&tenant, &phone)
            .expect("lookup")
            .expect("phone owner");
        assert_eq!(owner.person.email.as_deref(), Some("c@ex.com"));
        let seeded = h
            .records
            .find_by_identifier(&tenant, &Identifier::Email("a@ex.com".to_string()))
            .expect("lookup")
            .expect("seeded record");
        assert_eq!(seeded.person.phone, None);
        assert_eq!(
            h.staging.batch(&tenant, batch_id).expect("batch").status,
            BatchStatus::Committed
        );
    }
}

#[test]
fn test_busy_tenant_times_out_without_writing() {
    let h = harness(10);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    let batch_id = ready_batch(&h, &tenant, DedupStrategy::Merge, vec![student(1)]);

    let _held = h.locks.try_acquire(&tenant).expect("lock").expect("lease");
    let err = h
        .engine
        .commit(&tenant, batch_id, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, CommitError::LockTimeout { .. }));
    assert_eq!(
        h.staging.batch(&tenant, batch_id).expect("batch").status,
        BatchStatus::ReadyToCommit
    );
    assert!(h.staging.commit_log(&tenant, batch_id).expect("log").is_none());
}

#[test]
fn test_different_tenants_commit_in_parallel() {
    let h = Arc::new(harness(50));
    let tenants: Vec<TenantId> = ["lycee-a", "college-b", "ecole-c"]
        .iter()
        .map(|t| TenantId::new(*t).expect("tenant"))
        .collect();
    let batches: Vec<BatchId> = tenants
        .iter()
        .map(|t| ready_batch(&h, t, DedupStrategy::Merge, (1..=200).map(student).collect()))
        .collect();

    let handles: Vec<_> = tenants
        .iter()
        .cloned()
        .zip(batches)
        .map(|(tenant, batch_id)| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                h.engine
                    .commit(&tenant, batch_id, &CancellationToken::new())
                    .map(|log| (tenant, log))
            })
        })
        .collect();
    for handle in handles {
        let (tenant, log) = handle.join().expect("thread").expect("commit");
        assert_eq!(log.counts.created, 200);
        // Same emails in every tenant: no cross-tenant matches.
        assert_eq!(h.records.count(&tenant).expect("count"), 200);
    }
}

#[test]
fn test_transient_write_failures_are_retried() {
    let h = harness(10);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    let batch_id = ready_batch(&h, &tenant, DedupStrategy::Merge, vec![student(1)]);
    h.records.fail_next_writes(2);

    let log = h
        .engine
        .commit(&tenant, batch_id, &CancellationToken::new())
        .expect("commit");
    assert_eq!(log.counts.created, 1);
}

#[test]
fn test_exhausted_retries_fail_the_batch_with_context() {
    let h = harness(1);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    let second = ready_batch(&h, &tenant, DedupStrategy::Merge, vec![student(1)]);
    h.records.fail_next_writes(3);
    let err = h
        .engine
        .commit(&tenant, second, &CancellationToken::new())
        .unwrap_err();
    match err {
        CommitError::Chunk {
            batch_id,
            chunk_index,
            ..
        } => {
            assert_eq!(batch_id, second);
            assert_eq!(chunk_index, 0);
        }
        other => panic!("unexpected error {other}"),
    }
    let log = h
        .staging
        .commit_log(&tenant, second)
        .expect("log")
        .expect("written");
    assert!(matches!(log.outcome, CommitOutcome::Aborted { .. }));
}

#[test]
fn test_committing_twice_is_refused() {
    let h = harness(10);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    let batch_id = ready_batch(&h, &tenant, DedupStrategy::Merge, vec![student(1)]);
    h.engine
        .commit(&tenant, batch_id, &CancellationToken::new())
        .expect("commit");
    let err = h
        .engine
        .commit(&tenant, batch_id, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, CommitError::NotReady { .. }));
}

#[test]
fn test_sample_masks_personal_data() {
    let h = harness(10);
    let tenant = TenantId::new("lycee-a").expect("tenant");
    let batch_id = ready_batch(
        &h,
        &tenant,
        DedupStrategy::Merge,
        vec![
            fields(&[("email", "jane.doe@ex.com".to_string())]),
            fields(&[("phone", "+237699000000".to_string())]),
            fields(&[("matricule", "A123".to_string())]),
        ],
    );
    let log = h
        .engine
        .commit(&tenant, batch_id, &CancellationToken::new())
        .expect("commit");
    let lines: Vec<String> = log
        .sample
        .iter()
        .map(|s| {
            format!(
                "{} {} {}",
                s.row_index,
                s.action,
                s.identifier.as_deref().unwrap_or("-")
            )
        })
        .collect();
    insta::assert_snapshot!(lines.join("\n"), @r"
    1 created email=j***@ex.com
    2 created phone=+237*****0000
    3 created matricule=A123
    ");
}
