//! Staging store: batches, staged rows and commit logs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use roster_model::{BatchId, BatchStatus, CommitLog, ImportBatch, StagingRow, TenantId};

use crate::error::{Result, StoreError};

/// Result of [`StagingStore::upsert_rows`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub stored: usize,
    /// Row indices dropped because another row of the batch already held
    /// the same content hash.
    pub duplicates: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub batches: usize,
    pub rows: usize,
}

pub trait StagingStore: Send + Sync {
    fn insert_batch(&self, batch: ImportBatch) -> Result<()>;

    fn batch(&self, tenant: &TenantId, batch_id: BatchId) -> Result<ImportBatch>;

    fn batches(&self, tenant: &TenantId) -> Result<Vec<ImportBatch>>;

    /// Replaces the stored batch if its status is still `expected`.
    fn update_batch(&self, batch: &ImportBatch, expected: BatchStatus) -> Result<()>;

    /// Stores rows keyed by `(batch, row_index)`, replacing rows with the
    /// same index. A row whose hash is already held by another index of the
    /// batch is not stored.
    fn upsert_rows(
        &self,
        tenant: &TenantId,
        batch_id: BatchId,
        rows: Vec<StagingRow>,
    ) -> Result<UpsertSummary>;

    /// Rows of the batch ordered by row index.
    fn rows(&self, tenant: &TenantId, batch_id: BatchId) -> Result<Vec<StagingRow>>;

    /// Commit logs are written once and never replaced.
    fn append_commit_log(&self, log: CommitLog) -> Result<()>;

    fn commit_log(&self, tenant: &TenantId, batch_id: BatchId) -> Result<Option<CommitLog>>;

    /// Removes batches of `tenant` created before `older_than` that are
    /// terminal or untouched since then, together with their rows.
    fn purge(&self, tenant: &TenantId, older_than: DateTime<Utc>) -> Result<PurgeSummary>;
}

#[derive(Debug)]
struct StagedBatch {
    batch: ImportBatch,
    rows: BTreeMap<u32, StagingRow>,
}

#[derive(Debug, Default)]
struct StagingState {
    batches: HashMap<BatchId, StagedBatch>,
    logs: HashMap<BatchId, CommitLog>,
}

impl StagingState {
    fn batch(&self, tenant: &TenantId, batch_id: BatchId) -> Result<&StagedBatch> {
        self.batches
            .get(&batch_id)
            .filter(|staged| staged.batch.tenant == *tenant)
            .ok_or_else(|| StoreError::BatchNotFound {
                tenant: tenant.clone(),
                batch_id,
            })
    }

    fn batch_mut(&mut self, tenant: &TenantId, batch_id: BatchId) -> Result<&mut StagedBatch> {
        self.batches
            .get_mut(&batch_id)
            .filter(|staged| staged.batch.tenant == *tenant)
            .ok_or_else(|| StoreError::BatchNotFound {
                tenant: tenant.clone(),
                batch_id,
            })
    }
}

/// Staging store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryStagingStore {
    state: RwLock<StagingState>,
}

impl InMemoryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, StagingState>> {
        self.state.read().map_err(|_| StoreError::Poisoned("staging"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, StagingState>> {
        self.state.write().map_err(|_| StoreError::Poisoned("staging"))
    }
}

impl StagingStore for InMemoryStagingStore {
    fn insert_batch(&self, batch: ImportBatch) -> Result<()> {
        let mut state = self.write()?;
        if state.batches.contains_key(&batch.id) {
            return Err(StoreError::BatchExists { batch_id: batch.id });
        }
        state.batches.insert(
            batch.id,
            StagedBatch {
                batch,
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn batch(&self, tenant: &TenantId, batch_id: BatchId) -> Result<ImportBatch> {
        let state = self.read()?;
        Ok(state.batch(tenant, batch_id)?.batch.clone())
    }

    fn batches(&self, tenant: &TenantId) -> Result<Vec<ImportBatch>> {
        let state = self.read()?;
        let mut batches: Vec<ImportBatch> = state
            .batches
            .values()
            .filter(|staged| staged.batch.tenant == *tenant)
            .map(|staged| staged.batch.clone())
            .collect();
        batches.sort_by_key(|b| b.created_at);
        Ok(batches)
    }

    fn update_batch(&self, batch: &ImportBatch, expected: BatchStatus) -> Result<()> {
        let mut state = self.write()?;
        let staged = state.batch_mut(&batch.tenant, batch.id)?;
        if staged.batch.status != expected {
            return Err(StoreError::StatusChanged {
                batch_id: batch.id,
                expected,
                found: staged.batch.status,
            });
        }
        staged.batch = batch.clone();
        Ok(())
    }

    fn upsert_rows(
        &self,
        tenant: &TenantId,
        batch_id: BatchId,
        mut rows: Vec<StagingRow>,
    ) -> Result<UpsertSummary> {
        let mut state = self.write()?;
        let staged = state.batch_mut(tenant, batch_id)?;
        if staged.batch.is_terminal() {
            return Err(StoreError::RowsFrozen {
                batch_id,
                status: staged.batch.status.to_string(),
            });
        }
        for row in &rows {
            if row.tenant != *tenant {
                return Err(StoreError::TenantMismatch {
                    expected: tenant.clone(),
                    found: row.tenant.clone(),
                });
            }
        }

        rows.sort_by_key(|row| row.row_index);
        for row in &rows {
            staged.rows.remove(&row.row_index);
        }
        let mut held: HashSet<_> = staged.rows.values().filter_map(|r| r.row_hash).collect();

        let mut summary = UpsertSummary::default();
        for mut row in rows {
            if let Some(hash) = row.row_hash
                && !held.insert(hash)
            {
                summary.duplicates.push(row.row_index);
                continue;
            }
            row.batch_id = batch_id;
            staged.rows.insert(row.row_index, row);
            summary.stored += 1;
        }
        debug!(
            batch_id = %batch_id,
            stored = summary.stored,
            duplicates = summary.duplicates.len(),
            "staging rows upserted"
        );
        Ok(summary)
    }

    fn rows(&self, tenant: &TenantId, batch_id: BatchId) -> Result<Vec<StagingRow>> {
        let state = self.read()?;
        Ok(state
            .batch(tenant, batch_id)?
            .rows
            .values()
            .cloned()
            .collect())
    }

    fn append_commit_log(&self, log: CommitLog) -> Result<()> {
        let mut state = self.write()?;
        state.batch(&log.tenant, log.batch_id)?;
        if state.logs.contains_key(&log.batch_id) {
            return Err(StoreError::CommitLogExists {
                batch_id: log.batch_id,
            });
        }
        state.logs.insert(log.batch_id, log);
        Ok(())
    }

    fn commit_log(&self, tenant: &TenantId, batch_id: BatchId) -> Result<Option<CommitLog>> {
        let state = self.read()?;
        Ok(state
            .logs
            .get(&batch_id)
            .filter(|log| log.tenant == *tenant)
            .cloned())
    }

    fn purge(&self, tenant: &TenantId, older_than: DateTime<Utc>) -> Result<PurgeSummary> {
        let mut state = self.write()?;
        let expired: Vec<BatchId> = state
            .batches
            .values()
            .filter(|staged| {
                let batch = &staged.batch;
                batch.tenant == *tenant
                    && batch.created_at < older_than
                    && (batch.is_terminal() || batch.updated_at < older_than)
            })
            .map(|staged| staged.batch.id)
            .collect();

        let mut summary = PurgeSummary::default();
        for batch_id in expired {
            if let Some(staged) = state.batches.remove(&batch_id) {
                summary.batches += 1;
                summary.rows += staged.rows.len();
            }
        }
        info!(
            tenant = %tenant,
            batches = summary.batches,
            rows = summary.rows,
            "staging purged"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_model::{
        BatchRequest, DedupStrategy, RawRow, RowHash, SourceFormat, UploadManifest,
    };

    fn batch(tenant: &TenantId) -> ImportBatch {
        ImportBatch::new(BatchRequest {
            tenant: tenant.clone(),
            created_by: "op".to_string(),
            school_year: "2024-2025".to_string(),
            strategy: DedupStrategy::Merge,
            manifest: UploadManifest {
                original_filename: "f.csv".to_string(),
                format: SourceFormat::Csv,
                checksum_sha256: String::new(),
                mime_type: None,
                encoding: None,
                delimiter: None,
                sheet_name: None,
                headers: Vec::new(),
                row_count: 0,
            },
        })
        .unwrap()
    }

    fn row(batch: &ImportBatch, index: u32, hash: u8) -> StagingRow {
        let mut row = StagingRow::new(
            batch.id,
            batch.tenant.clone(),
            RawRow::new(index, BTreeMap::new()).unwrap(),
        );
        row.set_normalized(BTreeMap::new(), RowHash::from_digest([hash; 32]));
        row
    }

    #[test]
    fn test_duplicate_hash_is_dropped() {
        let store = InMemoryStagingStore::new();
        let tenant = TenantId::new("a").unwrap();
        let b = batch(&tenant);
        store.insert_batch(b.clone()).unwrap();

        let summary = store
            .upsert_rows(&tenant, b.id, vec![row(&b, 2, 7), row(&b, 1, 7), row(&b, 3, 8)])
            .unwrap();
        assert_eq!(summary.stored, 2);
        assert_eq!(summary.duplicates, vec![2]);

        // Re-processing the same content does not duplicate rows.
        let again = store
            .upsert_rows(&tenant, b.id, vec![row(&b, 1, 7), row(&b, 3, 8)])
            .unwrap();
        assert_eq!(again.stored, 2);
        let indices: Vec<u32> = store
            .rows(&tenant, b.id)
            .unwrap()
            .iter()
            .map(|r| r.row_index)
            .collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_other_tenant_cannot_see_batch() {
        let store = InMemoryStagingStore::new();
        let a = TenantId::new("a").unwrap();
        let other = TenantId::new("b").unwrap();
        let b = batch(&a);
        store.insert_batch(b.clone()).unwrap();
        assert!(matches!(
            store.batch(&other, b.id),
            Err(StoreError::BatchNotFound { .. })
        ));
        assert!(store.rows(&other, b.id).is_err());
    }

    #[test]
    fn test_rows_frozen_after_commit() {
        let store = InMemoryStagingStore::new();
        let tenant = TenantId::new("a").unwrap();
        let mut b = batch(&tenant);
        store.insert_batch(b.clone()).unwrap();
        for next in [
            BatchStatus::Mapped,
            BatchStatus::Validated,
            BatchStatus::ReadyToCommit,
            BatchStatus::Committed,
        ] {
            b.transition(next).unwrap();
        }
        store.update_batch(&b, BatchStatus::Uploaded).unwrap();
        assert!(matches!(
            store.upsert_rows(&tenant, b.id, vec![row(&b, 1, 1)]),
            Err(StoreError::RowsFrozen { .. })
        ));
    }

    #[test]
    fn test_stale_batch_copy_is_refused() {
        let store = InMemoryStagingStore::new();
        let tenant = TenantId::new("a").unwrap();
        let mut b = batch(&tenant);
        store.insert_batch(b.clone()).unwrap();
        b.transition(BatchStatus::Mapped).unwrap();
        b.transition(BatchStatus::Validated).unwrap();
        store.update_batch(&b, BatchStatus::Uploaded).unwrap();

        let stale = b.clone();
        b.transition(BatchStatus::ReadyToCommit).unwrap();
        store.update_batch(&b, BatchStatus::Validated).unwrap();

        let err = store
            .update_batch(&stale, BatchStatus::Validated)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusChanged {
                expected: BatchStatus::Validated,
                found: BatchStatus::ReadyToCommit,
                ..
            }
        ));
        assert_eq!(
            store.batch(&tenant, b.id).unwrap().status,
            BatchStatus::ReadyToCommit
        );
    }

    #[test]
    fn test_purge_keeps_recent_batches() {
        let store = InMemoryStagingStore::new();
        let tenant = TenantId::new("a").unwrap();
        let old = batch(&tenant);
        store.insert_batch(old.clone()).unwrap();
        store
            .upsert_rows(&tenant, old.id, vec![row(&old, 1, 1)])
            .unwrap();

        let summary = store.purge(&tenant, old.created_at).unwrap();
        assert_eq!(summary, PurgeSummary::default());

        let later = Utc::now() + chrono::Duration::seconds(1);
        let summary = store.purge(&tenant, later).unwrap();
        assert_eq!(summary, PurgeSummary { batches: 1, rows: 1 });
        assert!(store.batch(&tenant, old.id).is_err());
    }
}
