//! Canonical record store.
//!
//! Records are unique per tenant by each of their strong identifiers.
//! Creation from an import row is keyed by [`Provenance`] so the same row
//! of the same batch never produces a second record.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use tracing::{debug, trace};

use roster_model::{CanonicalRecord, Identifier, Provenance, RecordDraft, RecordId, TenantId};

use crate::error::{Result, StoreError};

/// One write of a chunk.
#[derive(Debug, Clone)]
pub enum RecordWrite {
    Create {
        draft: RecordDraft,
        provenance: Provenance,
    },
    /// Replaces the stored record with the same id.
    Update { record: CanonicalRecord },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created(RecordId),
    /// The provenance already had a record; nothing was written.
    Replayed(RecordId),
    Updated(RecordId),
}

impl WriteOutcome {
    pub fn record_id(&self) -> RecordId {
        match self {
            WriteOutcome::Created(id) | WriteOutcome::Replayed(id) | WriteOutcome::Updated(id) => {
                *id
            }
        }
    }
}

/// Canonical record store, always scoped by tenant.
pub trait RecordStore: Send + Sync {
    fn find_by_identifier(
        &self,
        tenant: &TenantId,
        identifier: &Identifier,
    ) -> Result<Option<CanonicalRecord>>;

    fn find_by_provenance(
        &self,
        tenant: &TenantId,
        provenance: &Provenance,
    ) -> Result<Option<CanonicalRecord>>;

    /// Insert-if-absent. Returns the existing record when `provenance` was
    /// already used; fails with `UniqueViolation` when an identifier is taken.
    fn create(
        &self,
        tenant: &TenantId,
        draft: RecordDraft,
        provenance: Option<Provenance>,
    ) -> Result<CanonicalRecord>;

    fn update(&self, tenant: &TenantId, record: CanonicalRecord) -> Result<CanonicalRecord>;

    /// Applies every write or none of them.
    fn apply_chunk(&self, tenant: &TenantId, writes: Vec<RecordWrite>)
    -> Result<Vec<WriteOutcome>>;

    fn count(&self, tenant: &TenantId) -> Result<usize>;
}

#[derive(Debug, Clone, Default)]
struct TenantRecords {
    records: HashMap<RecordId, CanonicalRecord>,
    by_identifier: HashMap<Identifier, RecordId>,
    by_provenance: HashMap<Provenance, RecordId>,
}

impl TenantRecords {
    fn find(&self, identifier: &Identifier) -> Option<&CanonicalRecord> {
        self.by_identifier
            .get(identifier)
            .and_then(|id| self.records.get(id))
    }

    fn claim_identifiers(&self, record: &CanonicalRecord) -> Result<()> {
        for identifier in record.identifiers() {
            if let Some(owner) = self.by_identifier.get(&identifier)
                && *owner != record.id
            {
                return Err(StoreError::UniqueViolation {
                    identifier: identifier.to_string(),
                    existing: *owner,
                });
            }
        }
        Ok(())
    }

    fn create(
        &mut self,
        tenant: &TenantId,
        draft: RecordDraft,
        provenance: Option<Provenance>,
    ) -> Result<WriteOutcome> {
        if let Some(id) = provenance.and_then(|p| self.by_provenance.get(&p)) {
            return Ok(WriteOutcome::Replayed(*id));
        }
        let record = CanonicalRecord::new(tenant.clone(), draft, provenance);
        self.claim_identifiers(&record)?;
        let id = record.id;
        for identifier in record.identifiers() {
            self.by_identifier.insert(identifier, id);
        }
        if let Some(p) = provenance {
            self.by_provenance.insert(p, id);
        }
        self.records.insert(id, record);
        Ok(WriteOutcome::Created(id))
    }

    fn update(&mut self, tenant: &TenantId, mut record: CanonicalRecord) -> Result<WriteOutcome> {
        let previous = self
            .records
            .get(&record.id)
            .ok_or_else(|| StoreError::RecordNotFound {
                tenant: tenant.clone(),
                record_id: record.id,
            })?;
        if record.tenant != *tenant {
            return Err(StoreError::TenantMismatch {
                expected: tenant.clone(),
                found: record.tenant,
            });
        }
        self.claim_identifiers(&record)?;
        for identifier in previous.identifiers() {
            self.by_identifier.remove(&identifier);
        }
        let id = record.id;
        for identifier in record.identifiers() {
            self.by_identifier.insert(identifier, id);
        }
        record.updated_at = Utc::now();
        self.records.insert(id, record);
        Ok(WriteOutcome::Updated(id))
    }

    fn apply(&mut self, tenant: &TenantId, write: RecordWrite) -> Result<WriteOutcome> {
        match write {
            RecordWrite::Create { draft, provenance } => self.create(tenant, draft, Some(provenance)),
            RecordWrite::Update { record } => self.update(tenant, record),
        }
    }
}

/// Record store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tenants: Mutex<HashMap<TenantId, TenantRecords>>,
    chunk_writes: AtomicUsize,
    failures_left: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `apply_chunk` calls that reached the store.
    pub fn chunk_writes(&self) -> usize {
        self.chunk_writes.load(Ordering::SeqCst)
    }

    /// Makes the next `count` chunk writes fail as unavailable.
    pub fn fail_next_writes(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// All records of `tenant`, in no particular order.
    pub fn records(&self, tenant: &TenantId) -> Result<Vec<CanonicalRecord>> {
        let tenants = self.lock()?;
        Ok(tenants
            .get(tenant)
            .map(|t| t.records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TenantId, TenantRecords>>> {
        self.tenants
            .lock()
            .map_err(|_| StoreError::Poisoned("records"))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn find_by_identifier(
        &self,
        tenant: &TenantId,
        identifier: &Identifier,
    ) -> Result<Option<CanonicalRecord>> {
        let tenants = self.lock()?;
        Ok(tenants
            .get(tenant)
            .and_then(|t| t.find(identifier))
            .cloned())
    }

    fn find_by_provenance(
        &self,
        tenant: &TenantId,
        provenance: &Provenance,
    ) -> Result<Option<CanonicalRecord>> {
        let tenants = self.lock()?;
        Ok(tenants.get(tenant).and_then(|t| {
            t.by_provenance
                .get(provenance)
                .and_then(|id| t.records.get(id))
                .cloned()
        }))
    }

    fn create(
        &self,
        tenant: &TenantId,
        draft: RecordDraft,
        provenance: Option<Provenance>,
    ) -> Result<CanonicalRecord> {
        let mut tenants = self.lock()?;
        let state = tenants.entry(tenant.clone()).or_default();
        let id = state.create(tenant, draft, provenance)?.record_id();
        state
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::RecordNotFound {
                tenant: tenant.clone(),
                record_id: id,
            })
    }

    fn update(&self, tenant: &TenantId, record: CanonicalRecord) -> Result<CanonicalRecord> {
        let mut tenants = self.lock()?;
        let state = tenants.entry(tenant.clone()).or_default();
        let id = state.update(tenant, record)?.record_id();
        state
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::RecordNotFound {
                tenant: tenant.clone(),
                record_id: id,
            })
    }

    fn apply_chunk(
        &self,
        tenant: &TenantId,
        writes: Vec<RecordWrite>,
    ) -> Result<Vec<WriteOutcome>> {
        self.chunk_writes.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable {
                collaborator: "record store",
                reason: "simulated outage".to_string(),
            });
        }

        let mut tenants = self.lock()?;
        // Work on a copy so a failing write leaves the tenant untouched.
        let committed = tenants.get(tenant);
        let mut staged = committed.cloned().unwrap_or_default();
        let mut outcomes = Vec::with_capacity(writes.len());
        for write in writes {
            let outcome = staged.apply(tenant, write).map_err(|error| match error {
                // The owner was created by this chunk and is rolled back with it.
                StoreError::UniqueViolation {
                    identifier,
                    existing,
                } if !committed.is_some_and(|t| t.records.contains_key(&existing)) => {
                    StoreError::ChunkCollision { identifier }
                }
                other => other,
            })?;
            outcomes.push(outcome);
        }
        tenants.insert(tenant.clone(), staged);
        debug!(tenant = %tenant, writes = outcomes.len(), "chunk applied");
        trace!(?outcomes, "chunk outcomes");
        Ok(outcomes)
    }

    fn count(&self, tenant: &TenantId) -> Result<usize> {
        let tenants = self.lock()?;
        Ok(tenants.get(tenant).map_or(0, |t| t.records.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_model::{BatchId, Person, RowHash};

    fn draft(email: Option<&str>, phone: Option<&str>) -> RecordDraft {
        RecordDraft {
            person: Person {
                email: email.map(str::to_string),
                phone: phone.map(str::to_string),
                ..Person::default()
            },
            ..RecordDraft::default()
        }
    }

    fn provenance(byte: u8) -> Provenance {
        Provenance {
            batch_id: BatchId::new(),
            row_hash: RowHash::from_digest([byte; 32]),
        }
    }

    #[test]
    fn test_create_is_idempotent_per_provenance() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("a").unwrap();
        let p = provenance(1);
        let first = store
            .create(&tenant, draft(Some("jane@ex.com"), None), Some(p))
            .unwrap();
        let second = store
            .create(&tenant, draft(Some("jane@ex.com"), None), Some(p))
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.count(&tenant).unwrap(), 1);
    }

    #[test]
    fn test_identifiers_are_unique_per_tenant() {
        let store = InMemoryRecordStore::new();
        let a = TenantId::new("a").unwrap();
        let b = TenantId::new("b").unwrap();
        store.create(&a, draft(Some("jane@ex.com"), None), None).unwrap();
        let err = store
            .create(&a, draft(Some("jane@ex.com"), None), None)
            .unwrap_err();
        assert!(err.is_conflict());
        store.create(&b, draft(Some("jane@ex.com"), None), None).unwrap();
        assert_eq!(store.count(&b).unwrap(), 1);
    }

    #[test]
    fn test_failing_chunk_writes_nothing() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("a").unwrap();
        store
            .create(&tenant, draft(None, Some("+237699000000")), None)
            .unwrap();
        let writes = vec![
            RecordWrite::Create {
                draft: draft(Some("new@ex.com"), None),
                provenance: provenance(2),
            },
            RecordWrite::Create {
                draft: draft(None, Some("+237699000000")),
                provenance: provenance(3),
            },
        ];
        assert!(store.apply_chunk(&tenant, writes).is_err());
        assert_eq!(store.count(&tenant).unwrap(), 1);
        let email = Identifier::Email("new@ex.com".to_string());
        assert!(store.find_by_identifier(&tenant, &email).unwrap().is_none());
    }

    #[test]
    fn test_collision_inside_chunk_names_no_record() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("a").unwrap();
        let writes = vec![
            RecordWrite::Create {
                draft: draft(Some("c@ex.com"), Some("+237699000000")),
                provenance: provenance(4),
            },
            RecordWrite::Create {
                draft: draft(None, Some("+237699000000")),
                provenance: provenance(5),
            },
        ];
        let err = store.apply_chunk(&tenant, writes).unwrap_err();
        assert!(err.is_conflict());
        assert!(matches!(err, StoreError::ChunkCollision { .. }));
        assert_eq!(store.count(&tenant).unwrap(), 0);
    }

    #[test]
    fn test_update_reindexes_identifiers() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("a").unwrap();
        let mut record = store
            .create(&tenant, draft(Some("old@ex.com"), None), None)
            .unwrap();
        record.person.email = Some("new@ex.com".to_string());
        store.update(&tenant, record.clone()).unwrap();

        let old = Identifier::Email("old@ex.com".to_string());
        let new = Identifier::Email("new@ex.com".to_string());
        assert!(store.find_by_identifier(&tenant, &old).unwrap().is_none());
        assert_eq!(
            store.find_by_identifier(&tenant, &new).unwrap().map(|r| r.id),
            Some(record.id)
        );
    }

    #[test]
    fn test_injected_failures_are_transient() {
        let store = InMemoryRecordStore::new();
        let tenant = TenantId::new("a").unwrap();
        store.fail_next_writes(1);
        let err = store.apply_chunk(&tenant, Vec::new()).unwrap_err();
        assert!(err.is_transient());
        assert!(store.apply_chunk(&tenant, Vec::new()).is_ok());
        assert_eq!(store.chunk_writes(), 2);
    }
}
