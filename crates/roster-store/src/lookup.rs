//! Reference code resolution.
//!
//! [`ReferenceSource`] is the authoritative lookup collaborator;
//! [`LookupCache`] is a tenant-scoped read-through cache in front of it.
//! Codes are matched case-insensitively, keys always include the tenant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, trace};

use roster_model::{ReferenceId, ReferenceKind, TenantId};

use crate::error::{Result, StoreError};
use crate::retry::RetryPolicy;

/// Resolves external level/department codes to internal identifiers.
pub trait ReferenceSource: Send + Sync {
    /// `Ok(None)` means the code is unknown for this tenant.
    fn resolve(
        &self,
        tenant: &TenantId,
        kind: ReferenceKind,
        code: &str,
    ) -> Result<Option<ReferenceId>>;
}

fn fold_code(code: &str) -> String {
    code.trim().to_uppercase()
}

type ReferenceKey = (TenantId, ReferenceKind, String);

/// Reference tables held in memory, keyed by tenant.
#[derive(Debug, Default)]
pub struct InMemoryReferenceSource {
    entries: RwLock<HashMap<ReferenceKey, ReferenceId>>,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl InMemoryReferenceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `code` (or an alias of it) for `tenant`.
    pub fn insert(
        &self,
        tenant: &TenantId,
        kind: ReferenceKind,
        code: &str,
        id: ReferenceId,
    ) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::Poisoned("references"))?;
        entries.insert((tenant.clone(), kind, fold_code(code)), id);
        Ok(())
    }

    /// Number of `resolve` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes the next `count` calls fail as unavailable.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }
}

impl ReferenceSource for InMemoryReferenceSource {
    fn resolve(
        &self,
        tenant: &TenantId,
        kind: ReferenceKind,
        code: &str,
    ) -> Result<Option<ReferenceId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable {
                collaborator: "reference source",
                reason: "simulated outage".to_string(),
            });
        }
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::Poisoned("references"))?;
        Ok(entries
            .get(&(tenant.clone(), kind, fold_code(code)))
            .cloned())
    }
}

/// Read-through cache of resolved reference codes.
///
/// Only positive results are cached, so a code added to the reference
/// tables is picked up on the next lookup. Filling an entry twice with the
/// same value is harmless, so misses take no lock while calling the source.
pub struct LookupCache {
    source: Arc<dyn ReferenceSource>,
    retry: RetryPolicy,
    entries: RwLock<HashMap<ReferenceKey, ReferenceId>>,
}

impl LookupCache {
    pub fn new(source: Arc<dyn ReferenceSource>) -> Self {
        Self::with_retry(source, RetryPolicy::default())
    }

    pub fn with_retry(source: Arc<dyn ReferenceSource>, retry: RetryPolicy) -> Self {
        Self {
            source,
            retry,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolve(
        &self,
        tenant: &TenantId,
        kind: ReferenceKind,
        code: &str,
    ) -> Result<Option<ReferenceId>> {
        let key = (tenant.clone(), kind, fold_code(code));
        {
            let entries = self
                .entries
                .read()
                .map_err(|_| StoreError::Poisoned("lookup cache"))?;
            if let Some(id) = entries.get(&key) {
                trace!(tenant = %tenant, kind = %kind, "lookup cache hit");
                return Ok(Some(id.clone()));
            }
        }

        let resolved = self
            .retry
            .run("reference lookup", || self.source.resolve(tenant, kind, code))?;
        if let Some(id) = &resolved {
            debug!(tenant = %tenant, kind = %kind, "lookup cache fill");
            self.entries
                .write()
                .map_err(|_| StoreError::Poisoned("lookup cache"))?
                .insert(key, id.clone());
        }
        Ok(resolved)
    }

    /// Drops every cached entry of `tenant`.
    pub fn invalidate(&self, tenant: &TenantId) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| StoreError::Poisoned("lookup cache"))?
            .retain(|(owner, _, _), _| owner != tenant);
        Ok(())
    }

    /// Number of cached entries across all tenants.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for LookupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupCache")
            .field("entries", &self.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
