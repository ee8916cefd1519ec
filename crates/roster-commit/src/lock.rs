//! Per-tenant commit serialization.
//!
//! At most one commit per tenant holds a lease at a time; tenants never
//! wait on each other. Leases expire after a TTL so a crashed run cannot
//! keep its tenant locked: an expired lease is taken over by the next
//! acquirer, and the previous holder notices on its next `renew`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use roster_model::TenantId;

use crate::error::{CommitError, Result};

#[derive(Debug, Clone, Copy)]
struct LeaseEntry {
    token: u64,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct TenantLockCoordinator {
    leases: Mutex<HashMap<TenantId, LeaseEntry>>,
    released: Condvar,
    ttl: Duration,
    next_token: AtomicU64,
}

impl TenantLockCoordinator {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            leases: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            ttl,
            next_token: AtomicU64::new(1),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<TenantId, LeaseEntry>>> {
        self.leases.lock().map_err(|_| CommitError::Poisoned)
    }

    /// Takes the lease if it is free or expired.
    fn claim(
        &self,
        leases: &mut HashMap<TenantId, LeaseEntry>,
        tenant: &TenantId,
        now: Instant,
    ) -> Option<u64> {
        if let Some(entry) = leases.get(tenant) {
            if entry.expires_at > now {
                return None;
            }
            warn!(tenant = %tenant, "tenant commit lease expired, taking over");
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        leases.insert(
            tenant.clone(),
            LeaseEntry {
                token,
                expires_at: now + self.ttl,
            },
        );
        Some(token)
    }

    /// Returns `None` when another holder has a live lease.
    pub fn try_acquire(self: &Arc<Self>, tenant: &TenantId) -> Result<Option<TenantLease>> {
        let mut leases = self.lock()?;
        Ok(self
            .claim(&mut leases, tenant, Instant::now())
            .map(|token| self.lease(tenant, token)))
    }

    /// Waits up to `wait` for the lease.
    pub fn acquire(self: &Arc<Self>, tenant: &TenantId, wait: Duration) -> Result<TenantLease> {
        let started = Instant::now();
        let deadline = started + wait;
        let mut leases = self.lock()?;
        loop {
            let now = Instant::now();
            if let Some(token) = self.claim(&mut leases, tenant, now) {
                debug!(
                    tenant = %tenant,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "tenant commit lease acquired"
                );
                return Ok(self.lease(tenant, token));
            }
            if now >= deadline {
                return Err(CommitError::LockTimeout {
                    tenant: tenant.clone(),
                    waited_ms: wait.as_millis() as u64,
                });
            }
            // Wake on release, or when the current lease would expire.
            let holder_expiry = leases
                .get(tenant)
                .map_or(deadline, |entry| entry.expires_at.min(deadline));
            let timeout = holder_expiry.saturating_duration_since(now);
            let (guard, _) = self
                .released
                .wait_timeout(leases, timeout.max(Duration::from_millis(1)))
                .map_err(|_| CommitError::Poisoned)?;
            leases = guard;
        }
    }

    fn lease(self: &Arc<Self>, tenant: &TenantId, token: u64) -> TenantLease {
        TenantLease {
            coordinator: Arc::clone(self),
            tenant: tenant.clone(),
            token,
        }
    }

    fn release(&self, tenant: &TenantId, token: u64) {
        let Ok(mut leases) = self.leases.lock() else {
            return;
        };
        if leases.get(tenant).is_some_and(|entry| entry.token == token) {
            leases.remove(tenant);
            debug!(tenant = %tenant, "tenant commit lease released");
        }
        drop(leases);
        self.released.notify_all();
    }
}

/// A held tenant lease; released on drop.
#[derive(Debug)]
pub struct TenantLease {
    coordinator: Arc<TenantLockCoordinator>,
    tenant: TenantId,
    token: u64,
}

impl TenantLease {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Extends the lease by one TTL. Fails if another run took it over.
    pub fn renew(&self) -> Result<()> {
        let mut leases = self.coordinator.lock()?;
        match leases.get_mut(&self.tenant) {
            Some(entry) if entry.token == self.token => {
                entry.expires_at = Instant::now() + self.coordinator.ttl;
                Ok(())
            }
            _ => Err(CommitError::LeaseLost {
                tenant: self.tenant.clone(),
            }),
        }
    }

    /// Whether this lease is still the live one for its tenant.
    pub fn is_held(&self) -> bool {
        self.coordinator.lock().is_ok_and(|leases| {
            leases
                .get(&self.tenant)
                .is_some_and(|entry| entry.token == self.token && entry.expires_at > Instant::now())
        })
    }
}

impl Drop for TenantLease {
    fn drop(&mut self) {
        self.coordinator.release(&self.tenant, self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn tenant(name: &str) -> TenantId {
        TenantId::new(name).unwrap()
    }

    #[test]
    fn test_one_lease_per_tenant() {
        let locks = TenantLockCoordinator::new(Duration::from_secs(30));
        let a = tenant("a");
        let lease = locks.try_acquire(&a).unwrap().unwrap();
        assert!(lease.is_held());
        assert!(locks.try_acquire(&a).unwrap().is_none());
        assert!(locks.try_acquire(&tenant("b")).unwrap().is_some());
        drop(lease);
        assert!(locks.try_acquire(&a).unwrap().is_some());
    }

    #[test]
    fn test_acquire_times_out() {
        let locks = TenantLockCoordinator::new(Duration::from_secs(30));
        let a = tenant("a");
        let _held = locks.try_acquire(&a).unwrap().unwrap();
        let err = locks.acquire(&a, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, CommitError::LockTimeout { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_acquire_waits_for_release() {
        let locks = TenantLockCoordinator::new(Duration::from_secs(30));
        let a = tenant("a");
        let held = locks.try_acquire(&a).unwrap().unwrap();
        let waiter = {
            let locks = Arc::clone(&locks);
            let a = a.clone();
            thread::spawn(move || locks.acquire(&a, Duration::from_secs(5)).map(|_| ()))
        };
        thread::sleep(Duration::from_millis(20));
        drop(held);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn test_expired_lease_is_taken_over() {
        let locks = TenantLockCoordinator::new(Duration::from_millis(10));
        let a = tenant("a");
        let stale = locks.try_acquire(&a).unwrap().unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(!stale.is_held());

        let fresh = locks.acquire(&a, Duration::from_millis(100)).unwrap();
        assert!(matches!(stale.renew(), Err(CommitError::LeaseLost { .. })));
        // Dropping the stale lease must not release the new holder.
        drop(stale);
        assert!(fresh.renew().is_ok());
    }
}
