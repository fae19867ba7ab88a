//! Copy-on-write entitlement snapshots.
//!
//! Each tenant has one [`SnapshotCache`]. Readers load the current snapshot
//! without locking; refreshes build a complete replacement and swap it in.
//! A refresh that has been overtaken by a newer one is discarded instead of
//! installed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use arc_swap::ArcSwapOption;
use chrono::Utc;
use thiserror::Error;

use clinicops_core::{DomainError, TenantId};
use clinicops_entitlements::EntitlementSnapshot;

use crate::directory::{DirectoryError, RoleCatalog, TenantDirectory};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Claim on the next install slot of a cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub struct RefreshTicket {
    generation: u64,
}

impl RefreshTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Atomically swappable snapshot for one tenant.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: ArcSwapOption<EntitlementSnapshot>,
    /// Latest ticket handed out.
    requested: AtomicU64,
    /// Generation of the installed snapshot. Guarded so the "is this ticket
    /// still the latest" check and the swap happen together.
    installed: Mutex<u64>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: EntitlementSnapshot) -> Self {
        let cache = Self::new();
        let ticket = cache.begin_refresh();
        cache.install(ticket, snapshot);
        cache
    }

    /// Current snapshot, if one has been installed. Never blocks.
    pub fn load(&self) -> Option<Arc<EntitlementSnapshot>> {
        self.current.load_full()
    }

    /// Start a refresh. Any ticket issued earlier becomes stale.
    pub fn begin_refresh(&self) -> RefreshTicket {
        RefreshTicket {
            generation: self.requested.fetch_add(1, Ordering::AcqRel) + 1,
        }
    }

    /// Install a snapshot built under `ticket`.
    ///
    /// Returns `false` (and drops the snapshot) if a newer refresh has begun
    /// since the ticket was issued.
    pub fn install(&self, ticket: RefreshTicket, snapshot: EntitlementSnapshot) -> bool {
        let mut installed = self.installed.lock().unwrap_or_else(|e| e.into_inner());

        let latest = self.requested.load(Ordering::Acquire);
        if ticket.generation != latest || ticket.generation <= *installed {
            tracing::debug!(
                tenant_id = %snapshot.tenant_id(),
                ticket = ticket.generation,
                latest,
                "discarding superseded snapshot refresh"
            );
            return false;
        }

        self.current.store(Some(Arc::new(snapshot)));
        *installed = ticket.generation;
        true
    }

    /// Generation of the installed snapshot (0 if none).
    pub fn generation(&self) -> u64 {
        *self.installed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-tenant snapshot caches backed by a directory and a role catalog.
pub struct SnapshotRegistry<D, C> {
    directory: D,
    catalog: C,
    caches: RwLock<HashMap<TenantId, Arc<SnapshotCache>>>,
}

impl<D, C> SnapshotRegistry<D, C>
where
    D: TenantDirectory,
    C: RoleCatalog,
{
    pub fn new(directory: D, catalog: C) -> Self {
        Self {
            directory,
            catalog,
            caches: RwLock::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// The cache for a tenant, created empty on first use.
    pub fn cache_for(&self, tenant_id: TenantId) -> Arc<SnapshotCache> {
        if let Some(cache) = self
            .caches
            .read()
            .ok()
            .and_then(|m| m.get(&tenant_id).cloned())
        {
            return cache;
        }

        let mut caches = self.caches.write().unwrap_or_else(|e| e.into_inner());
        caches.entry(tenant_id).or_default().clone()
    }

    /// Currently installed snapshot, without loading.
    pub fn current(&self, tenant_id: TenantId) -> Option<Arc<EntitlementSnapshot>> {
        self.cache_for(tenant_id).load()
    }

    /// Build a fresh snapshot from storage (not installed).
    pub fn load_snapshot(&self, tenant_id: TenantId) -> Result<EntitlementSnapshot, SnapshotError> {
        let tenant = self.directory.fetch_tenant(tenant_id)?;
        let role_permissions = self.catalog.fetch_role_permissions(tenant_id)?;
        Ok(EntitlementSnapshot::new(tenant, role_permissions, Utc::now())?)
    }

    /// Rebuild and install a tenant's snapshot.
    ///
    /// Returns `Ok(None)` if this refresh was overtaken by a newer one; the
    /// newer refresh's result stands.
    pub fn refresh(&self, tenant_id: TenantId) -> Result<Option<Arc<EntitlementSnapshot>>, SnapshotError> {
        let cache = self.cache_for(tenant_id);
        let ticket = cache.begin_refresh();
        let snapshot = self.load_snapshot(tenant_id)?;

        if cache.install(ticket, snapshot) {
            Ok(cache.load())
        } else {
            Ok(None)
        }
    }

    /// Installed snapshot, loading it first if the tenant has none yet.
    pub fn get_or_load(&self, tenant_id: TenantId) -> Result<Arc<EntitlementSnapshot>, SnapshotError> {
        let cache = self.cache_for(tenant_id);
        if let Some(snapshot) = cache.load() {
            return Ok(snapshot);
        }

        match self.refresh(tenant_id)? {
            Some(snapshot) => Ok(snapshot),
            // A concurrent refresh won; whatever it installed is current.
            None => match cache.load() {
                Some(snapshot) => Ok(snapshot),
                None => Ok(Arc::new(self.load_snapshot(tenant_id)?)),
            },
        }
    }

    /// Drop a tenant's cache. The next [`Self::get_or_load`] reads storage
    /// again, and fails if storage cannot be read.
    pub fn evict(&self, tenant_id: TenantId) {
        let mut caches = self.caches.write().unwrap_or_else(|e| e.into_inner());
        caches.remove(&tenant_id);
    }
}
