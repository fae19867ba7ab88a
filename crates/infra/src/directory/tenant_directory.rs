use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use clinicops_core::{ExpectedVersion, TenantId};
use clinicops_entitlements::Tenant;

use super::{DirectoryError, WriteAhead};

/// Persists and serves tenant records.
pub trait TenantDirectory: Send + Sync {
    fn fetch_tenant(&self, tenant_id: TenantId) -> Result<Tenant, DirectoryError>;

    /// Store a brand-new tenant at version 1.
    fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, DirectoryError>;

    /// Replace a tenant record, bumping its version.
    ///
    /// Fails with [`DirectoryError::Conflict`] if the stored version does not
    /// match `expected`, and with [`DirectoryError::WriteAheadFailed`] if the
    /// hook fails. In both cases the stored record is unchanged.
    fn commit_tenant(
        &self,
        next: Tenant,
        expected: ExpectedVersion,
        write_ahead: &mut dyn WriteAhead,
    ) -> Result<Tenant, DirectoryError>;
}

impl<S> TenantDirectory for Arc<S>
where
    S: TenantDirectory + ?Sized,
{
    fn fetch_tenant(&self, tenant_id: TenantId) -> Result<Tenant, DirectoryError> {
        (**self).fetch_tenant(tenant_id)
    }

    fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, DirectoryError> {
        (**self).insert_tenant(tenant)
    }

    fn commit_tenant(
        &self,
        next: Tenant,
        expected: ExpectedVersion,
        write_ahead: &mut dyn WriteAhead,
    ) -> Result<Tenant, DirectoryError> {
        (**self).commit_tenant(next, expected, write_ahead)
    }
}

/// In-memory tenant directory for tests/dev.
///
/// Each tenant record sits behind its own lock, so a commit that is waiting
/// on its write-ahead hook only blocks readers of that tenant.
#[derive(Debug, Default)]
pub struct InMemoryTenantDirectory {
    inner: RwLock<HashMap<TenantId, Arc<RwLock<Tenant>>>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, tenant_id: TenantId) -> Result<Arc<RwLock<Tenant>>, DirectoryError> {
        let map = self
            .inner
            .read()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))?;
        map.get(&tenant_id)
            .cloned()
            .ok_or(DirectoryError::TenantNotFound(tenant_id))
    }
}

impl TenantDirectory for InMemoryTenantDirectory {
    fn fetch_tenant(&self, tenant_id: TenantId) -> Result<Tenant, DirectoryError> {
        let entry = self.entry(tenant_id)?;
        let tenant = entry
            .read()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))?;
        Ok(tenant.clone())
    }

    fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, DirectoryError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))?;
        if map.contains_key(&tenant.id()) {
            return Err(DirectoryError::AlreadyExists(tenant.id()));
        }
        let stored = tenant.with_version(1);
        map.insert(stored.id(), Arc::new(RwLock::new(stored.clone())));
        Ok(stored)
    }

    fn commit_tenant(
        &self,
        next: Tenant,
        expected: ExpectedVersion,
        write_ahead: &mut dyn WriteAhead,
    ) -> Result<Tenant, DirectoryError> {
        let entry = self.entry(next.id())?;
        // Hold the record's write lock across the hook: readers of this tenant
        // see either the old record or the new one, and the new one only after
        // the hook.
        let mut current = entry
            .write()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))?;

        expected
            .check(current.version())
            .map_err(|e| DirectoryError::Conflict(format!("tenant {}: {e}", next.id())))?;

        write_ahead
            .write_ahead()
            .map_err(DirectoryError::WriteAheadFailed)?;

        let stored = next.with_version(current.version() + 1);
        *current = stored.clone();
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::no_write_ahead;
    use clinicops_entitlements::{ModuleKey, SubscriptionStatus};

    fn test_tenant() -> Tenant {
        Tenant::new(
            TenantId::new(),
            "Skinova",
            "enterprise",
            SubscriptionStatus::Active,
            [ModuleKey::Patients],
            None,
        )
    }

    #[test]
    fn commit_bumps_the_version() {
        let dir = InMemoryTenantDirectory::new();
        let stored = dir.insert_tenant(test_tenant()).unwrap();
        assert_eq!(stored.version(), 1);

        let next = stored.with_module(ModuleKey::Hr, true).unwrap().unwrap();
        let committed = dir
            .commit_tenant(next, ExpectedVersion::exact(1), &mut no_write_ahead())
            .unwrap();
        assert_eq!(committed.version(), 2);
        assert!(dir.fetch_tenant(stored.id()).unwrap().is_enabled(ModuleKey::Hr));
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let dir = InMemoryTenantDirectory::new();
        let stored = dir.insert_tenant(test_tenant()).unwrap();
        let next = stored.with_module(ModuleKey::Hr, true).unwrap().unwrap();

        let err = dir
            .commit_tenant(next, ExpectedVersion::exact(0), &mut no_write_ahead())
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Conflict(_)));
    }

    #[test]
    fn failed_write_ahead_leaves_the_record_untouched() {
        let dir = InMemoryTenantDirectory::new();
        let stored = dir.insert_tenant(test_tenant()).unwrap();
        let next = stored.with_module(ModuleKey::Hr, true).unwrap().unwrap();

        let mut failing = || -> Result<(), String> { Err("audit store down".to_string()) };
        let err = dir
            .commit_tenant(next, ExpectedVersion::exact(1), &mut failing)
            .unwrap_err();
        assert_eq!(err, DirectoryError::WriteAheadFailed("audit store down".to_string()));

        let after = dir.fetch_tenant(stored.id()).unwrap();
        assert_eq!(after, stored);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let dir = InMemoryTenantDirectory::new();
        let t = test_tenant();
        dir.insert_tenant(t.clone()).unwrap();
        assert_eq!(dir.insert_tenant(t.clone()).unwrap_err(), DirectoryError::AlreadyExists(t.id()));
    }

    #[test]
    fn other_tenants_stay_readable_while_a_commit_waits_on_its_hook() {
        let dir = InMemoryTenantDirectory::new();
        let stored = dir.insert_tenant(test_tenant()).unwrap();
        let other = dir.insert_tenant(test_tenant()).unwrap();
        let next = stored.with_module(ModuleKey::Hr, true).unwrap().unwrap();

        let mut seen = None;
        let mut hook = || -> Result<(), String> {
            seen = Some(dir.fetch_tenant(other.id()).map_err(|e| e.to_string())?);
            Ok(())
        };
        dir.commit_tenant(next, ExpectedVersion::exact(1), &mut hook)
            .unwrap();
        assert_eq!(seen, Some(other));
    }
}

