use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use clinicops_core::{ExpectedVersion, TenantId};
use clinicops_entitlements::RolePermissionSet;

use super::{DirectoryError, WriteAhead};

/// Persists and serves per-tenant role permission sets.
pub trait RoleCatalog: Send + Sync {
    fn fetch_role_permissions(&self, tenant_id: TenantId) -> Result<RolePermissionSet, DirectoryError>;

    /// Store a tenant's initial set at version 1.
    fn insert_role_permissions(&self, set: RolePermissionSet) -> Result<RolePermissionSet, DirectoryError>;

    /// Replace a tenant's set, bumping its version. Same failure contract as
    /// [`super::TenantDirectory::commit_tenant`].
    fn commit_role_permissions(
        &self,
        next: RolePermissionSet,
        expected: ExpectedVersion,
        write_ahead: &mut dyn WriteAhead,
    ) -> Result<RolePermissionSet, DirectoryError>;
}

impl<S> RoleCatalog for Arc<S>
where
    S: RoleCatalog + ?Sized,
{
    fn fetch_role_permissions(&self, tenant_id: TenantId) -> Result<RolePermissionSet, DirectoryError> {
        (**self).fetch_role_permissions(tenant_id)
    }

    fn insert_role_permissions(&self, set: RolePermissionSet) -> Result<RolePermissionSet, DirectoryError> {
        (**self).insert_role_permissions(set)
    }

    fn commit_role_permissions(
        &self,
        next: RolePermissionSet,
        expected: ExpectedVersion,
        write_ahead: &mut dyn WriteAhead,
    ) -> Result<RolePermissionSet, DirectoryError> {
        (**self).commit_role_permissions(next, expected, write_ahead)
    }
}

/// In-memory role catalog for tests/dev. Locks per tenant, like
/// [`super::InMemoryTenantDirectory`].
#[derive(Debug, Default)]
pub struct InMemoryRoleCatalog {
    inner: RwLock<HashMap<TenantId, Arc<RwLock<RolePermissionSet>>>>,
}

impl InMemoryRoleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, tenant_id: TenantId) -> Result<Arc<RwLock<RolePermissionSet>>, DirectoryError> {
        let map = self
            .inner
            .read()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))?;
        map.get(&tenant_id)
            .cloned()
            .ok_or(DirectoryError::RolePermissionsNotFound(tenant_id))
    }
}

impl RoleCatalog for InMemoryRoleCatalog {
    fn fetch_role_permissions(&self, tenant_id: TenantId) -> Result<RolePermissionSet, DirectoryError> {
        let entry = self.entry(tenant_id)?;
        let set = entry
            .read()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))?;
        Ok(set.clone())
    }

    fn insert_role_permissions(&self, set: RolePermissionSet) -> Result<RolePermissionSet, DirectoryError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))?;
        if map.contains_key(&set.tenant_id()) {
            return Err(DirectoryError::AlreadyExists(set.tenant_id()));
        }
        let stored = set.with_version(1);
        map.insert(stored.tenant_id(), Arc::new(RwLock::new(stored.clone())));
        Ok(stored)
    }

    fn commit_role_permissions(
        &self,
        next: RolePermissionSet,
        expected: ExpectedVersion,
        write_ahead: &mut dyn WriteAhead,
    ) -> Result<RolePermissionSet, DirectoryError> {
        let tenant_id = next.tenant_id();
        let entry = self.entry(tenant_id)?;
        let mut current = entry
            .write()
            .map_err(|_| DirectoryError::Storage("lock poisoned".to_string()))?;

        expected.check(current.version()).map_err(|e| {
            DirectoryError::Conflict(format!("role permissions of tenant {tenant_id}: {e}"))
        })?;

        write_ahead
            .write_ahead()
            .map_err(DirectoryError::WriteAheadFailed)?;

        let stored = next.with_version(current.version() + 1);
        *current = stored.clone();
        Ok(stored)
    }
}
