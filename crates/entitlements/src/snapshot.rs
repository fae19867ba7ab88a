use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicops_core::{DomainError, DomainResult, TenantId};

use crate::module::ModuleKey;
use crate::role::{Role, RolePermissionSet};
use crate::tenant::Tenant;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSnapshot {
    tenant: Tenant,
    role_permissions: RolePermissionSet,
    loaded_at: DateTime<Utc>,
}

/// Immutable view of one tenant's entitlement data.
///
/// Built whole and swapped whole; callers never see a tenant from one load
/// paired with role permissions from another. The enabled-module set and the
/// role sets are kept apart and only intersected by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredSnapshot", into = "StoredSnapshot")]
pub struct EntitlementSnapshot {
    tenant: Tenant,
    role_permissions: RolePermissionSet,
    loaded_at: DateTime<Utc>,
}

impl EntitlementSnapshot {
    pub fn new(
        tenant: Tenant,
        role_permissions: RolePermissionSet,
        loaded_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if tenant.id() != role_permissions.tenant_id() {
            return Err(DomainError::invariant(format!(
                "role permissions of tenant {} paired with tenant {}",
                role_permissions.tenant_id(),
                tenant.id()
            )));
        }

        Ok(Self {
            tenant,
            role_permissions,
            loaded_at,
        })
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant.id()
    }

    pub fn role_permissions(&self) -> &RolePermissionSet {
        &self.role_permissions
    }

    pub fn permitted_modules(&self, role: Role) -> Option<&BTreeSet<ModuleKey>> {
        self.role_permissions.permitted(role)
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Combined record version; changes whenever either half changes.
    pub fn version(&self) -> (u64, u64) {
        (self.tenant.version(), self.role_permissions.version())
    }
}

impl TryFrom<StoredSnapshot> for EntitlementSnapshot {
    type Error = DomainError;

    fn try_from(stored: StoredSnapshot) -> Result<Self, Self::Error> {
        EntitlementSnapshot::new(stored.tenant, stored.role_permissions, stored.loaded_at)
    }
}

impl From<EntitlementSnapshot> for StoredSnapshot {
    fn from(snapshot: EntitlementSnapshot) -> Self {
        Self {
            tenant: snapshot.tenant,
            role_permissions: snapshot.role_permissions,
            loaded_at: snapshot.loaded_at,
        }
    }
}
