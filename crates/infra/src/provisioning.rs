//! Tenant provisioning: create a tenant and seed its role permissions.
//!
//! Creation is not a change to an existing entitlement set, so no audit entry
//! is written.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use clinicops_core::TenantId;
use clinicops_entitlements::{EntitlementSnapshot, ModuleKey, RolePermissionSet, SubscriptionStatus, Tenant};

use crate::directory::{RoleCatalog, TenantDirectory};
use crate::snapshot_cache::{SnapshotError, SnapshotRegistry};

/// Input for [`provision_tenant`].
#[derive(Debug, Clone, Default)]
pub struct NewTenant {
    /// Generated when absent.
    pub id: Option<TenantId>,
    pub name: String,
    pub plan: String,
    /// Defaults to active.
    pub status: Option<SubscriptionStatus>,
    /// Baseline modules are added regardless.
    pub enabled_modules: Vec<ModuleKey>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewTenant {
    pub fn new(name: impl Into<String>, plan: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plan: plan.into(),
            ..Self::default()
        }
    }

    pub fn with_modules(mut self, modules: impl IntoIterator<Item = ModuleKey>) -> Self {
        self.enabled_modules.extend(modules);
        self
    }

    pub fn with_status(mut self, status: SubscriptionStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Store a new tenant with template role permissions and install its first
/// snapshot.
pub fn provision_tenant<D, C>(
    registry: &SnapshotRegistry<D, C>,
    new: NewTenant,
) -> Result<Arc<EntitlementSnapshot>, SnapshotError>
where
    D: TenantDirectory,
    C: RoleCatalog,
{
    let tenant_id = new.id.unwrap_or_default();
    let tenant = Tenant::new(
        tenant_id,
        new.name,
        new.plan,
        new.status.unwrap_or(SubscriptionStatus::Active),
        new.enabled_modules,
        new.expires_at,
    );

    registry.directory().insert_tenant(tenant)?;
    registry
        .catalog()
        .insert_role_permissions(RolePermissionSet::seeded(tenant_id))?;

    tracing::info!(%tenant_id, "tenant provisioned");
    registry.get_or_load(tenant_id)
}
