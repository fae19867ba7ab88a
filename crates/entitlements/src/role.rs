use core::str::FromStr;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use clinicops_core::{DomainError, DomainResult, TenantId};

use crate::module::ModuleKey;

/// Job-function category used for module permissions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Doctor,
    Receptionist,
    Technician,
    Nurse,
    Pharmacist,
}

/// A role string outside the known enumeration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 7] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::Doctor,
        Role::Receptionist,
        Role::Technician,
        Role::Nurse,
        Role::Pharmacist,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Receptionist => "receptionist",
            Role::Technician => "technician",
            Role::Nurse => "nurse",
            Role::Pharmacist => "pharmacist",
        }
    }

    /// Default module template seeded into every new tenant.
    ///
    /// Baseline modules are always part of the template.
    pub fn default_template(self) -> BTreeSet<ModuleKey> {
        use ModuleKey::*;

        let modules: &[ModuleKey] = match self {
            Role::SuperAdmin => &[
                Patients, Appointments, Inventory, Billing, Crm, Hr, Reports, Admin, Reception,
                Doctor, PhotoManager, Technician, SuperAdmin,
            ],
            Role::Admin => &[
                Patients, Appointments, Inventory, Billing, Crm, Hr, Reports, Admin, Reception,
                Doctor, PhotoManager, Technician,
            ],
            Role::Doctor => &[Patients, Appointments, Reports, Doctor, PhotoManager],
            Role::Nurse => &[Patients, Appointments],
            Role::Receptionist => &[Patients, Appointments, Billing, Reception],
            Role::Pharmacist => &[Patients, Inventory],
            Role::Technician => &[Technician, PhotoManager],
        };

        modules
            .iter()
            .copied()
            .chain(ModuleKey::BASELINE)
            .collect()
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage row shape: one role's permitted modules within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermissionRecord {
    pub tenant_id: TenantId,
    pub role: String,
    pub permitted_modules: Vec<String>,
}

/// Per-tenant role → permitted modules mapping.
///
/// Seeded from [`Role::default_template`] at tenant creation, then edited
/// independently of the tenant's enabled modules. The two sets are only ever
/// intersected at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredRolePermissions", into = "StoredRolePermissions")]
pub struct RolePermissionSet {
    tenant_id: TenantId,
    roles: BTreeMap<Role, BTreeSet<ModuleKey>>,
    version: u64,
}

impl RolePermissionSet {
    /// Seed every role from its default template.
    pub fn seeded(tenant_id: TenantId) -> Self {
        let roles = Role::ALL
            .into_iter()
            .map(|r| (r, r.default_template()))
            .collect();
        Self {
            tenant_id,
            roles,
            version: 0,
        }
    }

    /// Build from explicit sets. Baseline modules are added to every role.
    pub fn from_sets(
        tenant_id: TenantId,
        roles: impl IntoIterator<Item = (Role, BTreeSet<ModuleKey>)>,
    ) -> Self {
        let roles = roles
            .into_iter()
            .map(|(role, mut modules)| {
                modules.extend(ModuleKey::BASELINE);
                (role, modules)
            })
            .collect();
        Self {
            tenant_id,
            roles,
            version: 0,
        }
    }

    /// Rebuild from storage rows.
    ///
    /// Unknown roles and unknown module strings are dropped with an integrity
    /// warning; they can never grant anything. Rows for another tenant are
    /// rejected outright.
    pub fn from_records(tenant_id: TenantId, records: &[RolePermissionRecord]) -> DomainResult<Self> {
        let mut roles: BTreeMap<Role, BTreeSet<ModuleKey>> = BTreeMap::new();

        for record in records {
            if record.tenant_id != tenant_id {
                return Err(DomainError::invariant(format!(
                    "role permission row for tenant {} loaded into tenant {}",
                    record.tenant_id, tenant_id
                )));
            }

            let role = match record.role.parse::<Role>() {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(target: crate::INTEGRITY_TARGET, %tenant_id, error = %e, "dropping role permission row");
                    continue;
                }
            };

            let modules = roles.entry(role).or_default();
            for raw in &record.permitted_modules {
                match raw.parse::<ModuleKey>() {
                    Ok(m) => {
                        modules.insert(m);
                    }
                    Err(e) => {
                        tracing::warn!(target: crate::INTEGRITY_TARGET, %tenant_id, %role, error = %e, "dropping permitted module");
                    }
                }
            }
        }

        Ok(Self::from_sets(tenant_id, roles))
    }

    pub fn to_records(&self) -> Vec<RolePermissionRecord> {
        self.roles
            .iter()
            .map(|(role, modules)| RolePermissionRecord {
                tenant_id: self.tenant_id,
                role: role.as_str().to_string(),
                permitted_modules: modules.iter().map(|m| m.as_str().to_string()).collect(),
            })
            .collect()
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Permitted modules for a role, `None` if the role has no entry.
    pub fn permitted(&self, role: Role) -> Option<&BTreeSet<ModuleKey>> {
        self.roles.get(&role)
    }

    pub fn is_permitted(&self, role: Role, module: ModuleKey) -> bool {
        self.permitted(role).is_some_and(|m| m.contains(&module))
    }

    pub fn roles(&self) -> impl Iterator<Item = (&Role, &BTreeSet<ModuleKey>)> {
        self.roles.iter()
    }

    /// Copy of this set with one grant changed.
    ///
    /// Returns `Ok(None)` when the grant already has the requested value.
    /// Revoking a baseline module is rejected.
    pub fn with_grant(&self, role: Role, module: ModuleKey, granted: bool) -> DomainResult<Option<Self>> {
        if module.is_baseline() && !granted {
            return Err(DomainError::validation(format!(
                "baseline module '{module}' cannot be revoked from role '{role}'"
            )));
        }

        if self.is_permitted(role, module) == granted {
            return Ok(None);
        }

        let mut next = self.clone();
        let modules = next.roles.entry(role).or_insert_with(|| ModuleKey::BASELINE.into_iter().collect());
        if granted {
            modules.insert(module);
        } else {
            modules.remove(&module);
        }
        Ok(Some(next))
    }

    /// Set the stored version (used by catalogs on commit).
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

/// Serialized form of a [`RolePermissionSet`]: its storage rows plus the
/// version. Decoding goes through [`RolePermissionSet::from_records`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRolePermissions {
    tenant_id: TenantId,
    #[serde(default)]
    version: u64,
    roles: Vec<RolePermissionRecord>,
}

impl TryFrom<StoredRolePermissions> for RolePermissionSet {
    type Error = DomainError;

    fn try_from(stored: StoredRolePermissions) -> Result<Self, Self::Error> {
        Ok(RolePermissionSet::from_records(stored.tenant_id, &stored.roles)?.with_version(stored.version))
    }
}

impl From<RolePermissionSet> for StoredRolePermissions {
    fn from(set: RolePermissionSet) -> Self {
        Self {
            tenant_id: set.tenant_id,
            version: set.version,
            roles: set.to_records(),
        }
    }
}
