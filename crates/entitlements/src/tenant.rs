use core::str::FromStr;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicops_core::{DomainError, DomainResult, TenantId};

use crate::module::ModuleKey;

/// Subscription state of a tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trial,
    Inactive,
    Suspended,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Inactive => "inactive",
            SubscriptionStatus::Suspended => "suspended",
        }
    }

    /// Whether tenant-scoped actors may use modules at all.
    pub fn is_operational(self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trial)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "trial" => Ok(Self::Trial),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            other => Err(DomainError::validation(format!(
                "unknown subscription status '{other}'"
            ))),
        }
    }
}

impl core::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage row shape for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantRecord {
    pub id: TenantId,
    pub name: String,
    pub plan: String,
    pub status: String,
    pub enabled_modules: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Serialized form of a [`Tenant`]: the storage row plus its version.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTenant {
    #[serde(flatten)]
    record: TenantRecord,
    #[serde(default)]
    version: u64,
}

/// An isolated customer account: subscription state plus module toggles.
///
/// (De)serializes through [`TenantRecord`], so a decoded tenant gets the
/// same baseline and unknown-module handling as one loaded from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredTenant", into = "StoredTenant")]
pub struct Tenant {
    id: TenantId,
    name: String,
    plan: String,
    status: SubscriptionStatus,
    enabled_modules: BTreeSet<ModuleKey>,
    expires_at: Option<DateTime<Utc>>,
    version: u64,
}

impl Tenant {
    /// Build a tenant. Baseline modules are always enabled.
    pub fn new(
        id: TenantId,
        name: impl Into<String>,
        plan: impl Into<String>,
        status: SubscriptionStatus,
        enabled_modules: impl IntoIterator<Item = ModuleKey>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut enabled_modules: BTreeSet<ModuleKey> = enabled_modules.into_iter().collect();
        enabled_modules.extend(ModuleKey::BASELINE);

        Self {
            id,
            name: name.into(),
            plan: plan.into(),
            status,
            enabled_modules,
            expires_at,
            version: 0,
        }
    }

    /// Rebuild from a storage row.
    ///
    /// An unknown status is an error (it cannot be safely defaulted); unknown
    /// module strings are dropped with an integrity warning.
    pub fn from_record(record: &TenantRecord) -> DomainResult<Self> {
        let status = record.status.parse::<SubscriptionStatus>()?;

        let modules = record.enabled_modules.iter().filter_map(|raw| {
            raw.parse::<ModuleKey>()
                .map_err(|e| {
                    tracing::warn!(target: crate::INTEGRITY_TARGET, tenant_id = %record.id, error = %e, "dropping enabled module");
                })
                .ok()
        });

        Ok(Self::new(
            record.id,
            record.name.clone(),
            record.plan.clone(),
            status,
            modules,
            record.expires_at,
        ))
    }

    pub fn to_record(&self) -> TenantRecord {
        TenantRecord {
            id: self.id,
            name: self.name.clone(),
            plan: self.plan.clone(),
            status: self.status.as_str().to_string(),
            enabled_modules: self.enabled_modules.iter().map(|m| m.as_str().to_string()).collect(),
            expires_at: self.expires_at,
        }
    }

    pub fn id(&self) -> TenantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plan(&self) -> &str {
        &self.plan
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status
    }

    pub fn enabled_modules(&self) -> &BTreeSet<ModuleKey> {
        &self.enabled_modules
    }

    pub fn is_enabled(&self, module: ModuleKey) -> bool {
        self.enabled_modules.contains(&module)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Copy with one module toggled.
    ///
    /// Returns `Ok(None)` when the module already has the requested state.
    /// Disabling a baseline module is rejected.
    pub fn with_module(&self, module: ModuleKey, enabled: bool) -> DomainResult<Option<Self>> {
        if module.is_baseline() && !enabled {
            return Err(DomainError::validation(format!(
                "baseline module '{module}' cannot be disabled"
            )));
        }

        if self.is_enabled(module) == enabled {
            return Ok(None);
        }

        let mut next = self.clone();
        if enabled {
            next.enabled_modules.insert(module);
        } else {
            next.enabled_modules.remove(&module);
        }
        Ok(Some(next))
    }

    /// Copy with a new subscription status, `None` if unchanged.
    pub fn with_status(&self, status: SubscriptionStatus) -> Option<Self> {
        if self.status == status {
            return None;
        }
        let mut next = self.clone();
        next.status = status;
        Some(next)
    }

    /// Set the stored version (used by directories on commit).
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

impl TryFrom<StoredTenant> for Tenant {
    type Error = DomainError;

    fn try_from(stored: StoredTenant) -> Result<Self, Self::Error> {
        Ok(Tenant::from_record(&stored.record)?.with_version(stored.version))
    }
}

impl From<Tenant> for StoredTenant {
    fn from(tenant: Tenant) -> Self {
        Self {
            record: tenant.to_record(),
            version: tenant.version,
        }
    }
}
