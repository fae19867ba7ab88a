use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use clinicops_core::{ActorId, AuditEntryId, TenantId};
use clinicops_entitlements::{ModuleKey, Role};
use std::sync::Arc;

use super::query::{AuditFilter, AuditPage, Pagination};

/// Kind of administrative change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    ModuleToggle,
    RolePermissionChange,
    StatusChange,
}

/// The key a change touches.
///
/// Consecutive entries for the same subject form a chain: each entry's
/// `before` equals the previous entry's `after`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeSubject {
    Module { module: ModuleKey },
    RolePermission { role: Role, module: ModuleKey },
    SubscriptionStatus,
}

impl ChangeSubject {
    pub fn change_type(&self) -> ChangeType {
        match self {
            ChangeSubject::Module { .. } => ChangeType::ModuleToggle,
            ChangeSubject::RolePermission { .. } => ChangeType::RolePermissionChange,
            ChangeSubject::SubscriptionStatus => ChangeType::StatusChange,
        }
    }
}

/// An entry ready to be appended (not yet assigned an id or sequence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub actor_id: ActorId,
    pub tenant_id: TenantId,
    pub subject: ChangeSubject,
    pub before: JsonValue,
    pub after: JsonValue,
    pub occurred_at: DateTime<Utc>,
}

/// A committed audit entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub actor_id: ActorId,
    pub tenant_id: TenantId,
    /// Monotonically increasing position within the tenant's log (1-based).
    pub sequence: u64,
    pub change_type: ChangeType,
    pub subject: ChangeSubject,
    pub before: JsonValue,
    pub after: JsonValue,
    pub timestamp: DateTime<Utc>,
}

/// Change log operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChangeLogError {
    /// The backing store failed; the append may succeed if retried.
    #[error("change log storage failure: {0}")]
    Storage(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// The entry does not describe a change, or does not continue the
    /// subject's chain.
    #[error("invalid audit entry: {0}")]
    InvalidEntry(String),
}

impl ChangeLogError {
    /// Whether an automatic retry can help.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChangeLogError::Storage(_))
    }
}

/// Append-only, tenant-scoped log of entitlement changes.
///
/// There is deliberately no update or delete operation.
///
/// Implementations must:
/// - assign per-tenant sequence numbers starting at 1, without gaps
/// - make each append atomic (an entry is either fully visible or absent)
/// - reject entries whose `before` does not match the subject's last `after`
pub trait EntitlementChangeLog: Send + Sync {
    fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, ChangeLogError>;

    /// All entries for a tenant matching `filter`, in sequence order.
    fn read(&self, tenant_id: TenantId, filter: &AuditFilter) -> Result<Vec<AuditEntry>, ChangeLogError>;

    /// Paginated variant of [`EntitlementChangeLog::read`].
    fn read_page(
        &self,
        tenant_id: TenantId,
        filter: &AuditFilter,
        pagination: Pagination,
    ) -> Result<AuditPage, ChangeLogError> {
        let all = self.read(tenant_id, filter)?;
        Ok(AuditPage::slice(all, pagination))
    }
}

impl<L> EntitlementChangeLog for Arc<L>
where
    L: EntitlementChangeLog + ?Sized,
{
    fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, ChangeLogError> {
        (**self).append(entry)
    }

    fn read(&self, tenant_id: TenantId, filter: &AuditFilter) -> Result<Vec<AuditEntry>, ChangeLogError> {
        (**self).read(tenant_id, filter)
    }
}
