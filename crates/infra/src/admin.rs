//! Administrative entitlement mutations.
//!
//! Every mutation runs the same pipeline:
//!
//! ```text
//! authorize actor
//!   ↓
//! take the tenant's writer lock
//!   ↓
//! read current record, compute the next one (no-op → return unchanged)
//!   ↓
//! commit with the read version; the write-ahead hook appends the audit
//! entry (bounded retry) before the new record becomes visible
//!   ↓
//! rebuild and swap the tenant's snapshot
//! ```
//!
//! Mutations on one tenant are serialized, so each audit entry's `before`
//! is the `after` of the previous committed change to the same key. Reads
//! never take the writer lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use clinicops_core::{DomainError, ExpectedVersion, TenantId};
use clinicops_entitlements::{
    resolve, Actor, DecisionReason, ModuleKey, Role, SubscriptionStatus, Tenant,
};

use crate::change_log::{AuditEntry, ChangeLogError, ChangeSubject, EntitlementChangeLog, NewAuditEntry};
use crate::config::RetryPolicy;
use crate::directory::{DirectoryError, RoleCatalog, TenantDirectory, WriteAhead};
use crate::snapshot_cache::{SnapshotError, SnapshotRegistry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("actor may not perform this mutation: {0}")]
    Forbidden(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The record changed underneath the mutation; re-read and retry.
    #[error("concurrent mutation conflict: {0}")]
    Conflict(String),

    /// The audit append failed after all automatic attempts. Nothing was
    /// committed; the caller has to retry manually.
    #[error("audit write failed after {attempts} attempt(s): {message}")]
    AuditWriteFailed { attempts: u32, message: String },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<DomainError> for AdminError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => AdminError::Validation(msg),
            DomainError::InvariantViolation(msg) => AdminError::Storage(msg),
            DomainError::Conflict(msg) => AdminError::Conflict(msg),
        }
    }
}

impl From<DirectoryError> for AdminError {
    fn from(value: DirectoryError) -> Self {
        match value {
            DirectoryError::TenantNotFound(_) | DirectoryError::RolePermissionsNotFound(_) => {
                AdminError::NotFound(value.to_string())
            }
            DirectoryError::Conflict(msg) => AdminError::Conflict(msg),
            DirectoryError::Domain(e) => e.into(),
            DirectoryError::AlreadyExists(_)
            | DirectoryError::WriteAheadFailed(_)
            | DirectoryError::Storage(_) => AdminError::Storage(value.to_string()),
        }
    }
}

impl From<SnapshotError> for AdminError {
    fn from(value: SnapshotError) -> Self {
        match value {
            SnapshotError::Directory(e) => e.into(),
            SnapshotError::Domain(e) => e.into(),
        }
    }
}

/// What the write-ahead hook observed.
#[derive(Debug, Default)]
struct AuditOutcome {
    attempts: u32,
    committed: Option<AuditEntry>,
}

/// Linearizable, audited entitlement mutations for all tenants.
pub struct EntitlementAdmin<D, C, L> {
    registry: Arc<SnapshotRegistry<D, C>>,
    log: L,
    retry: RetryPolicy,
    writers: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
}

impl<D, C, L> EntitlementAdmin<D, C, L>
where
    D: TenantDirectory,
    C: RoleCatalog,
    L: EntitlementChangeLog,
{
    pub fn new(registry: Arc<SnapshotRegistry<D, C>>, log: L, retry: RetryPolicy) -> Self {
        Self {
            registry,
            log,
            retry,
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SnapshotRegistry<D, C>> {
        &self.registry
    }

    pub fn change_log(&self) -> &L {
        &self.log
    }

    /// Enable or disable a module for a tenant. Platform operators only.
    pub fn update_module_toggle(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        module: ModuleKey,
        enabled: bool,
    ) -> Result<Tenant, AdminError> {
        require_override(actor, "module toggles")?;

        let lock = self.writer_lock(tenant_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.registry.directory().fetch_tenant(tenant_id)?;
        let Some(next) = current.with_module(module, enabled)? else {
            tracing::debug!(%tenant_id, module = %module, enabled, "module toggle unchanged");
            return Ok(current);
        };

        let entry = self.entry(
            actor,
            tenant_id,
            ChangeSubject::Module { module },
            json!(current.is_enabled(module)),
            json!(enabled),
        );
        let expected = ExpectedVersion::exact(current.version());
        let (stored, audit) = self.commit_audited(entry, |hook| {
            self.registry.directory().commit_tenant(next, expected, hook)
        })?;

        self.swap_snapshot(tenant_id);
        tracing::info!(
            %tenant_id,
            actor_id = %actor.id,
            module = %module,
            enabled,
            audit_sequence = audit.sequence,
            "module toggle committed"
        );
        Ok(stored)
    }

    /// Grant or revoke a module for one role of a tenant.
    ///
    /// Returns the role's permitted modules after the change.
    pub fn update_role_permission(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        role: Role,
        module: ModuleKey,
        granted: bool,
    ) -> Result<BTreeSet<ModuleKey>, AdminError> {
        self.require_role_editor(actor, tenant_id)?;

        let lock = self.writer_lock(tenant_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.registry.catalog().fetch_role_permissions(tenant_id)?;
        let Some(next) = current.with_grant(role, module, granted)? else {
            tracing::debug!(%tenant_id, role = %role, module = %module, granted, "role permission unchanged");
            return Ok(current.permitted(role).cloned().unwrap_or_default());
        };

        let entry = self.entry(
            actor,
            tenant_id,
            ChangeSubject::RolePermission { role, module },
            json!(current.is_permitted(role, module)),
            json!(granted),
        );
        let expected = ExpectedVersion::exact(current.version());
        let (stored, audit) = self.commit_audited(entry, |hook| {
            self.registry.catalog().commit_role_permissions(next, expected, hook)
        })?;

        self.swap_snapshot(tenant_id);
        tracing::info!(
            %tenant_id,
            actor_id = %actor.id,
            role = %role,
            module = %module,
            granted,
            audit_sequence = audit.sequence,
            "role permission committed"
        );
        Ok(stored.permitted(role).cloned().unwrap_or_default())
    }

    /// Change a tenant's subscription status. Platform operators only.
    pub fn update_subscription_status(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        status: SubscriptionStatus,
    ) -> Result<Tenant, AdminError> {
        require_override(actor, "subscription status changes")?;

        let lock = self.writer_lock(tenant_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.registry.directory().fetch_tenant(tenant_id)?;
        let Some(next) = current.with_status(status) else {
            return Ok(current);
        };

        let entry = self.entry(
            actor,
            tenant_id,
            ChangeSubject::SubscriptionStatus,
            json!(current.status().as_str()),
            json!(status.as_str()),
        );
        let expected = ExpectedVersion::exact(current.version());
        let (stored, audit) = self.commit_audited(entry, |hook| {
            self.registry.directory().commit_tenant(next, expected, hook)
        })?;

        self.swap_snapshot(tenant_id);
        tracing::info!(
            %tenant_id,
            actor_id = %actor.id,
            from = current.status().as_str(),
            to = status.as_str(),
            audit_sequence = audit.sequence,
            "subscription status committed"
        );
        Ok(stored)
    }

    fn require_role_editor(&self, actor: &Actor, tenant_id: TenantId) -> Result<(), AdminError> {
        if actor.is_override() {
            return Ok(());
        }
        if actor.tenant_id != Some(tenant_id) || actor.role.known() != Some(Role::Admin) {
            return Err(AdminError::Forbidden(format!(
                "role '{}' cannot edit role permissions of tenant {tenant_id}",
                actor.role
            )));
        }

        let snapshot = self.registry.get_or_load(tenant_id)?;
        let decision = resolve(actor, ModuleKey::Admin.as_str(), Some(&*snapshot));
        if decision.reason != DecisionReason::Ok {
            return Err(AdminError::Forbidden(format!(
                "admin module not available: {}",
                decision.reason
            )));
        }
        Ok(())
    }

    fn writer_lock(&self, tenant_id: TenantId) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().unwrap_or_else(|e| e.into_inner());
        writers.entry(tenant_id).or_default().clone()
    }

    fn entry(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        subject: ChangeSubject,
        before: JsonValue,
        after: JsonValue,
    ) -> NewAuditEntry {
        NewAuditEntry {
            actor_id: actor.id,
            tenant_id,
            subject,
            before,
            after,
            occurred_at: Utc::now(),
        }
    }

    /// Run `commit` with a write-ahead hook that appends `entry`.
    fn commit_audited<T>(
        &self,
        entry: NewAuditEntry,
        commit: impl FnOnce(&mut dyn WriteAhead) -> Result<T, DirectoryError>,
    ) -> Result<(T, AuditEntry), AdminError> {
        let mut outcome = AuditOutcome::default();
        let result = {
            let mut hook = || self.append_with_retry(&entry, &mut outcome);
            commit(&mut hook)
        };

        match result {
            Ok(stored) => {
                let audit = outcome.committed.ok_or_else(|| {
                    AdminError::Storage("commit succeeded without running its audit append".to_string())
                })?;
                Ok((stored, audit))
            }
            Err(DirectoryError::WriteAheadFailed(message)) => Err(AdminError::AuditWriteFailed {
                attempts: outcome.attempts,
                message,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn append_with_retry(&self, entry: &NewAuditEntry, outcome: &mut AuditOutcome) -> Result<(), String> {
        loop {
            outcome.attempts += 1;
            match self.log.append(entry.clone()) {
                Ok(committed) => {
                    outcome.committed = Some(committed);
                    return Ok(());
                }
                Err(e) if e.is_transient() && outcome.attempts < self.retry.max_attempts => {
                    let delay = self.retry.backoff_for(outcome.attempts);
                    tracing::warn!(
                        tenant_id = %entry.tenant_id,
                        attempt = outcome.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "audit append failed, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    log_audit_failure(entry, outcome.attempts, &e);
                    return Err(e.to_string());
                }
            }
        }
    }

    fn swap_snapshot(&self, tenant_id: TenantId) {
        // The mutation is committed either way. A snapshot from before the
        // commit must not keep serving, so drop it and let the next reader
        // load from storage.
        if let Err(e) = self.registry.refresh(tenant_id) {
            tracing::warn!(%tenant_id, error = %e, "snapshot refresh after mutation failed, evicting");
            self.registry.evict(tenant_id);
        }
    }
}

fn require_override(actor: &Actor, what: &str) -> Result<(), AdminError> {
    if actor.is_override() {
        Ok(())
    } else {
        Err(AdminError::Forbidden(format!(
            "{what} require a platform operator, actor has role '{}'",
            actor.role
        )))
    }
}

fn log_audit_failure(entry: &NewAuditEntry, attempts: u32, error: &ChangeLogError) {
    tracing::error!(
        tenant_id = %entry.tenant_id,
        actor_id = %entry.actor_id,
        subject = ?entry.subject,
        attempts,
        error = %error,
        "audit append failed, mutation abandoned"
    );
}
