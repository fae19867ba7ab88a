use std::collections::HashMap;
use std::sync::RwLock;

use clinicops_core::{AuditEntryId, TenantId};

use super::query::AuditFilter;
use super::r#trait::{AuditEntry, ChangeLogError, EntitlementChangeLog, NewAuditEntry};

/// In-memory append-only change log.
///
/// Intended for tests/dev. One vector per tenant; appends take the write lock
/// for their whole duration, so per-tenant ordering is total.
#[derive(Debug, Default)]
pub struct InMemoryChangeLog {
    tenants: RwLock<HashMap<TenantId, Vec<AuditEntry>>>,
}

impl InMemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntitlementChangeLog for InMemoryChangeLog {
    fn append(&self, entry: NewAuditEntry) -> Result<AuditEntry, ChangeLogError> {
        if entry.before == entry.after {
            return Err(ChangeLogError::InvalidEntry(format!(
                "before and after are both {}",
                entry.before
            )));
        }

        let mut tenants = self
            .tenants
            .write()
            .map_err(|_| ChangeLogError::Storage("lock poisoned".to_string()))?;

        let log = tenants.entry(entry.tenant_id).or_default();

        if let Some(previous) = log.iter().rev().find(|e| e.subject == entry.subject) {
            if previous.after != entry.before {
                return Err(ChangeLogError::InvalidEntry(format!(
                    "entry for {:?} starts from {} but the last committed value is {}",
                    entry.subject, entry.before, previous.after
                )));
            }
        }

        let committed = AuditEntry {
            id: AuditEntryId::new(),
            actor_id: entry.actor_id,
            tenant_id: entry.tenant_id,
            sequence: log.len() as u64 + 1,
            change_type: entry.subject.change_type(),
            subject: entry.subject,
            before: entry.before,
            after: entry.after,
            timestamp: entry.occurred_at,
        };
        log.push(committed.clone());

        Ok(committed)
    }

    fn read(&self, tenant_id: TenantId, filter: &AuditFilter) -> Result<Vec<AuditEntry>, ChangeLogError> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| ChangeLogError::Storage("lock poisoned".to_string()))?;

        let entries = tenants.get(&tenant_id).map(Vec::as_slice).unwrap_or_default();
        for (idx, e) in entries.iter().enumerate() {
            if e.tenant_id != tenant_id {
                return Err(ChangeLogError::TenantIsolation(format!(
                    "log of tenant {tenant_id} holds a foreign entry at index {idx}"
                )));
            }
        }

        Ok(entries.iter().filter(|e| filter.matches(e)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_log::{ChangeSubject, ChangeType, Pagination};
    use chrono::Utc;
    use clinicops_core::ActorId;
    use clinicops_entitlements::{ModuleKey, Role};
    use serde_json::json;

    fn toggle(tenant_id: TenantId, module: ModuleKey, before: bool, after: bool) -> NewAuditEntry {
        NewAuditEntry {
            actor_id: ActorId::new(),
            tenant_id,
            subject: ChangeSubject::Module { module },
            before: json!(before),
            after: json!(after),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn sequences_are_per_tenant_and_gapless() {
        let log = InMemoryChangeLog::new();
        let t1 = TenantId::new();
        let t2 = TenantId::new();

        let a = log.append(toggle(t1, ModuleKey::Patients, true, false)).unwrap();
        let b = log.append(toggle(t2, ModuleKey::Patients, true, false)).unwrap();
        let c = log.append(toggle(t1, ModuleKey::Billing, false, true)).unwrap();

        assert_eq!((a.sequence, b.sequence, c.sequence), (1, 1, 2));
        assert_eq!(a.change_type, ChangeType::ModuleToggle);
        assert_eq!(log.read(t1, &AuditFilter::default()).unwrap().len(), 2);
        assert_eq!(log.read(t2, &AuditFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn chain_breaks_are_rejected() {
        let log = InMemoryChangeLog::new();
        let t1 = TenantId::new();
        log.append(toggle(t1, ModuleKey::Hr, true, false)).unwrap();

        // Claims the module was still enabled.
        let err = log.append(toggle(t1, ModuleKey::Hr, true, false)).unwrap_err();
        assert!(matches!(err, ChangeLogError::InvalidEntry(_)));
        assert!(!err.is_transient());

        // A different subject has its own chain.
        log.append(toggle(t1, ModuleKey::Crm, true, false)).unwrap();
    }

    #[test]
    fn entries_must_change_something() {
        let log = InMemoryChangeLog::new();
        let err = log.append(toggle(TenantId::new(), ModuleKey::Hr, true, true)).unwrap_err();
        assert!(matches!(err, ChangeLogError::InvalidEntry(_)));
    }

    #[test]
    fn read_filters_by_subject_and_paginates() {
        let log = InMemoryChangeLog::new();
        let t1 = TenantId::new();
        let subject = ChangeSubject::RolePermission {
            role: Role::Nurse,
            module: ModuleKey::Billing,
        };

        for i in 0..5 {
            log.append(NewAuditEntry {
                actor_id: ActorId::new(),
                tenant_id: t1,
                subject: subject.clone(),
                before: json!(i % 2 == 1),
                after: json!(i % 2 == 0),
                occurred_at: Utc::now(),
            })
            .unwrap();
        }
        log.append(toggle(t1, ModuleKey::Crm, true, false)).unwrap();

        let filter = AuditFilter::by_subject(subject);
        assert_eq!(log.read(t1, &filter).unwrap().len(), 5);

        let page = log.read_page(t1, &filter, Pagination::new(Some(2), Some(2))).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0].sequence, 3);
        assert!(page.has_more);
    }

    #[test]
    fn unknown_tenant_reads_empty() {
        let log = InMemoryChangeLog::new();
        assert!(log.read(TenantId::new(), &AuditFilter::default()).unwrap().is_empty());
    }
}
