//! Audit log filters and pagination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicops_core::ActorId;

use super::r#trait::{AuditEntry, ChangeSubject, ChangeType};

/// Pagination parameters for audit queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of entries to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for audit queries. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub change_type: Option<ChangeType>,
    pub subject: Option<ChangeSubject>,
    pub actor_id: Option<ActorId>,
    /// Inclusive lower bound.
    pub occurred_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub occurred_before: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn by_type(change_type: ChangeType) -> Self {
        Self {
            change_type: Some(change_type),
            ..Default::default()
        }
    }

    pub fn by_subject(subject: ChangeSubject) -> Self {
        Self {
            subject: Some(subject),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.change_type.is_none_or(|t| t == entry.change_type)
            && self.subject.as_ref().is_none_or(|s| *s == entry.subject)
            && self.actor_id.is_none_or(|a| a == entry.actor_id)
            && self.occurred_after.is_none_or(|t| entry.timestamp >= t)
            && self.occurred_before.is_none_or(|t| entry.timestamp < t)
    }
}

/// Paginated audit query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    /// Total number of entries matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl AuditPage {
    pub fn slice(all: Vec<AuditEntry>, pagination: Pagination) -> Self {
        let total = all.len() as u64;
        let entries: Vec<AuditEntry> = all
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        let has_more = (pagination.offset as u64) + (entries.len() as u64) < total;

        Self {
            entries,
            total,
            pagination,
            has_more,
        }
    }
}
