//! Append-only audit trail of administrative entitlement changes.
//!
//! Entries are written ahead of the change they describe: a directory commit
//! only becomes visible after its entry has been appended.

pub mod in_memory;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryChangeLog;
pub use query::{AuditFilter, AuditPage, Pagination};
pub use r#trait::{AuditEntry, ChangeLogError, ChangeSubject, ChangeType, EntitlementChangeLog, NewAuditEntry};
