//! Infrastructure layer: entitlement storage boundaries, audit log, snapshot
//! cache, administrative mutations, config.

pub mod admin;
pub mod change_log;
pub mod config;
pub mod directory;
pub mod provisioning;
pub mod snapshot_cache;


pub use admin::{AdminError, EntitlementAdmin};
pub use change_log::{AuditEntry, ChangeLogError, EntitlementChangeLog, InMemoryChangeLog};
pub use config::{ConfigError, EntitlementsConfig, RetryPolicy};
pub use directory::{
    DirectoryError, InMemoryRoleCatalog, InMemoryTenantDirectory, RoleCatalog, TenantDirectory,
    WriteAhead,
};
pub use provisioning::{provision_tenant, NewTenant};
pub use snapshot_cache::{RefreshTicket, SnapshotCache, SnapshotError, SnapshotRegistry};
