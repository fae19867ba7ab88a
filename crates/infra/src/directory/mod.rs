//! Storage boundaries for tenant records and role permission sets.
//!
//! Writes go through `commit_*` with an expected version and a write-ahead
//! hook. The hook runs after the version check and before the new record is
//! visible; if it fails, nothing is stored.

pub mod role_catalog;
pub mod tenant_directory;

pub use role_catalog::{InMemoryRoleCatalog, RoleCatalog};
pub use tenant_directory::{InMemoryTenantDirectory, TenantDirectory};

use thiserror::Error;

use clinicops_core::{DomainError, TenantId};

/// Directory/catalog operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("tenant {0} not found")]
    TenantNotFound(TenantId),

    #[error("role permissions for tenant {0} not found")]
    RolePermissionsNotFound(TenantId),

    #[error("tenant {0} already exists")]
    AlreadyExists(TenantId),

    /// The record moved since it was read; the caller must re-read and retry.
    #[error("concurrent mutation conflict: {0}")]
    Conflict(String),

    /// The write-ahead hook failed; the commit was abandoned.
    #[error("write-ahead step failed: {0}")]
    WriteAheadFailed(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Step that must succeed before a commit becomes visible.
pub trait WriteAhead {
    fn write_ahead(&mut self) -> Result<(), String>;
}

impl<F> WriteAhead for F
where
    F: FnMut() -> Result<(), String>,
{
    fn write_ahead(&mut self) -> Result<(), String> {
        self()
    }
}

/// Write-ahead hook that does nothing (fixtures, provisioning).
pub fn no_write_ahead() -> impl WriteAhead {
    || Ok(())
}
