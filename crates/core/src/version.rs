//! Optimistic concurrency expectations for versioned records.

use crate::error::{DomainError, DomainResult};

/// Version a writer expects a record to be at when it commits.
///
/// Tenant records and role permission sets carry a monotonically increasing
/// version; every committed change bumps it by one. Initial inserts go through
/// dedicated `insert_*` calls, so every commit names the version it read.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExpectedVersion(u64);

impl ExpectedVersion {
    pub const fn exact(version: u64) -> Self {
        Self(version)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub fn matches(self, actual: u64) -> bool {
        self.0 == actual
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {}, actual: {actual})",
                self.0
            )))
        }
    }
}
