//! `clinicops-core`: foundation building blocks shared by every clinicops crate.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{ActorId, AuditEntryId, TenantId};
pub use version::ExpectedVersion;
