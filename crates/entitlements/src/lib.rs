//! `clinicops-entitlements`: pure entitlement resolution (no IO, no storage).
//!
//! Decides which functional modules an authenticated actor may see and reach,
//! from a tenant's module toggles, the tenant's role permission sets, and the
//! platform override capability.

pub mod actor;
pub mod decision;
pub mod module;
pub mod resolver;
pub mod role;
pub mod snapshot;
pub mod tenant;

pub use actor::{Actor, ActorRole};
pub use decision::{DecisionReason, EntitlementDecision};
pub use module::{ModuleKey, UnknownModule};
pub use resolver::{explain, resolve, resolve_all, DecisionExplanation, LayerCheck};
pub use role::{Role, RolePermissionRecord, RolePermissionSet, UnknownRole};
pub use snapshot::EntitlementSnapshot;
pub use tenant::{SubscriptionStatus, Tenant, TenantRecord};

/// Tracing target for configuration-integrity warnings.
pub const INTEGRITY_TARGET: &str = "clinicops::integrity";

/// Tracing target for ordinary access decisions.
pub const ACCESS_TARGET: &str = "clinicops::access";
