use serde::{Deserialize, Serialize};

use clinicops_core::{ActorId, TenantId};

use crate::role::Role;

/// Role carried by a session.
///
/// Session claims arrive as strings; a role outside the enumeration is kept
/// as-is so the resolver can deny it (and flag it) instead of the session
/// layer silently picking a default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActorRole {
    Known(Role),
    Unrecognized(String),
}

impl ActorRole {
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<Role>() {
            Ok(role) => ActorRole::Known(role),
            Err(_) => ActorRole::Unrecognized(raw.to_string()),
        }
    }

    pub fn known(&self) -> Option<Role> {
        match self {
            ActorRole::Known(r) => Some(*r),
            ActorRole::Unrecognized(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActorRole::Known(r) => r.as_str(),
            ActorRole::Unrecognized(s) => s,
        }
    }
}

impl From<Role> for ActorRole {
    fn from(value: Role) -> Self {
        ActorRole::Known(value)
    }
}

impl core::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated actor, created at login and dropped at logout/expiry.
///
/// `platform_override` is only ever true for platform operators. Such actors
/// are not tenant-scoped; `tenant_id` is the tenant they are currently
/// viewing, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: ActorRole,
    pub tenant_id: Option<TenantId>,
    #[serde(rename = "override")]
    pub platform_override: bool,
}

impl Actor {
    /// A clinic staff member scoped to one tenant.
    pub fn tenant_member(id: ActorId, role: impl Into<ActorRole>, tenant_id: TenantId) -> Self {
        Self {
            id,
            role: role.into(),
            tenant_id: Some(tenant_id),
            platform_override: false,
        }
    }

    /// A platform-level operator with the override capability.
    pub fn platform_operator(id: ActorId) -> Self {
        Self {
            id,
            role: ActorRole::Known(Role::SuperAdmin),
            tenant_id: None,
            platform_override: true,
        }
    }

    /// Switch the tenant an override actor is viewing.
    ///
    /// Tenant-scoped actors cannot switch tenants; they are returned unchanged.
    pub fn viewing(mut self, tenant_id: TenantId) -> Self {
        if self.platform_override {
            self.tenant_id = Some(tenant_id);
        }
        self
    }

    pub fn is_override(&self) -> bool {
        self.platform_override
    }
}
