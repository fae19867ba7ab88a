use serde::{Deserialize, Serialize};

/// Why a module was allowed or denied.
///
/// Every reason is safe to show to the actor: none of them carries data from
/// another tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    Ok,
    ModuleDisabledForTenant,
    RoleNotPermitted,
    TenantSuspended,
    UnknownModule,
    ContextUnavailable,
    OverrideGranted,
}

impl DecisionReason {
    pub fn code(self) -> &'static str {
        match self {
            DecisionReason::Ok => "OK",
            DecisionReason::ModuleDisabledForTenant => "MODULE_DISABLED_FOR_TENANT",
            DecisionReason::RoleNotPermitted => "ROLE_NOT_PERMITTED",
            DecisionReason::TenantSuspended => "TENANT_SUSPENDED",
            DecisionReason::UnknownModule => "UNKNOWN_MODULE",
            DecisionReason::ContextUnavailable => "CONTEXT_UNAVAILABLE",
            DecisionReason::OverrideGranted => "OVERRIDE_GRANTED",
        }
    }

    pub fn is_allow(self) -> bool {
        matches!(self, DecisionReason::Ok | DecisionReason::OverrideGranted)
    }

    /// Denials that may clear on the next attempt without any admin action.
    pub fn is_recoverable(self) -> bool {
        self == DecisionReason::ContextUnavailable
    }
}

impl core::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of resolving one module for one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementDecision {
    /// The module key as requested (raw, so unknown keys can be reported).
    pub module_key: String,
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl EntitlementDecision {
    pub fn new(module_key: impl Into<String>, reason: DecisionReason) -> Self {
        Self {
            module_key: module_key.into(),
            allowed: reason.is_allow(),
            reason,
        }
    }

    pub fn deny(module_key: impl Into<String>, reason: DecisionReason) -> Self {
        debug_assert!(!reason.is_allow());
        Self::new(module_key, reason)
    }
}
