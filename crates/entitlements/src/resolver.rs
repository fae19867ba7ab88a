//! Entitlement resolution: the single decision point for module access.
//!
//! Route guarding and menu projection both call [`resolve`]; neither keeps
//! its own copy of the rules.
//!
//! Precedence, first match wins:
//!
//! 1. override actor → allow (`OVERRIDE_GRANTED`), whatever the tenant state
//! 2. no snapshot, or a snapshot of another tenant → `CONTEXT_UNAVAILABLE`
//! 3. tenant not active/trial → `TENANT_SUSPENDED` (except `account-status`)
//! 4. key outside the module enumeration → `UNKNOWN_MODULE`
//! 5. module not enabled for the tenant → `MODULE_DISABLED_FOR_TENANT`
//! 6. module not in the role's set (unknown role = empty set) → `ROLE_NOT_PERMITTED`
//! 7. otherwise → `OK`
//!
//! There is no default-allow branch.

use serde::Serialize;

use crate::actor::{Actor, ActorRole};
use crate::decision::{DecisionReason, EntitlementDecision};
use crate::module::ModuleKey;
use crate::snapshot::EntitlementSnapshot;

/// Layer of the precedence chain, as reported by [`explain`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerCheck {
    Override,
    Context,
    TenantStatus,
    ModuleKnown,
    ModuleEnabled,
    RolePermitted,
}

/// A decision plus the layers that produced it, for support tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionExplanation {
    pub decision: EntitlementDecision,
    /// Layers in evaluation order with their pass/fail result. Evaluation
    /// stops at the first layer that settles the decision.
    pub evaluated: Vec<(LayerCheck, bool)>,
    pub message: String,
}

/// Resolve one module for one actor against a snapshot.
///
/// Pure and deterministic: the same inputs always give the same decision.
/// Never panics and never touches storage.
pub fn resolve(
    actor: &Actor,
    module_key: &str,
    snapshot: Option<&EntitlementSnapshot>,
) -> EntitlementDecision {
    let reason = evaluate(actor, module_key, snapshot, &mut |_, _| {});
    EntitlementDecision::new(module_key, reason)
}

/// Resolve every known module (platform console view).
pub fn resolve_all(actor: &Actor, snapshot: Option<&EntitlementSnapshot>) -> Vec<EntitlementDecision> {
    ModuleKey::ALL
        .into_iter()
        .map(|m| resolve(actor, m.as_str(), snapshot))
        .collect()
}

/// Explain why a decision was made.
pub fn explain(
    actor: &Actor,
    module_key: &str,
    snapshot: Option<&EntitlementSnapshot>,
) -> DecisionExplanation {
    let mut evaluated = Vec::with_capacity(6);
    let reason = evaluate(actor, module_key, snapshot, &mut |layer, passed| {
        evaluated.push((layer, passed))
    });

    let message = match reason {
        DecisionReason::OverrideGranted => "platform override bypasses tenant and role scoping".to_string(),
        DecisionReason::ContextUnavailable => "entitlement context for the actor's tenant is not available".to_string(),
        DecisionReason::TenantSuspended => "the tenant's subscription is not active".to_string(),
        DecisionReason::UnknownModule => format!("'{module_key}' is not a known module (configuration defect)"),
        DecisionReason::ModuleDisabledForTenant => format!("module '{module_key}' is not enabled for this tenant"),
        DecisionReason::RoleNotPermitted => {
            format!("role '{}' is not permitted to use module '{module_key}'", actor.role)
        }
        DecisionReason::Ok => format!("module '{module_key}' is enabled and permitted for role '{}'", actor.role),
    };

    DecisionExplanation {
        decision: EntitlementDecision::new(module_key, reason),
        evaluated,
        message,
    }
}

fn evaluate(
    actor: &Actor,
    module_key: &str,
    snapshot: Option<&EntitlementSnapshot>,
    trace: &mut dyn FnMut(LayerCheck, bool),
) -> DecisionReason {
    trace(LayerCheck::Override, actor.platform_override);
    if actor.platform_override {
        return DecisionReason::OverrideGranted;
    }

    let snapshot = match snapshot {
        Some(s) if actor.tenant_id == Some(s.tenant_id()) => s,
        _ => {
            trace(LayerCheck::Context, false);
            return deny(actor, module_key, DecisionReason::ContextUnavailable);
        }
    };
    trace(LayerCheck::Context, true);

    let tenant = snapshot.tenant();
    let parsed = module_key.parse::<ModuleKey>();
    let operational = tenant.status().is_operational();
    let survives = parsed.as_ref().is_ok_and(|m| m.survives_suspension());
    trace(LayerCheck::TenantStatus, operational || survives);
    if !operational && !survives {
        return deny(actor, module_key, DecisionReason::TenantSuspended);
    }

    let module = match parsed {
        Ok(m) => m,
        Err(e) => {
            trace(LayerCheck::ModuleKnown, false);
            tracing::warn!(
                target: crate::INTEGRITY_TARGET,
                tenant_id = %tenant.id(),
                error = %e,
                "module key outside the known enumeration; denying"
            );
            return DecisionReason::UnknownModule;
        }
    };
    trace(LayerCheck::ModuleKnown, true);

    let enabled = tenant.is_enabled(module);
    trace(LayerCheck::ModuleEnabled, enabled);
    if !enabled {
        return deny(actor, module_key, DecisionReason::ModuleDisabledForTenant);
    }

    let permitted = match &actor.role {
        ActorRole::Known(role) => snapshot.role_permissions().is_permitted(*role, module),
        ActorRole::Unrecognized(raw) => {
            tracing::warn!(
                target: crate::INTEGRITY_TARGET,
                tenant_id = %tenant.id(),
                role = %raw,
                "unrecognized role; treating as an empty permission set"
            );
            false
        }
    };
    trace(LayerCheck::RolePermitted, permitted);
    if !permitted {
        return deny(actor, module_key, DecisionReason::RoleNotPermitted);
    }

    DecisionReason::Ok
}

fn deny(actor: &Actor, module_key: &str, reason: DecisionReason) -> DecisionReason {
    tracing::debug!(
        target: crate::ACCESS_TARGET,
        actor_id = %actor.id,
        module = module_key,
        reason = reason.code(),
        "module access denied"
    );
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{Role, RolePermissionSet};
    use crate::tenant::{SubscriptionStatus, Tenant};
    use chrono::Utc;
    use clinicops_core::{ActorId, TenantId};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn snapshot_with(
        tenant_id: TenantId,
        status: SubscriptionStatus,
        enabled: &[ModuleKey],
        roles: &[(Role, &[ModuleKey])],
    ) -> EntitlementSnapshot {
        let tenant = Tenant::new(tenant_id, "T1", "professional", status, enabled.iter().copied(), None);
        let perms = RolePermissionSet::from_sets(
            tenant_id,
            roles
                .iter()
                .map(|(r, ms)| (*r, ms.iter().copied().collect::<BTreeSet<_>>())),
        );
        EntitlementSnapshot::new(tenant, perms, Utc::now()).unwrap()
    }

    /// T1: enabled=[dashboard, patients, billing]; receptionist=[dashboard, patients].
    fn scenario_t1(status: SubscriptionStatus) -> (TenantId, EntitlementSnapshot) {
        let t1 = test_tenant_id();
        let snap = snapshot_with(
            t1,
            status,
            &[ModuleKey::Dashboard, ModuleKey::Patients, ModuleKey::Billing],
            &[
                (Role::Receptionist, &[ModuleKey::Dashboard, ModuleKey::Patients]),
                (Role::Admin, &[ModuleKey::Dashboard, ModuleKey::Patients, ModuleKey::Billing]),
            ],
        );
        (t1, snap)
    }

    #[test]
    fn role_set_gates_enabled_modules() {
        let (t1, snap) = scenario_t1(SubscriptionStatus::Active);
        let receptionist = Actor::tenant_member(ActorId::new(), Role::Receptionist, t1);

        let billing = resolve(&receptionist, "billing", Some(&snap));
        assert!(!billing.allowed);
        assert_eq!(billing.reason, DecisionReason::RoleNotPermitted);

        let patients = resolve(&receptionist, "patients", Some(&snap));
        assert!(patients.allowed);
        assert_eq!(patients.reason, DecisionReason::Ok);
    }

    #[test]
    fn disabled_module_denies_before_role_check() {
        let (t1, snap) = scenario_t1(SubscriptionStatus::Active);
        let admin = Actor::tenant_member(ActorId::new(), Role::Admin, t1);
        let d = resolve(&admin, "hr", Some(&snap));
        assert_eq!(d.reason, DecisionReason::ModuleDisabledForTenant);
    }

    #[test]
    fn suspended_tenant_denies_everything_but_account_status() {
        let (t1, snap) = scenario_t1(SubscriptionStatus::Suspended);
        let admin = Actor::tenant_member(ActorId::new(), Role::Admin, t1);

        assert_eq!(resolve(&admin, "dashboard", Some(&snap)).reason, DecisionReason::TenantSuspended);
        assert_eq!(resolve(&admin, "account-status", Some(&snap)).reason, DecisionReason::Ok);

        let operator = Actor::platform_operator(ActorId::new());
        let d = resolve(&operator, "dashboard", Some(&snap));
        assert!(d.allowed);
        assert_eq!(d.reason, DecisionReason::OverrideGranted);
    }

    #[test]
    fn suspension_outranks_unknown_module() {
        let (t1, snap) = scenario_t1(SubscriptionStatus::Inactive);
        let admin = Actor::tenant_member(ActorId::new(), Role::Admin, t1);
        assert_eq!(resolve(&admin, "procedures", Some(&snap)).reason, DecisionReason::TenantSuspended);
    }

    #[test]
    fn unknown_module_fails_closed() {
        let (t1, snap) = scenario_t1(SubscriptionStatus::Active);
        let admin = Actor::tenant_member(ActorId::new(), Role::Admin, t1);
        let d = resolve(&admin, "procedures", Some(&snap));
        assert!(!d.allowed);
        assert_eq!(d.reason, DecisionReason::UnknownModule);
        assert_eq!(d.module_key, "procedures");
    }

    #[test]
    fn unrecognized_role_has_no_permissions() {
        let (t1, snap) = scenario_t1(SubscriptionStatus::Active);
        let actor = Actor::tenant_member(ActorId::new(), ActorRole::parse("janitor"), t1);
        assert_eq!(resolve(&actor, "dashboard", Some(&snap)).reason, DecisionReason::RoleNotPermitted);
    }

    #[test]
    fn role_without_an_entry_has_no_permissions() {
        let (t1, snap) = scenario_t1(SubscriptionStatus::Active);
        let nurse = Actor::tenant_member(ActorId::new(), Role::Nurse, t1);
        assert_eq!(resolve(&nurse, "patients", Some(&snap)).reason, DecisionReason::RoleNotPermitted);
    }

    #[test]
    fn missing_or_foreign_context_is_unavailable() {
        let (_t1, snap) = scenario_t1(SubscriptionStatus::Active);
        let outsider = Actor::tenant_member(ActorId::new(), Role::Admin, test_tenant_id());

        assert_eq!(resolve(&outsider, "dashboard", None).reason, DecisionReason::ContextUnavailable);
        assert_eq!(
            resolve(&outsider, "dashboard", Some(&snap)).reason,
            DecisionReason::ContextUnavailable
        );
    }

    #[test]
    fn override_needs_no_context() {
        let operator = Actor::platform_operator(ActorId::new());
        assert_eq!(resolve(&operator, "super_admin", None).reason, DecisionReason::OverrideGranted);
    }

    #[test]
    fn explain_reports_the_layers_it_walked() {
        let (t1, snap) = scenario_t1(SubscriptionStatus::Active);
        let receptionist = Actor::tenant_member(ActorId::new(), Role::Receptionist, t1);

        let e = explain(&receptionist, "billing", Some(&snap));
        assert_eq!(e.decision, resolve(&receptionist, "billing", Some(&snap)));
        assert_eq!(
            e.evaluated,
            vec![
                (LayerCheck::Override, false),
                (LayerCheck::Context, true),
                (LayerCheck::TenantStatus, true),
                (LayerCheck::ModuleKnown, true),
                (LayerCheck::ModuleEnabled, true),
                (LayerCheck::RolePermitted, false),
            ]
        );
        assert!(e.message.contains("receptionist"));
    }

    #[test]
    fn resolve_all_covers_every_module_in_order() {
        let (t1, snap) = scenario_t1(SubscriptionStatus::Active);
        let receptionist = Actor::tenant_member(ActorId::new(), Role::Receptionist, t1);
        let all = resolve_all(&receptionist, Some(&snap));
        assert_eq!(all.len(), ModuleKey::ALL.len());
        let allowed: Vec<_> = all.iter().filter(|d| d.allowed).map(|d| d.module_key.as_str()).collect();
        assert_eq!(allowed, vec!["dashboard", "patients", "account-status"]);
    }

    fn arb_module() -> impl Strategy<Value = ModuleKey> {
        prop::sample::select(ModuleKey::ALL.to_vec())
    }

    fn arb_role() -> impl Strategy<Value = Role> {
        prop::sample::select(Role::ALL.to_vec())
    }

    fn arb_status() -> impl Strategy<Value = SubscriptionStatus> {
        prop::sample::select(vec![
            SubscriptionStatus::Active,
            SubscriptionStatus::Trial,
            SubscriptionStatus::Inactive,
            SubscriptionStatus::Suspended,
        ])
    }

    fn arb_snapshot(tenant_id: TenantId) -> impl Strategy<Value = EntitlementSnapshot> {
        (
            arb_status(),
            prop::collection::btree_set(arb_module(), 0..ModuleKey::ALL.len()),
            prop::collection::btree_map(
                arb_role(),
                prop::collection::btree_set(arb_module(), 0..ModuleKey::ALL.len()),
                0..Role::ALL.len(),
            ),
        )
            .prop_map(move |(status, enabled, roles)| {
                let tenant = Tenant::new(tenant_id, "T", "plan", status, enabled, None);
                let perms = RolePermissionSet::from_sets(tenant_id, roles);
                EntitlementSnapshot::new(tenant, perms, Utc::now()).unwrap()
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn resolution_is_deterministic(
            snap in arb_snapshot(TenantId::new()),
            role in arb_role(),
            module in arb_module(),
        ) {
            let actor = Actor::tenant_member(ActorId::new(), role, snap.tenant_id());
            let first = resolve(&actor, module.as_str(), Some(&snap));
            let second = resolve(&actor, module.as_str(), Some(&snap));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn modules_not_enabled_are_always_denied(
            snap in arb_snapshot(TenantId::new()),
            role in arb_role(),
            module in arb_module(),
        ) {
            prop_assume!(!snap.tenant().is_enabled(module));
            let actor = Actor::tenant_member(ActorId::new(), role, snap.tenant_id());
            prop_assert!(!resolve(&actor, module.as_str(), Some(&snap)).allowed);
        }

        #[test]
        fn dashboard_is_open_to_every_role_on_operational_tenants(
            snap in arb_snapshot(TenantId::new()),
            role in arb_role(),
        ) {
            prop_assume!(snap.tenant().status().is_operational());
            // Template-seeded roles always carry the baseline.
            let perms = RolePermissionSet::seeded(snap.tenant_id());
            let snap = EntitlementSnapshot::new(snap.tenant().clone(), perms, Utc::now()).unwrap();
            let actor = Actor::tenant_member(ActorId::new(), role, snap.tenant_id());
            prop_assert_eq!(resolve(&actor, "dashboard", Some(&snap)).reason, DecisionReason::Ok);
        }

        #[test]
        fn suspension_denies_all_but_account_status(
            snap in arb_snapshot(TenantId::new()),
            role in arb_role(),
            module in arb_module(),
        ) {
            prop_assume!(snap.tenant().status() == SubscriptionStatus::Suspended);
            let actor = Actor::tenant_member(ActorId::new(), role, snap.tenant_id());
            let d = resolve(&actor, module.as_str(), Some(&snap));
            if module != ModuleKey::AccountStatus {
                prop_assert_eq!(d.reason, DecisionReason::TenantSuspended);
            }

            let operator = Actor::platform_operator(ActorId::new()).viewing(snap.tenant_id());
            prop_assert!(resolve(&operator, module.as_str(), Some(&snap)).allowed);
        }

        #[test]
        fn allowed_implies_enabled_and_permitted(
            snap in arb_snapshot(TenantId::new()),
            role in arb_role(),
            module in arb_module(),
        ) {
            let actor = Actor::tenant_member(ActorId::new(), role, snap.tenant_id());
            if resolve(&actor, module.as_str(), Some(&snap)).allowed {
                prop_assert!(snap.tenant().is_enabled(module));
                prop_assert!(snap.role_permissions().is_permitted(role, module));
            }
        }
    }
}
