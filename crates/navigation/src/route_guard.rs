//! Route guard: decides whether a navigation renders or redirects.
//!
//! Every navigation is evaluated on its own. While the tenant's snapshot is
//! being fetched the attempt is pending and nothing renders; a fetch that
//! fails or exceeds the configured bound settles as denied with
//! `CONTEXT_UNAVAILABLE`. The guard never fails open.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use clinicops_core::TenantId;
use clinicops_entitlements::{resolve, Actor, DecisionReason, EntitlementDecision, EntitlementSnapshot, ACCESS_TARGET};
use clinicops_infra::{EntitlementsConfig, RoleCatalog, SnapshotRegistry, TenantDirectory};

use crate::routes::{RouteAccess, RouteTable, SIGN_IN_PATH, UNAUTHORIZED_PATH};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("tenant context unavailable: {0}")]
    Unavailable(String),

    #[error("tenant context fetch timed out after {0:?}")]
    TimedOut(Duration),
}

/// Supplies the entitlement snapshot for a tenant.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn fetch_snapshot(&self, tenant_id: TenantId) -> Result<Arc<EntitlementSnapshot>, ContextError>;
}

#[async_trait]
impl<S> ContextSource for Arc<S>
where
    S: ContextSource + ?Sized,
{
    async fn fetch_snapshot(&self, tenant_id: TenantId) -> Result<Arc<EntitlementSnapshot>, ContextError> {
        (**self).fetch_snapshot(tenant_id).await
    }
}

/// [`ContextSource`] over a shared [`SnapshotRegistry`].
///
/// Storage reads are blocking, so loads run on tokio's blocking pool and the
/// guard's timeout can still fire while one is stuck.
pub struct RegistrySource<D, C> {
    registry: Arc<SnapshotRegistry<D, C>>,
}

impl<D, C> RegistrySource<D, C> {
    pub fn new(registry: Arc<SnapshotRegistry<D, C>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SnapshotRegistry<D, C>> {
        &self.registry
    }
}

impl<D, C> Clone for RegistrySource<D, C> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

#[async_trait]
impl<D, C> ContextSource for RegistrySource<D, C>
where
    D: TenantDirectory + 'static,
    C: RoleCatalog + 'static,
{
    async fn fetch_snapshot(&self, tenant_id: TenantId) -> Result<Arc<EntitlementSnapshot>, ContextError> {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || registry.get_or_load(tenant_id))
            .await
            .map_err(|e| ContextError::Unavailable(format!("snapshot load aborted: {e}")))?
            .map_err(|e| ContextError::Unavailable(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardState {
    PendingResolution,
    Allowed,
    Denied { reason: DecisionReason },
}

impl GuardState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GuardState::PendingResolution)
    }
}

/// What the shell should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuardOutcome {
    /// Show the page. `module_key` is absent for public routes.
    Render { path: String, module_key: Option<String> },
    /// Go elsewhere. `reason` is safe to display.
    Redirect { to: String, reason: Option<DecisionReason> },
    NotFound { path: String },
}

/// One navigation to a protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationAttempt {
    path: String,
    module_key: String,
    state: GuardState,
}

impl NavigationAttempt {
    fn pending(path: impl Into<String>, module_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            module_key: module_key.into(),
            state: GuardState::PendingResolution,
        }
    }

    /// Move to a terminal state. Terminal states never change again.
    fn settle(&mut self, decision: &EntitlementDecision) {
        if self.state.is_terminal() {
            return;
        }
        self.state = if decision.allowed {
            GuardState::Allowed
        } else {
            GuardState::Denied {
                reason: decision.reason,
            }
        };
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn module_key(&self) -> &str {
        &self.module_key
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    /// `None` while pending: nothing may render yet.
    pub fn outcome(&self) -> Option<GuardOutcome> {
        match &self.state {
            GuardState::PendingResolution => None,
            GuardState::Allowed => Some(GuardOutcome::Render {
                path: self.path.clone(),
                module_key: Some(self.module_key.clone()),
            }),
            GuardState::Denied { reason } => Some(GuardOutcome::Redirect {
                to: UNAUTHORIZED_PATH.to_string(),
                reason: Some(*reason),
            }),
        }
    }
}

pub struct RouteGuard<S> {
    source: S,
    routes: RouteTable,
    fetch_timeout: Duration,
}

impl<S> RouteGuard<S>
where
    S: ContextSource,
{
    pub fn new(source: S, routes: RouteTable, fetch_timeout: Duration) -> Self {
        Self {
            source,
            routes,
            fetch_timeout,
        }
    }

    pub fn from_config(source: S, routes: RouteTable, config: &EntitlementsConfig) -> Self {
        Self::new(source, routes, config.context_fetch_timeout)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Evaluate a navigation to `path`. `actor` is `None` when signed out.
    pub async fn navigate(&self, actor: Option<&Actor>, path: &str) -> GuardOutcome {
        let Some(route) = self.routes.lookup(path) else {
            return GuardOutcome::NotFound {
                path: path.to_string(),
            };
        };

        let module_key = match &route.access {
            RouteAccess::Public => {
                return GuardOutcome::Render {
                    path: path.to_string(),
                    module_key: None,
                };
            }
            RouteAccess::Protected { module_key } => module_key.clone(),
        };

        let Some(actor) = actor else {
            return GuardOutcome::Redirect {
                to: SIGN_IN_PATH.to_string(),
                reason: None,
            };
        };

        let attempt = self.attempt(actor, path, &module_key).await;
        match attempt.outcome() {
            Some(outcome) => outcome,
            // settle() always runs before attempt() returns.
            None => GuardOutcome::Redirect {
                to: UNAUTHORIZED_PATH.to_string(),
                reason: Some(DecisionReason::ContextUnavailable),
            },
        }
    }

    /// Run one attempt to completion.
    pub async fn attempt(&self, actor: &Actor, path: &str, module_key: &str) -> NavigationAttempt {
        let mut attempt = NavigationAttempt::pending(path, module_key);

        let snapshot = self.context_for(actor).await;
        let decision = resolve(actor, module_key, snapshot.as_deref());
        attempt.settle(&decision);

        tracing::debug!(
            target: ACCESS_TARGET,
            actor_id = %actor.id,
            path,
            module = module_key,
            reason = decision.reason.code(),
            snapshot_loaded_at = ?snapshot.as_ref().map(|s| s.loaded_at()),
            "navigation settled"
        );
        attempt
    }

    async fn context_for(&self, actor: &Actor) -> Option<Arc<EntitlementSnapshot>> {
        // The resolver grants override actors before looking at context.
        if actor.is_override() {
            return None;
        }
        let tenant_id = actor.tenant_id?;

        let fetched = tokio::time::timeout(self.fetch_timeout, self.source.fetch_snapshot(tenant_id))
            .await
            .unwrap_or(Err(ContextError::TimedOut(self.fetch_timeout)));

        match fetched {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(%tenant_id, actor_id = %actor.id, error = %e, "entitlement context fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clinicops_core::{ActorId, ExpectedVersion};
    use clinicops_entitlements::{ModuleKey, Role, RolePermissionSet, SubscriptionStatus, Tenant};
    use clinicops_infra::{
        provision_tenant, DirectoryError, InMemoryRoleCatalog, InMemoryTenantDirectory, NewTenant,
        WriteAhead,
    };
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn snapshot(tenant_id: TenantId) -> Arc<EntitlementSnapshot> {
        let tenant = Tenant::new(
            tenant_id,
            "T1",
            "basic",
            SubscriptionStatus::Active,
            [ModuleKey::Patients, ModuleKey::Billing],
            None,
        );
        Arc::new(EntitlementSnapshot::new(tenant, RolePermissionSet::seeded(tenant_id), Utc::now()).unwrap())
    }

    /// Answers after `delay`, or fails if `snapshot` is `None`.
    struct ScriptedSource {
        delay: Duration,
        snapshot: Option<Arc<EntitlementSnapshot>>,
    }

    #[async_trait]
    impl ContextSource for ScriptedSource {
        async fn fetch_snapshot(&self, _tenant_id: TenantId) -> Result<Arc<EntitlementSnapshot>, ContextError> {
            tokio::time::sleep(self.delay).await;
            self.snapshot
                .clone()
                .ok_or_else(|| ContextError::Unavailable("directory offline".to_string()))
        }
    }

    fn guard(delay: Duration, snapshot: Option<Arc<EntitlementSnapshot>>) -> RouteGuard<ScriptedSource> {
        RouteGuard::new(
            ScriptedSource { delay, snapshot },
            RouteTable::clinic_default(),
            Duration::from_millis(50),
        )
    }

    fn redirect(reason: DecisionReason) -> GuardOutcome {
        GuardOutcome::Redirect {
            to: UNAUTHORIZED_PATH.to_string(),
            reason: Some(reason),
        }
    }

    #[tokio::test]
    async fn permitted_route_renders() {
        let t1 = test_tenant_id();
        let g = guard(Duration::ZERO, Some(snapshot(t1)));
        let receptionist = Actor::tenant_member(ActorId::new(), Role::Receptionist, t1);

        assert_eq!(
            g.navigate(Some(&receptionist), "/billing/invoices").await,
            GuardOutcome::Render {
                path: "/billing/invoices".to_string(),
                module_key: Some("billing".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn denied_route_redirects_with_reason() {
        let t1 = test_tenant_id();
        let g = guard(Duration::ZERO, Some(snapshot(t1)));
        let nurse = Actor::tenant_member(ActorId::new(), Role::Nurse, t1);

        assert_eq!(g.navigate(Some(&nurse), "/billing").await, redirect(DecisionReason::RoleNotPermitted));
        assert_eq!(g.navigate(Some(&nurse), "/hr").await, redirect(DecisionReason::ModuleDisabledForTenant));
        assert_eq!(g.navigate(Some(&nurse), "/procedures").await, redirect(DecisionReason::UnknownModule));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_context_times_out_closed() {
        let t1 = test_tenant_id();
        let g = guard(Duration::from_secs(5), Some(snapshot(t1)));
        let doctor = Actor::tenant_member(ActorId::new(), Role::Doctor, t1);

        assert_eq!(g.navigate(Some(&doctor), "/doctor").await, redirect(DecisionReason::ContextUnavailable));
    }

    #[tokio::test]
    async fn failed_context_fetch_denies() {
        let t1 = test_tenant_id();
        let g = guard(Duration::ZERO, None);
        let doctor = Actor::tenant_member(ActorId::new(), Role::Doctor, t1);

        let attempt = g.attempt(&doctor, "/doctor", "doctor").await;
        assert_eq!(
            attempt.state(),
            &GuardState::Denied {
                reason: DecisionReason::ContextUnavailable
            }
        );
        assert!(DecisionReason::ContextUnavailable.is_recoverable());
    }

    #[tokio::test]
    async fn override_actor_needs_no_context() {
        let g = guard(Duration::ZERO, None);
        let operator = Actor::platform_operator(ActorId::new());

        assert_eq!(
            g.navigate(Some(&operator), "/superadmin").await,
            GuardOutcome::Render {
                path: "/superadmin".to_string(),
                module_key: Some("super_admin".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn public_unknown_and_signed_out_paths() {
        let g = guard(Duration::ZERO, None);

        assert_eq!(
            g.navigate(None, "/login").await,
            GuardOutcome::Render {
                path: "/login".to_string(),
                module_key: None
            }
        );
        assert_eq!(
            g.navigate(None, "/reception").await,
            GuardOutcome::Redirect {
                to: "/select-role".to_string(),
                reason: None
            }
        );
        assert_eq!(
            g.navigate(None, "/nope").await,
            GuardOutcome::NotFound {
                path: "/nope".to_string()
            }
        );
    }

    #[tokio::test]
    async fn public_routes_cannot_be_used_to_reach_guarded_pages() {
        let g = guard(Duration::ZERO, None);

        for path in ["/login/../admin", "/unauthorized/../superadmin", "/login/admin", "/select-role/../hr"] {
            assert_eq!(
                g.navigate(None, path).await,
                GuardOutcome::NotFound {
                    path: path.to_string()
                },
                "{path}"
            );
        }
    }

    #[test]
    fn attempts_start_pending_and_settle_once() {
        let mut attempt = NavigationAttempt::pending("/hr", "hr");
        assert_eq!(attempt.state(), &GuardState::PendingResolution);
        assert!(attempt.outcome().is_none());

        attempt.settle(&EntitlementDecision::deny("hr", DecisionReason::RoleNotPermitted));
        attempt.settle(&EntitlementDecision::new("hr", DecisionReason::Ok));
        assert_eq!(
            attempt.state(),
            &GuardState::Denied {
                reason: DecisionReason::RoleNotPermitted
            }
        );
    }

    #[tokio::test]
    async fn registry_backed_guard_follows_provisioned_tenant() {
        clinicops_observability::init();

        let registry = Arc::new(SnapshotRegistry::new(
            InMemoryTenantDirectory::new(),
            InMemoryRoleCatalog::new(),
        ));
        let t1 = provision_tenant(&*registry, NewTenant::new("T1", "basic").with_modules([ModuleKey::Reception]))
            .unwrap()
            .tenant_id();

        let g = RouteGuard::from_config(
            RegistrySource::new(registry),
            RouteTable::clinic_default(),
            &EntitlementsConfig::default(),
        );
        let receptionist = Actor::tenant_member(ActorId::new(), Role::Receptionist, t1);
        let stranger = Actor::tenant_member(ActorId::new(), Role::Receptionist, test_tenant_id());

        assert!(matches!(
            g.navigate(Some(&receptionist), "/reception").await,
            GuardOutcome::Render { .. }
        ));
        assert_eq!(
            g.navigate(Some(&stranger), "/reception").await,
            redirect(DecisionReason::ContextUnavailable)
        );
    }

    /// Tenant directory whose reads block the calling thread for `delay_ms`.
    #[derive(Default)]
    struct SlowDirectory {
        inner: InMemoryTenantDirectory,
        delay_ms: AtomicU64,
    }

    impl TenantDirectory for SlowDirectory {
        fn fetch_tenant(&self, tenant_id: TenantId) -> Result<Tenant, DirectoryError> {
            std::thread::sleep(Duration::from_millis(self.delay_ms.load(Ordering::SeqCst)));
            self.inner.fetch_tenant(tenant_id)
        }

        fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, DirectoryError> {
            self.inner.insert_tenant(tenant)
        }

        fn commit_tenant(
            &self,
            next: Tenant,
            expected: ExpectedVersion,
            write_ahead: &mut dyn WriteAhead,
        ) -> Result<Tenant, DirectoryError> {
            self.inner.commit_tenant(next, expected, write_ahead)
        }
    }

    #[tokio::test]
    async fn blocking_registry_load_is_cut_off_by_the_timeout() {
        let registry = Arc::new(SnapshotRegistry::new(SlowDirectory::default(), InMemoryRoleCatalog::new()));
        let t1 = provision_tenant(&*registry, NewTenant::new("T1", "basic").with_modules([ModuleKey::Reception]))
            .unwrap()
            .tenant_id();
        // Force the next navigation to go to storage, which is now slow.
        registry.evict(t1);
        registry.directory().delay_ms.store(400, Ordering::SeqCst);

        let g = RouteGuard::new(
            RegistrySource::new(registry),
            RouteTable::clinic_default(),
            Duration::from_millis(50),
        );
        let receptionist = Actor::tenant_member(ActorId::new(), Role::Receptionist, t1);

        let started = Instant::now();
        let outcome = g.navigate(Some(&receptionist), "/reception").await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, redirect(DecisionReason::ContextUnavailable));
        assert!(elapsed < Duration::from_millis(300), "navigation waited {elapsed:?}");
    }
}

