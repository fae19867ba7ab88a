//! Navigation projection: the part of the menu an actor may use.
//!
//! An item is shown iff [`resolve`] allows its module key. The guard asks
//! the same question, so visible items and reachable routes cannot drift.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use clinicops_core::TenantId;
use clinicops_entitlements::{resolve, Actor, ActorRole, EntitlementSnapshot};

use crate::menu::{MenuGroup, MenuItem, MenuTree};

/// Project `tree` for `actor`.
///
/// Keeps declaration order and group structure and drops groups left empty.
/// The source tree is not modified.
pub fn project(tree: &MenuTree, actor: &Actor, snapshot: Option<&EntitlementSnapshot>) -> MenuTree {
    let groups = tree
        .groups
        .iter()
        .filter_map(|group| {
            let items: Vec<MenuItem> = group
                .items
                .iter()
                .filter(|item| resolve(actor, &item.module_key, snapshot).allowed)
                .cloned()
                .collect();
            (!items.is_empty()).then(|| MenuGroup {
                title: group.title.clone(),
                items,
            })
        })
        .collect();
    MenuTree { groups }
}

/// Flat, ordered subsequence of allowed leaves.
pub fn visible_items<'a>(
    tree: &'a MenuTree,
    actor: &Actor,
    snapshot: Option<&EntitlementSnapshot>,
) -> Vec<&'a MenuItem> {
    tree.items()
        .filter(|item| resolve(actor, &item.module_key, snapshot).allowed)
        .collect()
}

/// Everything a projection depends on besides the (fixed) tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectionKey {
    pub snapshot_tenant: Option<TenantId>,
    pub snapshot_version: Option<(u64, u64)>,
    pub actor_tenant: Option<TenantId>,
    pub role: ActorRole,
    pub platform_override: bool,
}

impl ProjectionKey {
    pub fn of(actor: &Actor, snapshot: Option<&EntitlementSnapshot>) -> Self {
        Self {
            snapshot_tenant: snapshot.map(EntitlementSnapshot::tenant_id),
            snapshot_version: snapshot.map(EntitlementSnapshot::version),
            actor_tenant: actor.tenant_id,
            role: actor.role.clone(),
            platform_override: actor.platform_override,
        }
    }
}

/// Memoised projection of one menu tree.
///
/// Recomputes when the key changes: a module toggle or role edit (snapshot
/// version), a role switch, or a tenant switch.
pub struct ProjectionCache {
    tree: Arc<MenuTree>,
    last: Mutex<Option<(ProjectionKey, Arc<MenuTree>)>>,
    recomputations: AtomicU64,
}

impl ProjectionCache {
    pub fn new(tree: MenuTree) -> Self {
        Self {
            tree: Arc::new(tree),
            last: Mutex::new(None),
            recomputations: AtomicU64::new(0),
        }
    }

    pub fn tree(&self) -> &MenuTree {
        &self.tree
    }

    pub fn project(&self, actor: &Actor, snapshot: Option<&EntitlementSnapshot>) -> Arc<MenuTree> {
        let key = ProjectionKey::of(actor, snapshot);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        if let Some((cached_key, projected)) = last.as_ref() {
            if *cached_key == key {
                return projected.clone();
            }
        }

        let projected = Arc::new(project(&self.tree, actor, snapshot));
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            role = %actor.role,
            items = projected.items().count(),
            "menu projection recomputed"
        );
        *last = Some((key, projected.clone()));
        projected
    }

    /// How many times the projection was actually computed.
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }
}
