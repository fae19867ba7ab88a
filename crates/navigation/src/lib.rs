//! `clinicops-navigation`: consumers of entitlement decisions.
//!
//! The route guard and the menu projector both ask
//! [`clinicops_entitlements::resolve`]; neither has rules of its own, so a
//! menu entry is visible exactly when its route would be allowed.

pub mod menu;
pub mod projector;
pub mod route_guard;
pub mod routes;

pub use menu::{MenuGroup, MenuItem, MenuTree};
pub use projector::{project, visible_items, ProjectionCache, ProjectionKey};
pub use route_guard::{
    ContextError, ContextSource, GuardOutcome, GuardState, NavigationAttempt, RegistrySource, RouteGuard,
};
pub use routes::{Route, RouteAccess, RouteTable, SIGN_IN_PATH, UNAUTHORIZED_PATH};
