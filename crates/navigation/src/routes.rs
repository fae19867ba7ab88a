//! Static route table.

use serde::Serialize;

/// Where unauthenticated navigation is sent.
pub const SIGN_IN_PATH: &str = "/select-role";

/// Terminal screen for denied navigation.
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "access", rename_all = "snake_case")]
pub enum RouteAccess {
    /// Rendered without consulting the guard.
    Public,
    /// Guarded by one module key. The key is kept as written so that a
    /// route bound to a key outside the module enumeration fails closed
    /// instead of failing to load.
    Protected { module_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub path: String,
    #[serde(flatten)]
    pub access: RouteAccess,
}

impl Route {
    pub fn public(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            access: RouteAccess::Public,
        }
    }

    pub fn protected(path: impl Into<String>, module_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            access: RouteAccess::Protected {
                module_key: module_key.into(),
            },
        }
    }

    pub fn module_key(&self) -> Option<&str> {
        match &self.access {
            RouteAccess::Public => None,
            RouteAccess::Protected { module_key } => Some(module_key),
        }
    }

    /// Exact match, or `path` is below this protected route (`/doctor/emr`
    /// under `/doctor`). Public routes only match themselves.
    fn covers(&self, path: &str) -> bool {
        if path == self.path {
            return true;
        }
        matches!(self.access, RouteAccess::Protected { .. })
            && path
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        Self {
            routes: routes.into_iter().collect(),
        }
    }

    /// The clinic application's routes.
    pub fn clinic_default() -> Self {
        Self::new([
            Route::public("/"),
            Route::public("/login"),
            Route::public(SIGN_IN_PATH),
            Route::public(UNAUTHORIZED_PATH),
            Route::protected("/dashboard", "dashboard"),
            Route::protected("/account", "account-status"),
            Route::protected("/patients", "patients"),
            Route::protected("/appointments", "appointments"),
            Route::protected("/reception", "reception"),
            Route::protected("/billing", "billing"),
            Route::protected("/doctor", "doctor"),
            Route::protected("/photos", "photo-manager"),
            Route::protected("/hr", "hr"),
            Route::protected("/crm", "crm"),
            Route::protected("/reports", "reports"),
            Route::protected("/admin", "admin"),
            Route::protected("/inventory", "inventory"),
            Route::protected("/technician", "technician"),
            // Bound to a key that is not a module; always denied.
            Route::protected("/procedures", "procedures"),
            Route::protected("/superadmin", "super_admin"),
        ])
    }

    /// Most specific route covering `path`, if any. Paths with `.` or `..`
    /// segments are never routed.
    pub fn lookup(&self, path: &str) -> Option<&Route> {
        let path = normalize(path);
        if has_dot_segment(path) {
            return None;
        }
        self.routes
            .iter()
            .filter(|r| r.covers(path))
            .max_by_key(|r| r.path.len())
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

/// Drop query/fragment and a trailing slash.
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

/// `.` or `..` segment, plain or percent-encoded.
fn has_dot_segment(path: &str) -> bool {
    path.split('/').any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}
