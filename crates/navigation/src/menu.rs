//! Declared navigation menu.

use serde::{Deserialize, Serialize};

/// A leaf entry bound to one module key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub title: String,
    pub path: String,
    pub module_key: String,
}

impl MenuItem {
    pub fn new(title: impl Into<String>, path: impl Into<String>, module_key: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            path: path.into(),
            module_key: module_key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuGroup {
    pub title: String,
    pub items: Vec<MenuItem>,
}

impl MenuGroup {
    pub fn new(title: impl Into<String>, items: impl IntoIterator<Item = MenuItem>) -> Self {
        Self {
            title: title.into(),
            items: items.into_iter().collect(),
        }
    }
}

/// Ordered groups of items. Declaration order is display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuTree {
    pub groups: Vec<MenuGroup>,
}

impl MenuTree {
    pub fn new(groups: impl IntoIterator<Item = MenuGroup>) -> Self {
        Self {
            groups: groups.into_iter().collect(),
        }
    }

    /// Single untitled group, for flat menus.
    pub fn flat(items: impl IntoIterator<Item = MenuItem>) -> Self {
        Self::new([MenuGroup::new("", items)])
    }

    pub fn clinic_default() -> Self {
        Self::new([
            MenuGroup::new(
                "Overview",
                [
                    MenuItem::new("Dashboard", "/dashboard", "dashboard"),
                    MenuItem::new("Account", "/account", "account-status"),
                ],
            ),
            MenuGroup::new(
                "Clinical",
                [
                    MenuItem::new("Patients", "/patients", "patients"),
                    MenuItem::new("Appointments", "/appointments", "appointments"),
                    MenuItem::new("Doctor", "/doctor", "doctor"),
                    MenuItem::new("Photo Manager", "/photos", "photo-manager"),
                    MenuItem::new("Technician", "/technician", "technician"),
                ],
            ),
            MenuGroup::new(
                "Front Desk",
                [
                    MenuItem::new("Reception", "/reception", "reception"),
                    MenuItem::new("Billing", "/billing", "billing"),
                ],
            ),
            MenuGroup::new(
                "Operations",
                [
                    MenuItem::new("Inventory", "/inventory", "inventory"),
                    MenuItem::new("CRM", "/crm", "crm"),
                    MenuItem::new("HR", "/hr", "hr"),
                    MenuItem::new("Reports", "/reports", "reports"),
                ],
            ),
            MenuGroup::new(
                "Administration",
                [
                    MenuItem::new("Clinic Admin", "/admin", "admin"),
                    MenuItem::new("Platform Console", "/superadmin", "super_admin"),
                ],
            ),
        ])
    }

    /// All leaves in display order.
    pub fn items(&self) -> impl Iterator<Item = &MenuItem> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.items.is_empty())
    }
}
