use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Functional module of the clinic console.
///
/// The set is closed: routes and menu items carry raw wire strings, and a
/// string outside this enumeration is a configuration defect, never an
/// implicit grant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleKey {
    #[serde(rename = "dashboard")]
    Dashboard,
    #[serde(rename = "patients")]
    Patients,
    #[serde(rename = "appointments")]
    Appointments,
    #[serde(rename = "reception")]
    Reception,
    #[serde(rename = "doctor")]
    Doctor,
    #[serde(rename = "photo-manager")]
    PhotoManager,
    #[serde(rename = "technician")]
    Technician,
    #[serde(rename = "inventory")]
    Inventory,
    #[serde(rename = "billing")]
    Billing,
    #[serde(rename = "crm")]
    Crm,
    #[serde(rename = "hr")]
    Hr,
    #[serde(rename = "reports")]
    Reports,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "super_admin")]
    SuperAdmin,
    #[serde(rename = "account-status")]
    AccountStatus,
}

/// A module key string outside the known enumeration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown module key '{0}'")]
pub struct UnknownModule(pub String);

impl ModuleKey {
    /// Every known module, in declaration order.
    pub const ALL: [ModuleKey; 15] = [
        ModuleKey::Dashboard,
        ModuleKey::Patients,
        ModuleKey::Appointments,
        ModuleKey::Reception,
        ModuleKey::Doctor,
        ModuleKey::PhotoManager,
        ModuleKey::Technician,
        ModuleKey::Inventory,
        ModuleKey::Billing,
        ModuleKey::Crm,
        ModuleKey::Hr,
        ModuleKey::Reports,
        ModuleKey::Admin,
        ModuleKey::SuperAdmin,
        ModuleKey::AccountStatus,
    ];

    /// Modules every tenant and every role carries explicitly.
    pub const BASELINE: [ModuleKey; 2] = [ModuleKey::Dashboard, ModuleKey::AccountStatus];

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKey::Dashboard => "dashboard",
            ModuleKey::Patients => "patients",
            ModuleKey::Appointments => "appointments",
            ModuleKey::Reception => "reception",
            ModuleKey::Doctor => "doctor",
            ModuleKey::PhotoManager => "photo-manager",
            ModuleKey::Technician => "technician",
            ModuleKey::Inventory => "inventory",
            ModuleKey::Billing => "billing",
            ModuleKey::Crm => "crm",
            ModuleKey::Hr => "hr",
            ModuleKey::Reports => "reports",
            ModuleKey::Admin => "admin",
            ModuleKey::SuperAdmin => "super_admin",
            ModuleKey::AccountStatus => "account-status",
        }
    }

    pub fn is_baseline(self) -> bool {
        Self::BASELINE.contains(&self)
    }

    /// The one module a suspended or inactive tenant can still reach.
    pub fn survives_suspension(self) -> bool {
        self == ModuleKey::AccountStatus
    }
}

impl FromStr for ModuleKey {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleKey::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}

impl core::fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
