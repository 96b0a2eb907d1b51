use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::permissions::Permission;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(pub String);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const MIN_ROLE_LEVEL: u8 = 1;
pub const MAX_ROLE_LEVEL: u8 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    /// Display ordering only.
    pub level: u8,
    pub permissions: BTreeSet<Permission>,
    pub is_system_role: bool,
    /// Derived by the store from actor assignments.
    pub assigned_actor_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleDefinition {
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn is_in_use(&self) -> bool {
        self.assigned_actor_count > 0
    }
}

/// Input for creating a custom role. Permission keys are raw strings so that
/// keys outside the catalog can be reported instead of silently dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub description: String,
    pub level: u8,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub level: Option<u8>,
    pub permissions: Option<Vec<String>>,
}
