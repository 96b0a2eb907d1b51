use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorRole;
use crate::domain::role::RoleDefinition;
use crate::errors::ValidationError;

/// Bumped whenever a key is added to or removed from the catalog.
pub const CATALOG_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCategory {
    Claims,
    Users,
    Configuration,
    Reporting,
    Notifications,
}

impl PermissionCategory {
    pub const ALL: [PermissionCategory; 5] =
        [Self::Claims, Self::Users, Self::Configuration, Self::Reporting, Self::Notifications];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claims => "claims",
            Self::Users => "users",
            Self::Configuration => "configuration",
            Self::Reporting => "reporting",
            Self::Notifications => "notifications",
        }
    }

    pub fn permissions(self) -> impl Iterator<Item = Permission> {
        Permission::ALL.into_iter().filter(move |permission| permission.category() == self)
    }

    pub fn permission_set(self) -> BTreeSet<Permission> {
        self.permissions().collect()
    }
}

impl FromStr for PermissionCategory {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == key)
            .ok_or_else(|| ValidationError::UnknownPermissionCategory { value: value.to_string() })
    }
}

impl fmt::Display for PermissionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "claims.view_own")]
    ClaimsViewOwn,
    #[serde(rename = "claims.view_team")]
    ClaimsViewTeam,
    #[serde(rename = "claims.view_all")]
    ClaimsViewAll,
    #[serde(rename = "claims.create")]
    ClaimsCreate,
    #[serde(rename = "claims.edit")]
    ClaimsEdit,
    #[serde(rename = "claims.delete")]
    ClaimsDelete,
    #[serde(rename = "claims.approve")]
    ClaimsApprove,
    #[serde(rename = "claims.reject")]
    ClaimsReject,
    #[serde(rename = "claims.process_payments")]
    ClaimsProcessPayments,
    #[serde(rename = "users.view")]
    UsersView,
    #[serde(rename = "users.create")]
    UsersCreate,
    #[serde(rename = "users.edit")]
    UsersEdit,
    #[serde(rename = "users.delete")]
    UsersDelete,
    #[serde(rename = "configuration.view")]
    ConfigurationView,
    #[serde(rename = "configuration.edit")]
    ConfigurationEdit,
    #[serde(rename = "configuration.manage_roles")]
    ConfigurationManageRoles,
    #[serde(rename = "reporting.view")]
    ReportingView,
    #[serde(rename = "reporting.export")]
    ReportingExport,
    #[serde(rename = "notifications.receive")]
    NotificationsReceive,
    #[serde(rename = "notifications.manage")]
    NotificationsManage,
}

impl Permission {
    pub const ALL: [Permission; 20] = [
        Self::ClaimsViewOwn,
        Self::ClaimsViewTeam,
        Self::ClaimsViewAll,
        Self::ClaimsCreate,
        Self::ClaimsEdit,
        Self::ClaimsDelete,
        Self::ClaimsApprove,
        Self::ClaimsReject,
        Self::ClaimsProcessPayments,
        Self::UsersView,
        Self::UsersCreate,
        Self::UsersEdit,
        Self::UsersDelete,
        Self::ConfigurationView,
        Self::ConfigurationEdit,
        Self::ConfigurationManageRoles,
        Self::ReportingView,
        Self::ReportingExport,
        Self::NotificationsReceive,
        Self::NotificationsManage,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::ClaimsViewOwn => "claims.view_own",
            Self::ClaimsViewTeam => "claims.view_team",
            Self::ClaimsViewAll => "claims.view_all",
            Self::ClaimsCreate => "claims.create",
            Self::ClaimsEdit => "claims.edit",
            Self::ClaimsDelete => "claims.delete",
            Self::ClaimsApprove => "claims.approve",
            Self::ClaimsReject => "claims.reject",
            Self::ClaimsProcessPayments => "claims.process_payments",
            Self::UsersView => "users.view",
            Self::UsersCreate => "users.create",
            Self::UsersEdit => "users.edit",
            Self::UsersDelete => "users.delete",
            Self::ConfigurationView => "configuration.view",
            Self::ConfigurationEdit => "configuration.edit",
            Self::ConfigurationManageRoles => "configuration.manage_roles",
            Self::ReportingView => "reporting.view",
            Self::ReportingExport => "reporting.export",
            Self::NotificationsReceive => "notifications.receive",
            Self::NotificationsManage => "notifications.manage",
        }
    }

    pub fn category(self) -> PermissionCategory {
        use PermissionCategory::{Claims, Configuration, Notifications, Reporting, Users};

        match self {
            Self::ClaimsViewOwn
            | Self::ClaimsViewTeam
            | Self::ClaimsViewAll
            | Self::ClaimsCreate
            | Self::ClaimsEdit
            | Self::ClaimsDelete
            | Self::ClaimsApprove
            | Self::ClaimsReject
            | Self::ClaimsProcessPayments => Claims,
            Self::UsersView | Self::UsersCreate | Self::UsersEdit | Self::UsersDelete => Users,
            Self::ConfigurationView
            | Self::ConfigurationEdit
            | Self::ConfigurationManageRoles => Configuration,
            Self::ReportingView | Self::ReportingExport => Reporting,
            Self::NotificationsReceive | Self::NotificationsManage => Notifications,
        }
    }

    /// Catalog lookup. Returns `None` for keys the catalog does not define.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL.into_iter().find(|permission| permission.key() == key)
    }
}

impl FromStr for Permission {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_key(value)
            .ok_or_else(|| ValidationError::UnknownPermission { key: value.to_string() })
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Resolves raw permission keys against the catalog, failing on the first unknown key.
pub fn parse_permission_keys<I, S>(keys: I) -> Result<BTreeSet<Permission>, ValidationError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter().map(|key| key.as_ref().parse::<Permission>()).collect()
}

/// Built-in roles seeded into every registry. They cannot be edited or deleted.
pub fn system_roles(now: DateTime<Utc>) -> Vec<RoleDefinition> {
    use Permission::*;

    let grants = |role: ActorRole| -> BTreeSet<Permission> {
        match role {
            ActorRole::Administrator => Permission::ALL.into_iter().collect(),
            ActorRole::Supervisor => [
                ClaimsViewOwn,
                ClaimsViewTeam,
                ClaimsCreate,
                ClaimsEdit,
                ClaimsDelete,
                ClaimsApprove,
                ClaimsReject,
                UsersView,
                ReportingView,
                NotificationsReceive,
            ]
            .into_iter()
            .collect(),
            ActorRole::Employee => {
                [ClaimsViewOwn, ClaimsCreate, ClaimsEdit, ClaimsDelete, NotificationsReceive]
                    .into_iter()
                    .collect()
            }
            ActorRole::Accounting => [
                ClaimsViewOwn,
                ClaimsViewAll,
                ClaimsCreate,
                ClaimsApprove,
                ClaimsReject,
                ClaimsProcessPayments,
                ReportingView,
                ReportingExport,
                NotificationsReceive,
            ]
            .into_iter()
            .collect(),
        }
    };

    let describe = |role: ActorRole| -> (&'static str, &'static str, u8) {
        match role {
            ActorRole::Administrator => {
                ("Administrator", "Full access to claims, users and configuration", 10)
            }
            ActorRole::Accounting => {
                ("Accounting", "Reviews approved claims and processes payments", 7)
            }
            ActorRole::Supervisor => ("Supervisor", "Approves claims assigned to their team", 5),
            ActorRole::Employee => ("Employee", "Submits and manages their own claims", 1),
        }
    };

    ActorRole::ALL
        .into_iter()
        .map(|role| {
            let (name, description, level) = describe(role);
            RoleDefinition {
                id: role.system_role_id(),
                name: name.to_string(),
                description: description.to_string(),
                level,
                permissions: grants(role),
                is_system_role: true,
                assigned_actor_count: 0,
                created_at: now,
                updated_at: now,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;

    use super::{parse_permission_keys, system_roles, Permission, PermissionCategory};
    use crate::errors::ValidationError;

    #[test]
    fn every_key_is_unique_and_round_trips_through_the_catalog() {
        let keys: HashSet<_> = Permission::ALL.iter().map(|p| p.key()).collect();
        assert_eq!(keys.len(), Permission::ALL.len());
        for permission in Permission::ALL {
            assert_eq!(Permission::from_key(permission.key()), Some(permission));
            assert!(permission.key().starts_with(permission.category().as_str()));
        }
    }

    #[test]
    fn every_category_owns_at_least_one_key() {
        let covered: usize =
            PermissionCategory::ALL.iter().map(|category| category.permission_set().len()).sum();
        assert_eq!(covered, Permission::ALL.len());
        assert_eq!(PermissionCategory::Reporting.permission_set().len(), 2);
    }

    #[test]
    fn unknown_keys_are_reported() {
        let error = parse_permission_keys(["claims.approve", "claims.teleport"])
            .expect_err("unknown key must fail");
        assert_eq!(error, ValidationError::UnknownPermission { key: "claims.teleport".to_string() });
    }

    #[test]
    fn serialized_keys_match_catalog_keys() {
        let json = serde_json::to_string(&Permission::ClaimsProcessPayments).expect("serialize");
        assert_eq!(json, "\"claims.process_payments\"");
    }

    #[test]
    fn system_roles_cover_every_actor_kind() {
        let roles = system_roles(Utc::now());
        assert_eq!(roles.len(), 4);
        assert!(roles.iter().all(|role| role.is_system_role));

        let accounting = roles.iter().find(|role| role.id.0 == "accounting").expect("accounting");
        assert!(accounting.grants(Permission::ClaimsProcessPayments));
        let employee = roles.iter().find(|role| role.id.0 == "employee").expect("employee");
        assert!(!employee.grants(Permission::ClaimsApprove));
    }
}
