use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::role::RoleId;
use crate::errors::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four actor kinds every subsystem normalizes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Administrator,
    Supervisor,
    Employee,
    Accounting,
}

impl ActorRole {
    pub const ALL: [ActorRole; 4] =
        [Self::Administrator, Self::Supervisor, Self::Employee, Self::Accounting];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Supervisor => "supervisor",
            Self::Employee => "employee",
            Self::Accounting => "accounting",
        }
    }

    /// Id of the built-in registry role that backs this actor kind.
    pub fn system_role_id(self) -> RoleId {
        RoleId(self.as_str().to_string())
    }
}

impl FromStr for ActorRole {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "administrator" | "administrador" | "admin" | "superadmin" => Ok(Self::Administrator),
            "supervisor" | "supervisora" | "manager" => Ok(Self::Supervisor),
            "employee" | "empleado" | "empleada" | "user" | "usuario" => Ok(Self::Employee),
            "accounting" | "contabilidad" | "contador" | "contadora" | "finance" => {
                Ok(Self::Accounting)
            }
            _ => Err(ValidationError::UnknownRole { value: value.to_string() }),
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated user performing an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: ActorRole,
    /// Registry role granting fine-grained permissions. Falls back to the system role of `role`.
    pub role_id: Option<RoleId>,
    /// Claim authors under this actor's scope. Only meaningful for supervisors.
    #[serde(default)]
    pub supervisor_of: BTreeSet<ActorId>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self { id: ActorId(id.into()), role, role_id: None, supervisor_of: BTreeSet::new() }
    }

    pub fn with_role_id(mut self, role_id: RoleId) -> Self {
        self.role_id = Some(role_id);
        self
    }

    pub fn supervising<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supervisor_of.extend(authors.into_iter().map(|author| ActorId(author.into())));
        self
    }

    pub fn effective_role_id(&self) -> RoleId {
        self.role_id.clone().unwrap_or_else(|| self.role.system_role_id())
    }

    pub fn supervises(&self, author: &ActorId) -> bool {
        self.role == ActorRole::Supervisor && self.supervisor_of.contains(author)
    }
}

/// Directory entry for an actor, as listed by the user administration endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub actor: Actor,
    pub display_name: String,
    pub email: String,
    pub active: bool,
}
