//! Capability engine deciding which actor may perform which claim operation.
//!
//! All checks are pure queries over an actor, a claim and a [`RoleSnapshot`]. The snapshot is
//! an owned value captured per request, so checks can run concurrently without invalidation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::actor::{Actor, ActorRole};
use crate::domain::claim::{ClaimOperation, ClaimState, ExpenseClaim};
use crate::domain::role::{RoleDefinition, RoleId};
use crate::errors::AuthorizationError;
use crate::permissions::Permission;

/// Point-in-time copy of the role registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleSnapshot {
    roles: HashMap<RoleId, RoleDefinition>,
}

impl RoleSnapshot {
    pub fn new(roles: Vec<RoleDefinition>) -> Self {
        Self { roles: roles.into_iter().map(|role| (role.id.clone(), role)).collect() }
    }

    pub fn role(&self, id: &RoleId) -> Option<&RoleDefinition> {
        self.roles.get(id)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapabilityDenial {
    NotAssignedApprover { approver: Option<String> },
    NotAuthor,
    NotPending { state: ClaimState },
    MissingPermission { permission: String },
    OutsideScope,
    RoleNotPermitted { role: ActorRole },
}

impl CapabilityDenial {
    fn reason(&self) -> String {
        match self {
            Self::NotAssignedApprover { approver: Some(approver) } => {
                format!("claim is assigned to approver `{approver}`")
            }
            Self::NotAssignedApprover { approver: None } => {
                "claim has no assigned approver".to_string()
            }
            Self::NotAuthor => "only the author may change this claim".to_string(),
            Self::NotPending { state } => format!("claim is {state}, not pending"),
            Self::MissingPermission { permission } => {
                format!("role does not grant `{permission}`")
            }
            Self::OutsideScope => "claim author is outside the actor's scope".to_string(),
            Self::RoleNotPermitted { role } => format!("role `{role}` cannot perform this"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDecision {
    pub allowed: bool,
    pub reason: String,
    pub denial: Option<CapabilityDenial>,
}

impl CapabilityDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), denial: None }
    }

    fn deny(denial: CapabilityDenial) -> Self {
        Self { allowed: false, reason: denial.reason(), denial: Some(denial) }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CapabilityEngine {
    snapshot: RoleSnapshot,
}

impl CapabilityEngine {
    pub fn new(snapshot: RoleSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &RoleSnapshot {
        &self.snapshot
    }

    /// Administrators and accounting approve anything; supervisors only claims assigned to them.
    pub fn can_approve(&self, actor: &Actor, claim: &ExpenseClaim) -> bool {
        self.decide_approval(actor, claim).allowed
    }

    pub fn can_edit(&self, actor: &Actor, claim: &ExpenseClaim) -> bool {
        self.decide_authoring(actor, claim).allowed
    }

    pub fn can_delete(&self, actor: &Actor, claim: &ExpenseClaim) -> bool {
        self.decide_authoring(actor, claim).allowed
    }

    pub fn can_mark_paid(&self, actor: &Actor) -> bool {
        self.has_permission(actor, Permission::ClaimsProcessPayments.key())
    }

    pub fn can_view(&self, actor: &Actor, claim: &ExpenseClaim) -> bool {
        self.decide_view(actor, claim).allowed
    }

    /// Fails closed: unknown keys and unknown roles grant nothing.
    pub fn has_permission(&self, actor: &Actor, permission_key: &str) -> bool {
        let Some(permission) = Permission::from_key(permission_key) else {
            return false;
        };
        self.snapshot
            .role(&actor.effective_role_id())
            .map(|role| role.grants(permission))
            .unwrap_or(false)
    }

    pub fn decide(
        &self,
        actor: &Actor,
        claim: &ExpenseClaim,
        operation: ClaimOperation,
    ) -> CapabilityDecision {
        match operation {
            ClaimOperation::Create => CapabilityDecision::allow("any actor may author claims"),
            ClaimOperation::View => self.decide_view(actor, claim),
            ClaimOperation::Edit | ClaimOperation::Delete => self.decide_authoring(actor, claim),
            ClaimOperation::Approve | ClaimOperation::Reject => {
                self.decide_approval(actor, claim)
            }
            ClaimOperation::MarkPaid => {
                if self.can_mark_paid(actor) {
                    CapabilityDecision::allow("role grants payment processing")
                } else {
                    CapabilityDecision::deny(CapabilityDenial::MissingPermission {
                        permission: Permission::ClaimsProcessPayments.key().to_string(),
                    })
                }
            }
        }
    }

    pub fn authorize(
        &self,
        actor: &Actor,
        claim: &ExpenseClaim,
        operation: ClaimOperation,
    ) -> Result<(), AuthorizationError> {
        if self.decide(actor, claim, operation).allowed {
            return Ok(());
        }
        Err(AuthorizationError::Forbidden {
            actor: actor.id.clone(),
            operation,
            claim: claim.id.clone(),
        })
    }

    fn decide_approval(&self, actor: &Actor, claim: &ExpenseClaim) -> CapabilityDecision {
        match actor.role {
            ActorRole::Administrator => CapabilityDecision::allow("administrators approve all claims"),
            ActorRole::Accounting => CapabilityDecision::allow("accounting approves all claims"),
            ActorRole::Supervisor => {
                if claim.assigned_approver.as_ref() == Some(&actor.id) {
                    CapabilityDecision::allow(format!(
                        "supervisor `{}` is the assigned approver",
                        actor.id
                    ))
                } else {
                    CapabilityDecision::deny(CapabilityDenial::NotAssignedApprover {
                        approver: claim.assigned_approver.as_ref().map(|id| id.0.clone()),
                    })
                }
            }
            ActorRole::Employee => {
                CapabilityDecision::deny(CapabilityDenial::RoleNotPermitted { role: actor.role })
            }
        }
    }

    fn decide_authoring(&self, actor: &Actor, claim: &ExpenseClaim) -> CapabilityDecision {
        if actor.role == ActorRole::Administrator {
            return CapabilityDecision::allow("administrators manage all claims");
        }
        if !claim.is_authored_by(&actor.id) {
            return CapabilityDecision::deny(CapabilityDenial::NotAuthor);
        }
        if claim.state != ClaimState::Pending {
            return CapabilityDecision::deny(CapabilityDenial::NotPending { state: claim.state });
        }
        CapabilityDecision::allow("author may change a pending claim")
    }

    fn decide_view(&self, actor: &Actor, claim: &ExpenseClaim) -> CapabilityDecision {
        match actor.role {
            ActorRole::Administrator | ActorRole::Accounting => {
                CapabilityDecision::allow("role sees every claim")
            }
            _ if claim.is_authored_by(&actor.id) => CapabilityDecision::allow("actor is the author"),
            ActorRole::Supervisor
                if actor.supervises(&claim.created_by)
                    || claim.assigned_approver.as_ref() == Some(&actor.id) =>
            {
                CapabilityDecision::allow("claim is within the supervisor's team")
            }
            _ => CapabilityDecision::deny(CapabilityDenial::OutsideScope),
        }
    }
}
