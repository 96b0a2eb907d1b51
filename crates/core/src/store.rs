//! Storage ports for the collaborators that own claim, actor and role state.
//!
//! The core never holds network or database handles itself; SQLite, in-memory and HTTP
//! adapters implement these traits in their own crates.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::actor::{ActorId, ActorRecord};
use crate::domain::claim::{
    ClaimId, ClaimOperation, ClaimState, ClaimTransition, ExpenseClaim, NewClaim,
};
use crate::domain::role::{RoleDefinition, RoleId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("session is no longer authorized")]
    Unauthorized,
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    /// The stored claim is no longer in the state the write was computed from.
    #[error("claim `{claim}` is {current}; cannot {operation}")]
    StaleState { claim: ClaimId, current: ClaimState, operation: ClaimOperation },
    /// Refused delete: actors still reference the role at the time of the write.
    #[error("role `{role}` is assigned to {assigned} actor(s)")]
    RoleInUse { role: RoleId, assigned: u32 },
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}

#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn list_claims(&self) -> Result<Vec<ExpenseClaim>, StoreError>;
    async fn find_claim(&self, id: &ClaimId) -> Result<Option<ExpenseClaim>, StoreError>;
    /// Assigns an id and stores the claim in `pending`.
    async fn create_claim(&self, claim: NewClaim) -> Result<ExpenseClaim, StoreError>;
    /// Replaces the editable fields of a pending claim.
    async fn update_claim(&self, claim: &ExpenseClaim) -> Result<ExpenseClaim, StoreError>;
    /// Persists a lifecycle step together with the resulting claim.
    async fn apply_transition(
        &self,
        claim: &ExpenseClaim,
        transition: &ClaimTransition,
    ) -> Result<ExpenseClaim, StoreError>;
    async fn delete_claim(&self, id: &ClaimId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ActorDirectory: Send + Sync {
    async fn list_actors(&self) -> Result<Vec<ActorRecord>, StoreError>;
    async fn find_actor(&self, id: &ActorId) -> Result<Option<ActorRecord>, StoreError>;
    async fn save_actor(&self, record: ActorRecord) -> Result<ActorRecord, StoreError>;
    async fn delete_actor(&self, id: &ActorId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Roles with `assigned_actor_count` populated.
    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, StoreError>;
    async fn find_role(&self, id: &RoleId) -> Result<Option<RoleDefinition>, StoreError>;
    async fn insert_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError>;
    async fn update_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError>;
    /// Deletes the role only while no actor is assigned to it; otherwise `RoleInUse`.
    async fn delete_role(&self, id: &RoleId) -> Result<(), StoreError>;
}
