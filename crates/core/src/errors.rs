use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::actor::ActorId;
use crate::domain::claim::{ClaimId, ClaimOperation, ClaimState, ExpenseCategory};
use crate::domain::role::RoleId;
use crate::store::StoreError;

/// Input problems. Always raised before any call to a collaborator.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("a positive amount is required")]
    MissingAmount,
    #[error("fuel claims require a positive distance and rate per unit")]
    MissingFuelFields,
    #[error("{category} claims require exactly one attachment")]
    MissingRequiredAttachment { category: ExpenseCategory },
    #[error("a claim accepts at most one attachment, got {count}")]
    TooManyAttachments { count: usize },
    #[error("a category is required")]
    MissingCategory,
    #[error("a description is required")]
    MissingDescription,
    #[error("a project reference is required")]
    MissingProject,
    #[error("a claim date is required")]
    MissingDate,
    #[error("claim date {date} is in the future (today is {today})")]
    FutureDate { date: NaiveDate, today: NaiveDate },
    #[error("unknown expense category `{value}`")]
    UnknownCategory { value: String },
    #[error("unknown claim state `{value}`")]
    UnknownState { value: String },
    #[error("unknown actor role `{value}`")]
    UnknownRole { value: String },
    #[error("role `{role}` is a system role and cannot be modified")]
    SystemRoleImmutable { role: RoleId },
    #[error("role level {level} is outside 1..=10")]
    InvalidRoleLevel { level: u8 },
    #[error("a role name is required")]
    MissingRoleName,
    #[error("unknown permission `{key}`")]
    UnknownPermission { key: String },
    #[error("unknown permission category `{value}`")]
    UnknownPermissionCategory { value: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("actor `{actor}` is not allowed to {operation} claim `{claim}`")]
    Forbidden { actor: ActorId, operation: ClaimOperation, claim: ClaimId },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("cannot {operation} a claim in state {from}")]
    InvalidTransition { from: ClaimState, operation: ClaimOperation },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("role `{role}` is assigned to {assigned} actor(s) and cannot be deleted")]
    RoleInUse { role: RoleId, assigned: u32 },
    #[error("a role named `{name}` already exists")]
    RoleNameTaken { name: String },
    #[error("another transition on claim `{claim}` is still in flight")]
    TransitionInFlight { claim: ClaimId },
}

/// Transport or persistence failure reported by a collaborator. Never retried by the core.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("remote collaborator failure: {message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("session expired; re-authentication is required")]
    SessionExpired,
}

impl From<StoreError> for CoreError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Unauthorized => Self::SessionExpired,
            StoreError::StaleState { current, operation, .. } => {
                Self::State(StateError::InvalidTransition { from: current, operation })
            }
            StoreError::RoleInUse { role, assigned } => {
                Self::Conflict(ConflictError::RoleInUse { role, assigned })
            }
            other => Self::Remote(RemoteError::new(other.to_string())),
        }
    }
}

impl CoreError {
    /// Stable machine-readable class used by CLI payloads and logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authorization(_) => "forbidden",
            Self::State(_) => "invalid_transition",
            Self::Conflict(_) => "conflict",
            Self::Remote(_) => "remote",
            Self::NotFound { .. } => "not_found",
            Self::SessionExpired => "session_expired",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("unauthenticated: {message}")]
    Unauthenticated { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You do not have permission to perform this action.",
            Self::NotFound { .. } => "The requested record no longer exists.",
            Self::Conflict { .. } => {
                "The request conflicts with the current state. Refresh and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Unauthenticated { .. } => "Your session has expired. Please sign in again.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Unauthenticated { correlation_id, .. } => correlation_id,
        }
    }
}

impl CoreError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self {
            Self::Validation(_) | Self::State(_) => {
                InterfaceError::BadRequest { message, correlation_id }
            }
            Self::Authorization(_) => InterfaceError::Forbidden { message, correlation_id },
            Self::NotFound { .. } => InterfaceError::NotFound { message, correlation_id },
            Self::Conflict(_) => InterfaceError::Conflict { message, correlation_id },
            Self::Remote(RemoteError { message }) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::SessionExpired => InterfaceError::Unauthenticated { message, correlation_id },
        }
    }
}
