pub mod audit;
pub mod authz;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod money;
pub mod permissions;
pub mod service;
pub mod store;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use authz::{CapabilityDecision, CapabilityDenial, CapabilityEngine, RoleSnapshot};
pub use domain::actor::{Actor, ActorId, ActorRecord, ActorRole};
pub use domain::claim::{
    AttachmentRef, ClaimDraft, ClaimId, ClaimOperation, ClaimPatch, ClaimState, ClaimTransition,
    ExpenseCategory, ExpenseClaim, NewClaim,
};
pub use domain::role::{RoleDefinition, RoleId, RolePatch, RoleSpec};
pub use errors::{
    AuthorizationError, ConflictError, CoreError, InterfaceError, StateError, ValidationError,
};
pub use lifecycle::{ClaimLifecycle, TransitionOutcome};
pub use money::{compute_fuel_amount, round_currency, FuelAmount};
pub use permissions::{Permission, PermissionCategory, RoleRegistry};
pub use service::{ClaimService, RequestContext};
pub use store::{ActorDirectory, ClaimStore, RoleStore, StoreError};
