//! Async claim orchestration: resolve actor, load claim, run the lifecycle against a fresh role
//! snapshot, persist through the store, then audit.
//!
//! Store calls are bounded by `request_timeout` and are never retried. Mutations on one claim
//! are single-flight.

pub mod in_flight;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::authz::{CapabilityEngine, RoleSnapshot};
use crate::domain::actor::{Actor, ActorId};
use crate::domain::claim::{
    ClaimDraft, ClaimId, ClaimOperation, ClaimPatch, ExpenseClaim,
};
use crate::errors::CoreError;
use crate::lifecycle::{ClaimLifecycle, TransitionOutcome};
use crate::store::{ActorDirectory, ClaimStore, RoleStore, StoreError};

pub use in_flight::{InFlightClaims, InFlightGuard};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Who is asking, and under which correlation id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub actor_id: ActorId,
    pub correlation_id: String,
    /// Requester's calendar date; the UTC date is used when unset.
    pub local_date: Option<NaiveDate>,
}

impl RequestContext {
    pub fn new(actor_id: ActorId, correlation_id: impl Into<String>) -> Self {
        Self { actor_id, correlation_id: correlation_id.into(), local_date: None }
    }

    pub fn with_local_date(mut self, today: NaiveDate) -> Self {
        self.local_date = Some(today);
        self
    }

    pub fn for_actor(actor_id: ActorId) -> Self {
        Self::new(actor_id, Uuid::new_v4().to_string())
    }

    fn dated(&self, lifecycle: ClaimLifecycle) -> ClaimLifecycle {
        match self.local_date {
            Some(today) => lifecycle.on_local_date(today),
            None => lifecycle,
        }
    }

    fn audit(&self, claim_id: Option<ClaimId>) -> AuditContext {
        AuditContext::new(claim_id, self.correlation_id.clone(), self.actor_id.0.clone())
    }
}

#[derive(Clone)]
pub struct ClaimService {
    claims: Arc<dyn ClaimStore>,
    actors: Arc<dyn ActorDirectory>,
    roles: Arc<dyn RoleStore>,
    audit: Arc<dyn AuditSink>,
    in_flight: InFlightClaims,
    request_timeout: Duration,
}

impl ClaimService {
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        actors: Arc<dyn ActorDirectory>,
        roles: Arc<dyn RoleStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            claims,
            actors,
            roles,
            audit,
            in_flight: InFlightClaims::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn in_flight(&self) -> &InFlightClaims {
        &self.in_flight
    }

    /// Claims the actor is allowed to see, newest first.
    pub async fn list_claims(&self, ctx: &RequestContext) -> Result<Vec<ExpenseClaim>, CoreError> {
        let actor = self.resolve_actor(&ctx.actor_id).await?;
        let capabilities = self.capabilities().await?;
        let mut claims = self.call(self.claims.list_claims()).await?;
        claims.retain(|claim| capabilities.can_view(&actor, claim));
        claims.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.created_at.cmp(&a.created_at)));
        Ok(claims)
    }

    pub async fn submit(
        &self,
        ctx: &RequestContext,
        draft: ClaimDraft,
    ) -> Result<ExpenseClaim, CoreError> {
        let audit = ctx.audit(None);
        let result = async {
            let actor = self.resolve_actor(&ctx.actor_id).await?;
            let lifecycle = ctx.dated(self.lifecycle().await?);
            let new_claim = lifecycle.submit(draft, &actor, Utc::now())?;
            self.call(self.claims.create_claim(new_claim)).await
        }
        .await;

        match &result {
            Ok(claim) => {
                self.audit.emit(
                    audit
                        .for_claim(claim.id.clone())
                        .event("claim.submitted", AuditCategory::Claim, AuditOutcome::Success)
                        .with_metadata("category", claim.category.as_str())
                        .with_metadata("amount", claim.amount.to_string()),
                );
                info!(
                    event_name = "claim.submitted",
                    correlation_id = %ctx.correlation_id,
                    claim_id = %claim.id,
                    amount = %claim.amount,
                    "claim submitted"
                );
            }
            Err(error) => self.report_failure(&audit, ClaimOperation::Create, error),
        }
        result
    }

    pub async fn approve(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
    ) -> Result<ExpenseClaim, CoreError> {
        self.transition(ctx, claim_id, ClaimOperation::Approve, |lifecycle, claim, actor| {
            lifecycle.approve(claim, actor, Utc::now())
        })
        .await
    }

    pub async fn reject(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
        reason: Option<String>,
    ) -> Result<ExpenseClaim, CoreError> {
        self.transition(ctx, claim_id, ClaimOperation::Reject, move |lifecycle, claim, actor| {
            lifecycle.reject(claim, actor, reason, Utc::now())
        })
        .await
    }

    pub async fn mark_paid(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
    ) -> Result<ExpenseClaim, CoreError> {
        self.transition(ctx, claim_id, ClaimOperation::MarkPaid, |lifecycle, claim, actor| {
            lifecycle.mark_paid(claim, actor, Utc::now())
        })
        .await
    }

    pub async fn edit(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
        patch: ClaimPatch,
    ) -> Result<ExpenseClaim, CoreError> {
        let audit = ctx.audit(Some(claim_id.clone()));
        let result = async {
            let _guard = self.in_flight.try_acquire(claim_id)?;
            let (actor, claim, lifecycle) = self.load(ctx, claim_id).await?;
            let edited = ctx.dated(lifecycle).edit(&claim, &actor, patch, Utc::now())?;
            self.call(self.claims.update_claim(&edited)).await
        }
        .await;

        match &result {
            Ok(claim) => {
                self.audit.emit(
                    audit
                        .event("claim.edited", AuditCategory::Claim, AuditOutcome::Success)
                        .with_metadata("amount", claim.amount.to_string()),
                );
                info!(
                    event_name = "claim.edited",
                    correlation_id = %ctx.correlation_id,
                    claim_id = %claim_id,
                    "claim edited"
                );
            }
            Err(error) => self.report_failure(&audit, ClaimOperation::Edit, error),
        }
        result
    }

    pub async fn delete(&self, ctx: &RequestContext, claim_id: &ClaimId) -> Result<(), CoreError> {
        let audit = ctx.audit(Some(claim_id.clone()));
        let result = async {
            let _guard = self.in_flight.try_acquire(claim_id)?;
            let (actor, claim, lifecycle) = self.load(ctx, claim_id).await?;
            let id = lifecycle.delete(&claim, &actor)?;
            self.call(self.claims.delete_claim(&id)).await
        }
        .await;

        match &result {
            Ok(()) => {
                self.audit
                    .emit(audit.event("claim.deleted", AuditCategory::Claim, AuditOutcome::Success));
                info!(
                    event_name = "claim.deleted",
                    correlation_id = %ctx.correlation_id,
                    claim_id = %claim_id,
                    "claim deleted"
                );
            }
            Err(error) => self.report_failure(&audit, ClaimOperation::Delete, error),
        }
        result
    }

    async fn transition<F>(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
        operation: ClaimOperation,
        step: F,
    ) -> Result<ExpenseClaim, CoreError>
    where
        F: FnOnce(&ClaimLifecycle, &ExpenseClaim, &Actor) -> Result<TransitionOutcome, CoreError>,
    {
        let audit = ctx.audit(Some(claim_id.clone()));
        let result = async {
            let _guard = self.in_flight.try_acquire(claim_id)?;
            let (actor, claim, lifecycle) = self.load(ctx, claim_id).await?;
            let outcome = step(&lifecycle, &claim, &actor)?;
            let stored =
                self.call(self.claims.apply_transition(&outcome.claim, &outcome.transition)).await?;
            Ok::<_, CoreError>((stored, outcome))
        }
        .await;

        match result {
            Ok((stored, outcome)) => {
                let event_type = transition_event(operation);
                let mut event = audit
                    .event(event_type, AuditCategory::Claim, AuditOutcome::Success)
                    .with_metadata("from", outcome.transition.from.as_str())
                    .with_metadata("to", outcome.transition.to.as_str());
                if let Some(reason) = &outcome.transition.reason {
                    event = event.with_metadata("reason", reason.clone());
                }
                self.audit.emit(event);
                info!(
                    event_name = event_type,
                    correlation_id = %ctx.correlation_id,
                    claim_id = %claim_id,
                    from = %outcome.transition.from,
                    to = %outcome.transition.to,
                    "claim transition applied"
                );
                Ok(stored)
            }
            Err(error) => {
                self.report_failure(&audit, operation, &error);
                Err(error)
            }
        }
    }

    async fn load(
        &self,
        ctx: &RequestContext,
        claim_id: &ClaimId,
    ) -> Result<(Actor, ExpenseClaim, ClaimLifecycle), CoreError> {
        let actor = self.resolve_actor(&ctx.actor_id).await?;
        let claim = self
            .call(self.claims.find_claim(claim_id))
            .await?
            .ok_or_else(|| StoreError::not_found("claim", claim_id.0.clone()))?;
        let lifecycle = self.lifecycle().await?;
        Ok((actor, claim, lifecycle))
    }

    async fn resolve_actor(&self, actor_id: &ActorId) -> Result<Actor, CoreError> {
        let record = self
            .call(self.actors.find_actor(actor_id))
            .await?
            .filter(|record| record.active)
            .ok_or_else(|| StoreError::not_found("actor", actor_id.0.clone()))?;
        Ok(record.actor)
    }

    async fn capabilities(&self) -> Result<CapabilityEngine, CoreError> {
        let roles = self.call(self.roles.list_roles()).await?;
        Ok(CapabilityEngine::new(RoleSnapshot::new(roles)))
    }

    async fn lifecycle(&self) -> Result<ClaimLifecycle, CoreError> {
        Ok(ClaimLifecycle::new(self.capabilities().await?))
    }

    async fn call<T, F>(&self, future: F) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.request_timeout, future).await {
            Ok(result) => result.map_err(CoreError::from),
            Err(_) => Err(StoreError::Timeout { seconds: self.request_timeout.as_secs() }.into()),
        }
    }

    fn report_failure(&self, audit: &AuditContext, operation: ClaimOperation, error: &CoreError) {
        let outcome = match error {
            CoreError::Remote(_) | CoreError::SessionExpired => AuditOutcome::Failed,
            _ => AuditOutcome::Rejected,
        };
        let category = match error {
            CoreError::Authorization(_) => AuditCategory::Authorization,
            CoreError::Remote(_) | CoreError::SessionExpired => AuditCategory::Persistence,
            _ => AuditCategory::Claim,
        };
        self.audit.emit(
            audit
                .event("claim.transition_denied", category, outcome)
                .with_metadata("operation", operation.as_str())
                .with_metadata("error_class", error.class())
                .with_metadata("error", error.to_string()),
        );
        warn!(
            event_name = "claim.transition_denied",
            correlation_id = %audit.correlation_id,
            claim_id = audit.claim_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unassigned"),
            operation = operation.as_str(),
            error_class = error.class(),
            error = %error,
            "claim operation failed"
        );
    }
}

fn transition_event(operation: ClaimOperation) -> &'static str {
    match operation {
        ClaimOperation::Approve => "claim.approved",
        ClaimOperation::Reject => "claim.rejected",
        ClaimOperation::MarkPaid => "claim.paid",
        ClaimOperation::Create => "claim.submitted",
        ClaimOperation::Edit => "claim.edited",
        ClaimOperation::Delete => "claim.deleted",
        ClaimOperation::View => "claim.viewed",
    }
}
