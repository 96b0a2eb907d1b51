use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use claimdesk_core::audit::InMemoryAuditSink;
use claimdesk_core::domain::actor::{Actor, ActorId, ActorRecord, ActorRole};
use claimdesk_core::domain::claim::{
    ClaimDraft, ClaimId, ClaimOperation, ClaimPatch, ClaimState, ClaimTransition,
    ExpenseCategory, ExpenseClaim, NewClaim,
};
use claimdesk_core::domain::role::{RoleId, RolePatch, RoleSpec};
use claimdesk_core::errors::{
    AuthorizationError, ConflictError, CoreError, StateError, ValidationError,
};
use claimdesk_core::permissions::{system_roles, PermissionCategory, RoleRegistry};
use claimdesk_core::service::{ClaimService, RequestContext};
use claimdesk_core::store::{ClaimStore, StoreError};
use claimdesk_db::{InMemoryActorDirectory, InMemoryClaimStore, InMemoryRoleStore};

type TestResult<T = ()> = Result<T, String>;

struct Harness {
    service: ClaimService,
    claims: Arc<InMemoryClaimStore>,
    actors: Arc<InMemoryActorDirectory>,
    roles: Arc<InMemoryRoleStore>,
    audit: InMemoryAuditSink,
}

fn record(actor: Actor) -> ActorRecord {
    let id = actor.id.0.clone();
    ActorRecord { actor, display_name: id.clone(), email: format!("{id}@example.com"), active: true }
}

fn team() -> Vec<ActorRecord> {
    vec![
        record(Actor::new("admin-1", ActorRole::Administrator)),
        record(Actor::new("acct-1", ActorRole::Accounting)),
        record(Actor::new("sup-1", ActorRole::Supervisor).supervising(["emp-1"])),
        record(Actor::new("sup-2", ActorRole::Supervisor).supervising(["emp-2"])),
        record(Actor::new("emp-1", ActorRole::Employee)),
        record(Actor::new("emp-2", ActorRole::Employee)),
    ]
}

async fn harness_with(claims: InMemoryClaimStore, timeout: Duration) -> Harness {
    let claims = Arc::new(claims);
    let actors = Arc::new(InMemoryActorDirectory::with_records(team()).await);
    let roles = Arc::new(
        InMemoryRoleStore::with_roles(system_roles(Utc::now())).await.linked_to(actors.clone()),
    );
    let audit = InMemoryAuditSink::default();
    let service =
        ClaimService::new(claims.clone(), actors.clone(), roles.clone(), Arc::new(audit.clone()))
            .with_request_timeout(timeout);
    Harness { service, claims, actors, roles, audit }
}

async fn harness() -> Harness {
    harness_with(InMemoryClaimStore::default(), Duration::from_secs(5)).await
}

fn ctx(actor: &str) -> RequestContext {
    RequestContext::new(ActorId(actor.to_string()), format!("req-{actor}"))
}

fn yesterday() -> NaiveDate {
    Utc::now().date_naive().pred_opt().unwrap_or(NaiveDate::MIN)
}

fn fuel_draft(approver: &str) -> ClaimDraft {
    ClaimDraft {
        category: Some(ExpenseCategory::Fuel),
        description: "Client visit".to_string(),
        project: "ACME-42".to_string(),
        date: Some(yesterday()),
        amount: Some(Decimal::new(999_999, 2)),
        distance: Some(Decimal::new(50, 0)),
        rate_per_unit: Some(Decimal::new(20, 2)),
        attachments: Vec::new(),
        assigned_approver: Some(ActorId(approver.to_string())),
    }
}

async fn submit_fuel(h: &Harness, author: &str, approver: &str) -> TestResult<ExpenseClaim> {
    h.service
        .submit(&ctx(author), fuel_draft(approver))
        .await
        .map_err(|error| format!("submit failed: {error}"))
}

async fn stored(h: &Harness, id: &ClaimId) -> TestResult<ExpenseClaim> {
    h.claims
        .find_claim(id)
        .await
        .map_err(|error| error.to_string())?
        .ok_or_else(|| format!("claim {id} missing"))
}

#[tokio::test]
async fn administrator_approves_pending_fuel_claim_with_derived_amount() -> TestResult {
    let h = harness().await;
    let claim = submit_fuel(&h, "emp-1", "sup-1").await?;
    if claim.amount != Decimal::new(1000, 2) || claim.amount.to_string() != "10.00" {
        return Err(format!("fuel amount should be 10.00, got {}", claim.amount));
    }

    let approved = h
        .service
        .approve(&ctx("admin-1"), &claim.id)
        .await
        .map_err(|error| format!("approve failed: {error}"))?;

    if approved.state != ClaimState::Approved || approved.amount.to_string() != "10.00" {
        return Err(format!("unexpected approved claim: {approved:?}"));
    }
    let events: Vec<String> = h.audit.events().into_iter().map(|event| event.event_type).collect();
    if events != ["claim.submitted", "claim.approved"] {
        return Err(format!("unexpected audit trail: {events:?}"));
    }
    if h.claims.transitions().await.len() != 1 {
        return Err("approval should record exactly one transition".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn supervisor_who_is_not_assigned_is_forbidden_and_claim_is_unchanged() -> TestResult {
    let h = harness().await;
    let claim = submit_fuel(&h, "emp-1", "sup-1").await?;

    let error = match h.service.approve(&ctx("sup-2"), &claim.id).await {
        Ok(_) => return Err("sup-2 should not approve".to_string()),
        Err(error) => error,
    };
    let expected = CoreError::Authorization(AuthorizationError::Forbidden {
        actor: ActorId("sup-2".to_string()),
        operation: ClaimOperation::Approve,
        claim: claim.id.clone(),
    });
    if error != expected {
        return Err(format!("expected Forbidden, got {error:?}"));
    }
    if stored(&h, &claim.id).await? != claim {
        return Err("claim must be unchanged after a forbidden approval".to_string());
    }
    let denied = h
        .audit
        .events()
        .into_iter()
        .any(|event| event.event_type == "claim.transition_denied" && event.correlation_id == "req-sup-2");
    if !denied {
        return Err("denial should be audited with the request correlation id".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn finished_claims_reject_approval_for_every_actor() -> TestResult {
    let h = harness().await;
    let paid = submit_fuel(&h, "emp-1", "sup-1").await?;
    h.service.approve(&ctx("acct-1"), &paid.id).await.map_err(|e| e.to_string())?;
    h.service.mark_paid(&ctx("acct-1"), &paid.id).await.map_err(|e| e.to_string())?;

    let rejected = submit_fuel(&h, "emp-1", "sup-1").await?;
    let rejected = h
        .service
        .reject(&ctx("sup-1"), &rejected.id, Some("wrong project".to_string()))
        .await
        .map_err(|e| e.to_string())?;
    if rejected.rejection_reason.as_deref() != Some("wrong project") {
        return Err("rejection reason should be stored".to_string());
    }

    for (claim_id, from) in [(&paid.id, ClaimState::Paid), (&rejected.id, ClaimState::Rejected)] {
        for actor in ["admin-1", "acct-1", "sup-1", "sup-2", "emp-1", "emp-2"] {
            let outcome = h.service.approve(&ctx(actor), claim_id).await;
            let expected = Err(CoreError::State(StateError::InvalidTransition {
                from,
                operation: ClaimOperation::Approve,
            }));
            if outcome != expected {
                return Err(format!("{actor} on {from} claim: expected InvalidTransition, got {outcome:?}"));
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn rejection_without_reason_stores_empty_reason() -> TestResult {
    let h = harness().await;
    let claim = submit_fuel(&h, "emp-2", "sup-2").await?;
    let rejected =
        h.service.reject(&ctx("sup-2"), &claim.id, None).await.map_err(|e| e.to_string())?;

    if rejected.state != ClaimState::Rejected || rejected.rejection_reason.as_deref() != Some("") {
        return Err(format!("unexpected rejection: {rejected:?}"));
    }
    Ok(())
}

#[tokio::test]
async fn listing_is_scoped_to_what_each_actor_may_view() -> TestResult {
    let h = harness().await;
    let own = submit_fuel(&h, "emp-1", "sup-1").await?;
    let other = submit_fuel(&h, "emp-2", "sup-2").await?;

    let ids = |claims: Vec<ExpenseClaim>| claims.into_iter().map(|c| c.id).collect::<Vec<_>>();

    let employee = ids(h.service.list_claims(&ctx("emp-1")).await.map_err(|e| e.to_string())?);
    if employee != vec![own.id.clone()] {
        return Err(format!("employee should only see own claims, saw {employee:?}"));
    }
    let supervisor = ids(h.service.list_claims(&ctx("sup-2")).await.map_err(|e| e.to_string())?);
    if supervisor != vec![other.id.clone()] {
        return Err(format!("sup-2 should only see its team, saw {supervisor:?}"));
    }
    let accounting = h.service.list_claims(&ctx("acct-1")).await.map_err(|e| e.to_string())?;
    if accounting.len() != 2 {
        return Err("accounting sees every claim".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn author_edits_and_deletes_only_while_pending() -> TestResult {
    let h = harness().await;
    let claim = submit_fuel(&h, "emp-1", "sup-1").await?;

    let forbidden = h
        .service
        .edit(&ctx("emp-2"), &claim.id, ClaimPatch { project: Some("X".into()), ..Default::default() })
        .await;
    if !matches!(forbidden, Err(CoreError::Authorization(_))) {
        return Err(format!("non-author edit should be forbidden, got {forbidden:?}"));
    }

    let edited = h
        .service
        .edit(
            &ctx("emp-1"),
            &claim.id,
            ClaimPatch { distance: Some(Decimal::new(120, 0)), rate_per_unit: Some(Decimal::new(502, 3)), ..Default::default() },
        )
        .await
        .map_err(|e| format!("author edit failed: {e}"))?;
    if edited.amount.to_string() != "60.24" {
        return Err(format!("edited fuel amount should be 60.24, got {}", edited.amount));
    }

    h.service.approve(&ctx("sup-1"), &claim.id).await.map_err(|e| e.to_string())?;
    let late_delete = h.service.delete(&ctx("emp-1"), &claim.id).await;
    let expected = Err(CoreError::State(StateError::InvalidTransition {
        from: ClaimState::Approved,
        operation: ClaimOperation::Delete,
    }));
    if late_delete != expected {
        return Err(format!("delete after approval should be InvalidTransition, got {late_delete:?}"));
    }

    let fresh = submit_fuel(&h, "emp-1", "sup-1").await?;
    h.service.delete(&ctx("emp-1"), &fresh.id).await.map_err(|e| e.to_string())?;
    if h.claims.find_claim(&fresh.id).await.map_err(|e| e.to_string())?.is_some() {
        return Err("deleted claim should be gone".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn meal_claims_without_receipt_never_reach_the_store() -> TestResult {
    let h = harness().await;
    let draft = ClaimDraft {
        category: Some(ExpenseCategory::Meal),
        description: "Team dinner".to_string(),
        project: "OPS".to_string(),
        date: Some(yesterday()),
        amount: Some(Decimal::new(8000, 2)),
        ..ClaimDraft::default()
    };

    let outcome = h.service.submit(&ctx("emp-1"), draft).await;
    let expected = Err(CoreError::Validation(ValidationError::MissingRequiredAttachment {
        category: ExpenseCategory::Meal,
    }));
    if outcome != expected {
        return Err(format!("expected MissingRequiredAttachment, got {outcome:?}"));
    }
    if !h.claims.list_claims().await.map_err(|e| e.to_string())?.is_empty() {
        return Err("invalid drafts must not be persisted".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn overlapping_transitions_on_one_claim_fail_fast() -> TestResult {
    let h = harness_with(
        InMemoryClaimStore::with_latency(Duration::from_millis(50)),
        Duration::from_secs(5),
    )
    .await;
    let claim = submit_fuel(&h, "emp-1", "sup-1").await?;

    let admin = ctx("admin-1");
    let accounting = ctx("acct-1");
    let (first, second) = tokio::join!(
        h.service.approve(&admin, &claim.id),
        h.service.reject(&accounting, &claim.id, Some("duplicate".to_string())),
    );

    if first.as_ref().map(|c| c.state) != Ok(ClaimState::Approved) {
        return Err(format!("first transition should win, got {first:?}"));
    }
    let expected = Err(CoreError::Conflict(ConflictError::TransitionInFlight { claim: claim.id.clone() }));
    if second != expected {
        return Err(format!("second transition should fail fast, got {second:?}"));
    }
    if h.service.in_flight().is_in_flight(&claim.id) {
        return Err("guard should be released once the first transition resolves".to_string());
    }
    Ok(())
}

/// Hands out the claim as read, then lets another writer approve it before the caller's
/// write lands.
struct ApprovedElsewhere {
    inner: Arc<InMemoryClaimStore>,
    raced: AtomicBool,
}

#[async_trait]
impl ClaimStore for ApprovedElsewhere {
    async fn list_claims(&self) -> Result<Vec<ExpenseClaim>, StoreError> {
        self.inner.list_claims().await
    }

    async fn find_claim(&self, id: &ClaimId) -> Result<Option<ExpenseClaim>, StoreError> {
        let found = self.inner.find_claim(id).await?;
        if let Some(claim) = &found {
            if claim.state == ClaimState::Pending && !self.raced.swap(true, Ordering::SeqCst) {
                let mut approved = claim.clone();
                approved.state = ClaimState::Approved;
                let transition = ClaimTransition {
                    claim_id: claim.id.clone(),
                    from: ClaimState::Pending,
                    to: ClaimState::Approved,
                    operation: ClaimOperation::Approve,
                    actor: ActorId("admin-1".to_string()),
                    reason: None,
                    occurred_at: Utc::now(),
                };
                self.inner.apply_transition(&approved, &transition).await?;
            }
        }
        Ok(found)
    }

    async fn create_claim(&self, claim: NewClaim) -> Result<ExpenseClaim, StoreError> {
        self.inner.create_claim(claim).await
    }

    async fn update_claim(&self, claim: &ExpenseClaim) -> Result<ExpenseClaim, StoreError> {
        self.inner.update_claim(claim).await
    }

    async fn apply_transition(
        &self,
        claim: &ExpenseClaim,
        transition: &ClaimTransition,
    ) -> Result<ExpenseClaim, StoreError> {
        self.inner.apply_transition(claim, transition).await
    }

    async fn delete_claim(&self, id: &ClaimId) -> Result<(), StoreError> {
        self.inner.delete_claim(id).await
    }
}

async fn racing_service() -> (ClaimService, Arc<InMemoryClaimStore>, Arc<ApprovedElsewhere>) {
    let inner = Arc::new(InMemoryClaimStore::default());
    let racing = Arc::new(ApprovedElsewhere { inner: inner.clone(), raced: AtomicBool::new(true) });
    let actors = Arc::new(InMemoryActorDirectory::with_records(team()).await);
    let roles = Arc::new(InMemoryRoleStore::with_roles(system_roles(Utc::now())).await);
    let service = ClaimService::new(
        racing.clone(),
        actors,
        roles,
        Arc::new(InMemoryAuditSink::default()),
    );
    (service, inner, racing)
}

#[tokio::test]
async fn claim_approved_elsewhere_rejects_as_invalid_transition() -> TestResult {
    let (service, inner, racing) = racing_service().await;
    let claim = service
        .submit(&ctx("emp-1"), fuel_draft("sup-1"))
        .await
        .map_err(|error| format!("submit failed: {error}"))?;
    racing.raced.store(false, Ordering::SeqCst);

    let outcome = service.reject(&ctx("sup-1"), &claim.id, Some("late".to_string())).await;
    let expected = Err(CoreError::State(StateError::InvalidTransition {
        from: ClaimState::Approved,
        operation: ClaimOperation::Reject,
    }));
    if outcome != expected {
        return Err(format!("stale reject should be an invalid transition, got {outcome:?}"));
    }
    if let Err(error) = &outcome {
        if error.class() != "invalid_transition" {
            return Err(format!("unexpected class {}", error.class()));
        }
    }

    let current = inner
        .find_claim(&claim.id)
        .await
        .map_err(|error| error.to_string())?
        .ok_or("claim missing")?;
    if current.state != ClaimState::Approved || current.rejection_reason.is_some() {
        return Err(format!("the concurrent approval must stand, got {current:?}"));
    }
    Ok(())
}

#[tokio::test]
async fn edit_of_claim_approved_elsewhere_is_an_invalid_transition() -> TestResult {
    let (service, _inner, racing) = racing_service().await;
    let claim = service
        .submit(&ctx("emp-1"), fuel_draft("sup-1"))
        .await
        .map_err(|error| format!("submit failed: {error}"))?;
    racing.raced.store(false, Ordering::SeqCst);

    let patch = ClaimPatch { description: Some("Late edit".to_string()), ..ClaimPatch::default() };
    let outcome = service.edit(&ctx("emp-1"), &claim.id, patch).await;
    let expected = Err(CoreError::State(StateError::InvalidTransition {
        from: ClaimState::Approved,
        operation: ClaimOperation::Edit,
    }));
    if outcome != expected {
        return Err(format!("stale edit should be an invalid transition, got {outcome:?}"));
    }
    Ok(())
}

#[tokio::test]
async fn slow_store_surfaces_as_remote_failure() -> TestResult {
    let h = harness_with(
        InMemoryClaimStore::with_latency(Duration::from_millis(200)),
        Duration::from_millis(20),
    )
    .await;

    let outcome = h.service.list_claims(&ctx("admin-1")).await;
    match outcome {
        Err(error) if error.class() == "remote" => Ok(()),
        other => Err(format!("expected remote timeout, got {other:?}")),
    }
}

#[tokio::test]
async fn inactive_actor_is_treated_as_unknown() -> TestResult {
    let h = harness().await;
    let mut retired = record(Actor::new("emp-9", ActorRole::Employee));
    retired.active = false;
    claimdesk_core::store::ActorDirectory::save_actor(h.actors.as_ref(), retired)
        .await
        .map_err(|e| e.to_string())?;

    let outcome = h.service.submit(&ctx("emp-9"), fuel_draft("sup-1")).await;
    if !matches!(outcome, Err(CoreError::NotFound { entity: "actor", .. })) {
        return Err(format!("inactive actor should resolve as not found, got {outcome:?}"));
    }
    Ok(())
}

#[tokio::test]
async fn role_assigned_to_actors_cannot_be_deleted() -> TestResult {
    let h = harness().await;
    let registry = RoleRegistry::new(h.roles.clone());
    let role = registry
        .create_role(RoleSpec {
            name: "Regional Lead".to_string(),
            description: "Approves travel for a region".to_string(),
            level: 6,
            permissions: vec!["claims.view_team".to_string(), "claims.approve".to_string()],
        })
        .await
        .map_err(|e| format!("create role failed: {e}"))?;

    for id in ["lead-1", "lead-2", "lead-3"] {
        let actor = Actor::new(id, ActorRole::Supervisor).with_role_id(role.id.clone());
        claimdesk_core::store::ActorDirectory::save_actor(h.actors.as_ref(), record(actor))
            .await
            .map_err(|e| e.to_string())?;
    }

    let before = registry.list_roles().await.map_err(|e| e.to_string())?;
    let outcome = registry.delete_role(&role.id).await;
    let expected = Err(CoreError::Conflict(ConflictError::RoleInUse { role: role.id.clone(), assigned: 3 }));
    if outcome != expected {
        return Err(format!("expected RoleInUse, got {outcome:?}"));
    }
    let after = registry.list_roles().await.map_err(|e| e.to_string())?;
    if before != after {
        return Err("role list must be unchanged after a blocked delete".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn system_roles_refuse_every_mutation() -> TestResult {
    let h = harness().await;
    let registry = RoleRegistry::new(h.roles.clone());

    for role in ["administrator", "supervisor", "employee", "accounting"] {
        let id = RoleId(role.to_string());
        let immutable = CoreError::Validation(ValidationError::SystemRoleImmutable { role: id.clone() });

        let update = registry
            .update_role(&id, RolePatch { description: Some("renamed".to_string()), ..RolePatch::default() })
            .await;
        if update.err() != Some(immutable.clone()) {
            return Err(format!("update of {role} should be refused"));
        }
        if registry.delete_role(&id).await.err() != Some(immutable.clone()) {
            return Err(format!("delete of {role} should be refused"));
        }
        let toggle = registry.toggle_category_permissions(&id, PermissionCategory::Reporting).await;
        if toggle.err() != Some(immutable) {
            return Err(format!("toggle on {role} should be refused"));
        }
    }
    Ok(())
}

#[tokio::test]
async fn category_toggle_on_custom_role_is_all_or_none() -> TestResult {
    let h = harness().await;
    let registry = RoleRegistry::new(h.roles.clone());
    let role = registry
        .create_role(RoleSpec {
            name: "Auditor".to_string(),
            description: String::new(),
            level: 3,
            permissions: vec!["reporting.view".to_string()],
        })
        .await
        .map_err(|e| e.to_string())?;

    let granted = registry
        .toggle_category_permissions(&role.id, PermissionCategory::Reporting)
        .await
        .map_err(|e| e.to_string())?;
    if granted.permissions != PermissionCategory::Reporting.permission_set() {
        return Err(format!("partial category should become fully granted, got {:?}", granted.permissions));
    }

    let cleared = registry
        .toggle_category_permissions(&role.id, PermissionCategory::Reporting)
        .await
        .map_err(|e| e.to_string())?;
    if !cleared.permissions.is_empty() {
        return Err("full category should be cleared".to_string());
    }
    Ok(())
}
