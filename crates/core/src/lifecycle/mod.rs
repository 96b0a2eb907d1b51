//! Expense claim state machine.
//!
//! `pending → approved | rejected`, `approved → paid`. Every operation is a pure function of
//! the current claim, the acting user and a capability snapshot; persistence is the caller's job.
//! State is checked before authorization so a claim in the wrong state reports
//! `InvalidTransition` to every actor.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::authz::CapabilityEngine;
use crate::domain::actor::Actor;
use crate::domain::claim::{
    AttachmentRef, ClaimDraft, ClaimId, ClaimOperation, ClaimPatch, ClaimState, ClaimTransition,
    ExpenseCategory, ExpenseClaim, NewClaim,
};
use crate::errors::{CoreError, StateError, ValidationError};
use crate::money::{validate_amount_input, RawAmountFields, ValidatedAmount};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub claim: ExpenseClaim,
    pub transition: ClaimTransition,
}

#[derive(Clone, Debug, Default)]
pub struct ClaimLifecycle {
    capabilities: CapabilityEngine,
    local_date: Option<NaiveDate>,
}

impl ClaimLifecycle {
    pub fn new(capabilities: CapabilityEngine) -> Self {
        Self { capabilities, local_date: None }
    }

    /// Calendar date of the requester. Claim dates are checked against it instead of the UTC
    /// date of `now`, which lags or leads the requester's day near midnight.
    pub fn on_local_date(mut self, today: NaiveDate) -> Self {
        self.local_date = Some(today);
        self
    }

    fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_date.unwrap_or_else(|| now.date_naive())
    }

    pub fn capabilities(&self) -> &CapabilityEngine {
        &self.capabilities
    }

    pub fn submit(
        &self,
        draft: ClaimDraft,
        author: &Actor,
        now: DateTime<Utc>,
    ) -> Result<NewClaim, CoreError> {
        let category = draft.category.ok_or(ValidationError::MissingCategory)?;
        let fields = validate_fields(
            ClaimFields {
                category,
                description: &draft.description,
                project: &draft.project,
                date: draft.date,
                raw: RawAmountFields {
                    amount: draft.amount,
                    distance: draft.distance,
                    rate_per_unit: draft.rate_per_unit,
                },
                attachments: &draft.attachments,
            },
            self.today(now),
        )?;

        Ok(NewClaim {
            category,
            description: draft.description.trim().to_string(),
            project: draft.project.trim().to_string(),
            date: fields.date,
            amount: fields.amount.amount,
            distance: fields.amount.distance,
            rate_per_unit: fields.amount.rate_per_unit,
            attachment: draft.attachments.into_iter().next(),
            created_by: author.id.clone(),
            assigned_approver: draft.assigned_approver,
            created_at: now,
        })
    }

    pub fn approve(
        &self,
        claim: &ExpenseClaim,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, CoreError> {
        self.step(claim, actor, ClaimOperation::Approve, ClaimState::Approved, None, now)
    }

    pub fn reject(
        &self,
        claim: &ExpenseClaim,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, CoreError> {
        let reason = Some(reason.unwrap_or_default());
        self.step(claim, actor, ClaimOperation::Reject, ClaimState::Rejected, reason, now)
    }

    pub fn mark_paid(
        &self,
        claim: &ExpenseClaim,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, CoreError> {
        self.step(claim, actor, ClaimOperation::MarkPaid, ClaimState::Paid, None, now)
    }

    /// Applies `patch` to a pending claim and re-validates the merged result.
    pub fn edit(
        &self,
        claim: &ExpenseClaim,
        actor: &Actor,
        patch: ClaimPatch,
        now: DateTime<Utc>,
    ) -> Result<ExpenseClaim, CoreError> {
        require_pending(claim, ClaimOperation::Edit)?;
        self.capabilities.authorize(actor, claim, ClaimOperation::Edit)?;

        let category = patch.category.unwrap_or(claim.category);
        let description = patch.description.unwrap_or_else(|| claim.description.clone());
        let project = patch.project.unwrap_or_else(|| claim.project.clone());
        let date = patch.date.unwrap_or(claim.date);
        let attachment = patch.attachment.unwrap_or_else(|| claim.attachment.clone());
        let assigned_approver =
            patch.assigned_approver.unwrap_or_else(|| claim.assigned_approver.clone());
        let raw = RawAmountFields {
            amount: patch.amount.or(Some(claim.amount)),
            distance: patch.distance.or(claim.distance),
            rate_per_unit: patch.rate_per_unit.or(claim.rate_per_unit),
        };
        let attachments: Vec<AttachmentRef> = attachment.iter().cloned().collect();

        let fields = validate_fields(
            ClaimFields {
                category,
                description: &description,
                project: &project,
                date: Some(date),
                raw,
                attachments: &attachments,
            },
            self.today(now),
        )?;

        Ok(ExpenseClaim {
            id: claim.id.clone(),
            category,
            description: description.trim().to_string(),
            project: project.trim().to_string(),
            date: fields.date,
            amount: fields.amount.amount,
            distance: fields.amount.distance,
            rate_per_unit: fields.amount.rate_per_unit,
            attachment,
            state: claim.state,
            created_by: claim.created_by.clone(),
            assigned_approver,
            rejection_reason: None,
            created_at: claim.created_at,
            updated_at: now,
        })
    }

    /// Returns the id to hard-delete once the guards pass.
    pub fn delete(&self, claim: &ExpenseClaim, actor: &Actor) -> Result<ClaimId, CoreError> {
        require_pending(claim, ClaimOperation::Delete)?;
        self.capabilities.authorize(actor, claim, ClaimOperation::Delete)?;
        Ok(claim.id.clone())
    }

    fn step(
        &self,
        claim: &ExpenseClaim,
        actor: &Actor,
        operation: ClaimOperation,
        to: ClaimState,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, CoreError> {
        if !claim.state.can_transition_to(to) {
            return Err(StateError::InvalidTransition { from: claim.state, operation }.into());
        }
        self.capabilities.authorize(actor, claim, operation)?;

        let mut next = claim.clone();
        next.state = to;
        next.updated_at = now;
        if to == ClaimState::Rejected {
            next.rejection_reason = reason.clone();
        }

        let transition = ClaimTransition {
            claim_id: claim.id.clone(),
            from: claim.state,
            to,
            operation,
            actor: actor.id.clone(),
            reason,
            occurred_at: now,
        };
        Ok(TransitionOutcome { claim: next, transition })
    }
}

fn require_pending(claim: &ExpenseClaim, operation: ClaimOperation) -> Result<(), StateError> {
    if claim.state == ClaimState::Pending {
        return Ok(());
    }
    Err(StateError::InvalidTransition { from: claim.state, operation })
}

struct ClaimFields<'a> {
    category: ExpenseCategory,
    description: &'a str,
    project: &'a str,
    date: Option<NaiveDate>,
    raw: RawAmountFields,
    attachments: &'a [AttachmentRef],
}

struct ValidatedFields {
    date: NaiveDate,
    amount: ValidatedAmount,
}

fn validate_fields(
    fields: ClaimFields<'_>,
    today: NaiveDate,
) -> Result<ValidatedFields, ValidationError> {
    if fields.attachments.len() > 1 {
        return Err(ValidationError::TooManyAttachments { count: fields.attachments.len() });
    }
    if fields.category.requires_attachment() && fields.attachments.is_empty() {
        return Err(ValidationError::MissingRequiredAttachment { category: fields.category });
    }

    let amount = validate_amount_input(fields.category, &fields.raw)?;

    if fields.description.trim().is_empty() {
        return Err(ValidationError::MissingDescription);
    }
    if fields.project.trim().is_empty() {
        return Err(ValidationError::MissingProject);
    }
    let date = fields.date.ok_or(ValidationError::MissingDate)?;
    if date > today {
        return Err(ValidationError::FutureDate { date, today });
    }

    Ok(ValidatedFields { date, amount })
}
