//! JSON shapes exchanged with the claims collaborator.
//!
//! Categories, states and roles travel as free strings because older deployments still emit
//! the Spanish spellings; they are normalized through the domain `FromStr` impls on decode.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use claimdesk_core::domain::actor::{Actor, ActorId, ActorRecord, ActorRole};
use claimdesk_core::domain::claim::{
    AttachmentRef, ClaimId, ClaimState, ExpenseCategory, ExpenseClaim, NewClaim,
};
use claimdesk_core::domain::role::RoleId;
use claimdesk_core::money::round_currency;
use claimdesk_core::store::StoreError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDto {
    pub file_name: String,
    pub content_type: String,
    #[serde(default)]
    pub size_bytes: u64,
    pub uri: String,
}

impl From<&AttachmentRef> for AttachmentDto {
    fn from(value: &AttachmentRef) -> Self {
        Self {
            file_name: value.file_name.clone(),
            content_type: value.content_type.clone(),
            size_bytes: value.size_bytes,
            uri: value.uri.clone(),
        }
    }
}

impl From<AttachmentDto> for AttachmentRef {
    fn from(value: AttachmentDto) -> Self {
        Self {
            file_name: value.file_name,
            content_type: value.content_type,
            size_bytes: value.size_bytes,
            uri: value.uri,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimDto {
    pub id: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project: String,
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub distance: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub rate_per_unit: Option<Decimal>,
    #[serde(default)]
    pub attachment: Option<AttachmentDto>,
    pub state: String,
    pub created_by: String,
    #[serde(default)]
    pub assigned_approver: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClaimDto {
    pub fn into_domain(self) -> Result<ExpenseClaim, StoreError> {
        let category = self.category.parse::<ExpenseCategory>().map_err(payload_error)?;
        let state = self.state.parse::<ClaimState>().map_err(payload_error)?;
        Ok(ExpenseClaim {
            id: ClaimId(self.id),
            category,
            description: self.description,
            project: self.project,
            date: self.date,
            amount: round_currency(self.amount),
            distance: self.distance,
            rate_per_unit: self.rate_per_unit,
            attachment: self.attachment.map(AttachmentRef::from),
            state,
            created_by: ActorId(self.created_by),
            assigned_approver: self.assigned_approver.map(ActorId),
            rejection_reason: self.rejection_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Body of `POST /gastos`. The amount is advisory for fuel claims; the collaborator
/// recomputes it from distance and rate.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClaimDto {
    pub category: &'static str,
    pub description: String,
    pub project: String,
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub distance: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub rate_per_unit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentDto>,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_approver: Option<String>,
}

impl From<&NewClaim> for NewClaimDto {
    fn from(claim: &NewClaim) -> Self {
        Self {
            category: claim.category.as_str(),
            description: claim.description.clone(),
            project: claim.project.clone(),
            date: claim.date,
            amount: claim.amount,
            distance: claim.distance,
            rate_per_unit: claim.rate_per_unit,
            attachment: claim.attachment.as_ref().map(AttachmentDto::from),
            created_by: claim.created_by.0.clone(),
            assigned_approver: claim.assigned_approver.as_ref().map(|id| id.0.clone()),
        }
    }
}

/// Body of `PUT /gastos/{id}`. Cleared optionals are sent as explicit nulls.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClaimDto {
    pub category: &'static str,
    pub description: String,
    pub project: String,
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub distance: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub rate_per_unit: Option<Decimal>,
    pub attachment: Option<AttachmentDto>,
    pub assigned_approver: Option<String>,
}

impl From<&ExpenseClaim> for UpdateClaimDto {
    fn from(claim: &ExpenseClaim) -> Self {
        Self {
            category: claim.category.as_str(),
            description: claim.description.clone(),
            project: claim.project.clone(),
            date: claim.date,
            amount: claim.amount,
            distance: claim.distance,
            rate_per_unit: claim.rate_per_unit,
            attachment: claim.attachment.as_ref().map(AttachmentDto::from),
            assigned_approver: claim.assigned_approver.as_ref().map(|id| id.0.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectDto {
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorDto {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub role_id: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub supervisor_of: Vec<String>,
}

fn default_active() -> bool {
    true
}

impl ActorDto {
    pub fn into_domain(self) -> Result<ActorRecord, StoreError> {
        let role = self.role.parse::<ActorRole>().map_err(payload_error)?;
        let mut actor = Actor::new(self.id, role).supervising(self.supervisor_of);
        actor.role_id = self.role_id.filter(|id| !id.trim().is_empty()).map(RoleId);
        Ok(ActorRecord {
            actor,
            display_name: self.display_name,
            email: self.email,
            active: self.active,
        })
    }
}

impl From<&ActorRecord> for ActorDto {
    fn from(record: &ActorRecord) -> Self {
        Self {
            id: record.actor.id.0.clone(),
            display_name: record.display_name.clone(),
            email: record.email.clone(),
            role: record.actor.role.as_str().to_string(),
            role_id: record.actor.role_id.as_ref().map(|id| id.0.clone()),
            active: record.active,
            supervisor_of: record.actor.supervisor_of.iter().map(|id| id.0.clone()).collect(),
        }
    }
}

fn payload_error(error: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("unexpected response payload: {error}"))
}
