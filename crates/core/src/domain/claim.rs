use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorId;
use crate::errors::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Meal,
    Parking,
    Fuel,
    Other,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 4] = [Self::Meal, Self::Parking, Self::Fuel, Self::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meal => "meal",
            Self::Parking => "parking",
            Self::Fuel => "fuel",
            Self::Other => "other",
        }
    }

    /// Meal and parking receipts are mandatory.
    pub fn requires_attachment(self) -> bool {
        matches!(self, Self::Meal | Self::Parking)
    }

    pub fn is_fuel(self) -> bool {
        matches!(self, Self::Fuel)
    }
}

impl FromStr for ExpenseCategory {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "meal" | "comida" | "alimentacion" | "alimentación" => Ok(Self::Meal),
            "parking" | "estacionamiento" | "parqueo" => Ok(Self::Parking),
            "fuel" | "combustible" | "gasolina" => Ok(Self::Fuel),
            "other" | "otro" | "otros" => Ok(Self::Other),
            _ => Err(ValidationError::UnknownCategory { value: value.to_string() }),
        }
    }
}

impl fmt::Display for ExpenseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl ClaimState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Paid => "paid",
        }
    }

    pub fn can_transition_to(self, next: ClaimState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Approved, Self::Paid)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Paid)
    }
}

impl FromStr for ClaimState {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" | "pendiente" => Ok(Self::Pending),
            "approved" | "aprobado" => Ok(Self::Approved),
            "rejected" | "rechazado" => Ok(Self::Rejected),
            "paid" | "pagado" => Ok(Self::Paid),
            _ => Err(ValidationError::UnknownState { value: value.to_string() }),
        }
    }
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations an actor can request against a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOperation {
    Create,
    View,
    Edit,
    Delete,
    Approve,
    Reject,
    MarkPaid,
}

impl ClaimOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::View => "view",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::MarkPaid => "mark_paid",
        }
    }
}

impl fmt::Display for ClaimOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an uploaded receipt. The payload itself lives with the collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub uri: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseClaim {
    pub id: ClaimId,
    pub category: ExpenseCategory,
    pub description: String,
    pub project: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub distance: Option<Decimal>,
    pub rate_per_unit: Option<Decimal>,
    pub attachment: Option<AttachmentRef>,
    pub state: ClaimState,
    pub created_by: ActorId,
    pub assigned_approver: Option<ActorId>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExpenseClaim {
    pub fn is_authored_by(&self, actor_id: &ActorId) -> bool {
        &self.created_by == actor_id
    }
}

/// Raw form input for a new claim, before validation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimDraft {
    pub category: Option<ExpenseCategory>,
    pub description: String,
    pub project: String,
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub distance: Option<Decimal>,
    pub rate_per_unit: Option<Decimal>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    pub assigned_approver: Option<ActorId>,
}

/// A validated claim that has not been assigned an id by the store yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewClaim {
    pub category: ExpenseCategory,
    pub description: String,
    pub project: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub distance: Option<Decimal>,
    pub rate_per_unit: Option<Decimal>,
    pub attachment: Option<AttachmentRef>,
    pub created_by: ActorId,
    pub assigned_approver: Option<ActorId>,
    pub created_at: DateTime<Utc>,
}

impl NewClaim {
    pub fn into_claim(self, id: ClaimId) -> ExpenseClaim {
        ExpenseClaim {
            id,
            category: self.category,
            description: self.description,
            project: self.project,
            date: self.date,
            amount: self.amount,
            distance: self.distance,
            rate_per_unit: self.rate_per_unit,
            attachment: self.attachment,
            state: ClaimState::Pending,
            created_by: self.created_by,
            assigned_approver: self.assigned_approver,
            rejection_reason: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Partial update of a pending claim. `None` leaves the field untouched; the nested
/// options on `attachment` and `assigned_approver` distinguish "clear" from "keep".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimPatch {
    pub category: Option<ExpenseCategory>,
    pub description: Option<String>,
    pub project: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub distance: Option<Decimal>,
    pub rate_per_unit: Option<Decimal>,
    pub attachment: Option<Option<AttachmentRef>>,
    pub assigned_approver: Option<Option<ActorId>>,
}

impl ClaimPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// History record of one lifecycle step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTransition {
    pub claim_id: ClaimId,
    pub from: ClaimState,
    pub to: ClaimState,
    pub operation: ClaimOperation,
    pub actor: ActorId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
