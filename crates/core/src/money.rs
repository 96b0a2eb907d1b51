//! Amount derivation and numeric input validation for expense claims.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::claim::ExpenseCategory;
use crate::errors::ValidationError;

pub const CURRENCY_SCALE: u32 = 2;

/// Result of deriving a fuel amount. Incomplete or negative input is not an error:
/// the form keeps rendering and shows `0.00` until the inputs are usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum FuelAmount {
    Computed(Decimal),
    NotComputable,
}

impl FuelAmount {
    pub fn value(self) -> Option<Decimal> {
        match self {
            Self::Computed(amount) => Some(amount),
            Self::NotComputable => None,
        }
    }

    /// Amount to display: the computed value or `0.00`.
    pub fn display_amount(self) -> Decimal {
        self.value().unwrap_or_else(|| Decimal::new(0, CURRENCY_SCALE))
    }
}

/// Rounds half-up (midpoint away from zero) to cents.
pub fn round_currency(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}

pub fn compute_fuel_amount(distance: Option<Decimal>, rate_per_unit: Option<Decimal>) -> FuelAmount {
    match (distance, rate_per_unit) {
        (Some(distance), Some(rate))
            if !distance.is_sign_negative() && !rate.is_sign_negative() =>
        {
            match distance.checked_mul(rate) {
                Some(product) => FuelAmount::Computed(round_currency(product)),
                None => FuelAmount::NotComputable,
            }
        }
        _ => FuelAmount::NotComputable,
    }
}

/// Parses raw form text. Accepts a comma as decimal separator; anything non-numeric is `None`.
pub fn parse_decimal_input(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replace(',', ".")
    } else {
        trimmed.replace(',', "")
    };
    Decimal::from_str(&normalized).ok()
}

/// Numeric fields as entered on the claim form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAmountFields {
    pub amount: Option<Decimal>,
    pub distance: Option<Decimal>,
    pub rate_per_unit: Option<Decimal>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedAmount {
    pub amount: Decimal,
    pub distance: Option<Decimal>,
    pub rate_per_unit: Option<Decimal>,
}

pub fn validate_amount_input(
    category: ExpenseCategory,
    raw: &RawAmountFields,
) -> Result<ValidatedAmount, ValidationError> {
    if category.is_fuel() {
        let distance = raw.distance.filter(is_positive).ok_or(ValidationError::MissingFuelFields)?;
        let rate =
            raw.rate_per_unit.filter(is_positive).ok_or(ValidationError::MissingFuelFields)?;
        let amount = compute_fuel_amount(Some(distance), Some(rate))
            .value()
            .ok_or(ValidationError::MissingFuelFields)?;
        return Ok(ValidatedAmount { amount, distance: Some(distance), rate_per_unit: Some(rate) });
    }

    // A sub-cent entry rounds to 0.00 and counts as missing.
    let amount = raw
        .amount
        .map(round_currency)
        .filter(is_positive)
        .ok_or(ValidationError::MissingAmount)?;
    Ok(ValidatedAmount { amount, distance: None, rate_per_unit: None })
}

fn is_positive(value: &Decimal) -> bool {
    *value > Decimal::ZERO
}
