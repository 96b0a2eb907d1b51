use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use claimdesk_core::store::StoreError;

pub mod actor;
pub mod claim;
pub mod memory;
pub mod role;

pub use actor::SqlActorRepository;
pub use claim::SqlClaimRepository;
pub use memory::{InMemoryActorDirectory, InMemoryClaimStore, InMemoryRoleStore};
pub use role::SqlRoleRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::Backend(error.to_string())
    }
}

fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn parse_date(column: &str, raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    raw.parse::<Decimal>().map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    raw: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    raw.map(|value| parse_decimal(column, &value)).transpose()
}
