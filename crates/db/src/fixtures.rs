use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use claimdesk_core::domain::actor::{Actor, ActorRecord, ActorRole};
use claimdesk_core::domain::claim::{AttachmentRef, ClaimState, ExpenseCategory};
use claimdesk_core::money::{compute_fuel_amount, FuelAmount};
use claimdesk_core::permissions::system_roles;
use claimdesk_core::store::{ActorDirectory, RoleStore, StoreError};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlActorRepository, SqlRoleRepository};

struct SeedActor {
    id: &'static str,
    role: ActorRole,
    display_name: &'static str,
    email: &'static str,
    supervises: &'static [&'static str],
}

struct SeedClaim {
    id: &'static str,
    category: ExpenseCategory,
    description: &'static str,
    project: &'static str,
    date: (i32, u32, u32),
    /// Cents; ignored for fuel, which is derived from distance and rate.
    amount_cents: i64,
    fuel: Option<(i64, i64)>,
    state: ClaimState,
    created_by: &'static str,
    assigned_approver: Option<&'static str>,
    rejection_reason: Option<&'static str>,
    receipt: Option<&'static str>,
}

const SEED_ACTORS: &[SeedActor] = &[
    SeedActor {
        id: "admin-1",
        role: ActorRole::Administrator,
        display_name: "Ana Admin",
        email: "ana.admin@example.com",
        supervises: &[],
    },
    SeedActor {
        id: "sup-1",
        role: ActorRole::Supervisor,
        display_name: "Sergio Supervisor",
        email: "sergio.supervisor@example.com",
        supervises: &["emp-1", "emp-2"],
    },
    SeedActor {
        id: "emp-1",
        role: ActorRole::Employee,
        display_name: "Elena Employee",
        email: "elena.employee@example.com",
        supervises: &[],
    },
    SeedActor {
        id: "emp-2",
        role: ActorRole::Employee,
        display_name: "Emilio Employee",
        email: "emilio.employee@example.com",
        supervises: &[],
    },
    SeedActor {
        id: "acct-1",
        role: ActorRole::Accounting,
        display_name: "Carla Contadora",
        email: "carla.accounting@example.com",
        supervises: &[],
    },
];

const SEED_CLAIMS: &[SeedClaim] = &[
    SeedClaim {
        id: "GST-DEMO-001",
        category: ExpenseCategory::Fuel,
        description: "Site visit to the northern warehouse",
        project: "LOGISTICS-7",
        date: (2026, 9, 2),
        amount_cents: 0,
        fuel: Some((120_000, 502)),
        state: ClaimState::Pending,
        created_by: "emp-1",
        assigned_approver: Some("sup-1"),
        rejection_reason: None,
        receipt: None,
    },
    SeedClaim {
        id: "GST-DEMO-002",
        category: ExpenseCategory::Meal,
        description: "Lunch with supplier",
        project: "SOURCING-3",
        date: (2026, 9, 4),
        amount_cents: 4_550,
        fuel: None,
        state: ClaimState::Approved,
        created_by: "emp-2",
        assigned_approver: Some("sup-1"),
        rejection_reason: None,
        receipt: Some("lunch-receipt.jpg"),
    },
    SeedClaim {
        id: "GST-DEMO-003",
        category: ExpenseCategory::Parking,
        description: "Airport parking",
        project: "LOGISTICS-7",
        date: (2026, 8, 28),
        amount_cents: 2_200,
        fuel: None,
        state: ClaimState::Rejected,
        created_by: "emp-1",
        assigned_approver: Some("sup-1"),
        rejection_reason: Some("Ticket does not match the travel dates"),
        receipt: Some("parking-ticket.png"),
    },
    SeedClaim {
        id: "GST-DEMO-004",
        category: ExpenseCategory::Other,
        description: "Conference badge",
        project: "MARKETING-1",
        date: (2026, 8, 15),
        amount_cents: 12_000,
        fuel: None,
        state: ClaimState::Paid,
        created_by: "emp-2",
        assigned_approver: None,
        rejection_reason: None,
        receipt: None,
    },
];

/// Demo dataset: the system roles, a five-person team and one claim in every state.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Loads the dataset. Existing rows with the same ids are refreshed, so the call is
    /// safe to repeat.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let now = Utc::now();
        let roles = SqlRoleRepository::new(pool.clone());
        let actors = SqlActorRepository::new(pool.clone());

        let mut roles_seeded = Vec::new();
        for role in system_roles(now) {
            let exists = roles.find_role(&role.id).await.map_err(store_err)?.is_some();
            let id = role.id.0.clone();
            if exists {
                roles.update_role(role).await.map_err(store_err)?;
            } else {
                roles.insert_role(role).await.map_err(store_err)?;
            }
            roles_seeded.push(id);
        }

        for seed in SEED_ACTORS {
            actors
                .save_actor(ActorRecord {
                    actor: Actor::new(seed.id, seed.role).supervising(seed.supervises.iter().copied()),
                    display_name: seed.display_name.to_string(),
                    email: seed.email.to_string(),
                    active: true,
                })
                .await
                .map_err(store_err)?;
        }

        let mut tx = pool.begin().await?;
        for seed in SEED_CLAIMS {
            let (amount, distance, rate) = seed_amounts(seed)?;
            let attachment = seed
                .receipt
                .map(|file_name| {
                    serde_json::to_string(&AttachmentRef {
                        file_name: file_name.to_string(),
                        content_type: content_type_for(file_name).to_string(),
                        size_bytes: 48_213,
                        uri: format!("demo://receipts/{file_name}"),
                    })
                })
                .transpose()
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
            let created_at = seed_timestamp(seed)?;

            sqlx::query(
                "INSERT INTO expense_claim (id, category, description, project, claim_date,
                                            amount, distance, rate_per_unit, attachment_json,
                                            state, created_by, assigned_approver,
                                            rejection_reason, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     amount = excluded.amount,
                     state = excluded.state,
                     rejection_reason = excluded.rejection_reason,
                     updated_at = excluded.updated_at",
            )
            .bind(seed.id)
            .bind(seed.category.as_str())
            .bind(seed.description)
            .bind(seed.project)
            .bind(seed_date(seed)?.format("%Y-%m-%d").to_string())
            .bind(amount.to_string())
            .bind(distance.map(|value| value.to_string()))
            .bind(rate.map(|value| value.to_string()))
            .bind(attachment)
            .bind(seed.state.as_str())
            .bind(seed.created_by)
            .bind(seed.assigned_approver)
            .bind(seed.rejection_reason)
            .bind(created_at.to_rfc3339())
            .bind(created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(SeedResult {
            roles_seeded,
            actors_seeded: SEED_ACTORS.iter().map(|seed| seed.id.to_string()).collect(),
            claims_seeded: SEED_CLAIMS.iter().map(|seed| seed.id.to_string()).collect(),
        })
    }

    /// Checks the dataset is present and consistent.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let system_role_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM role WHERE is_system_role = 1")
                .fetch_one(pool)
                .await?;
        checks.push(VerificationCheck::new("system-roles", system_role_count == 4));

        for seed in SEED_ACTORS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM actor WHERE id = ?1 AND role = ?2 AND active = 1)",
            )
            .bind(seed.id)
            .bind(seed.role.as_str())
            .fetch_one(pool)
            .await?;
            checks.push(VerificationCheck::new(format!("actor {}", seed.id), exists == 1));
        }

        let supervised: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM actor_supervision WHERE supervisor_id = 'sup-1'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(VerificationCheck::new("supervision sup-1", supervised == 2));

        for seed in SEED_CLAIMS {
            let (amount, _, _) = seed_amounts(seed)?;
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM expense_claim WHERE id = ?1 AND state = ?2 AND amount = ?3)",
            )
            .bind(seed.id)
            .bind(seed.state.as_str())
            .bind(amount.to_string())
            .fetch_one(pool)
            .await?;
            checks.push(VerificationCheck::new(format!("claim {}", seed.id), exists == 1));
        }

        let all_present = checks.iter().all(|check| check.passed);
        Ok(VerificationResult { all_present, checks })
    }
}

fn store_err(error: StoreError) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn seed_date(seed: &SeedClaim) -> Result<NaiveDate, RepositoryError> {
    let (year, month, day) = seed.date;
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid seed date for {}", seed.id)))
}

fn seed_timestamp(seed: &SeedClaim) -> Result<DateTime<Utc>, RepositoryError> {
    seed_date(seed)?
        .and_hms_opt(9, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RepositoryError::Decode(format!("invalid seed timestamp for {}", seed.id)))
}

/// Fuel distance is stored in thousandths and the rate in thousandths per unit.
fn seed_amounts(
    seed: &SeedClaim,
) -> Result<(Decimal, Option<Decimal>, Option<Decimal>), RepositoryError> {
    match seed.fuel {
        Some((distance_milli, rate_milli)) => {
            let distance = Decimal::new(distance_milli, 3);
            let rate = Decimal::new(rate_milli, 3);
            match compute_fuel_amount(Some(distance), Some(rate)) {
                FuelAmount::Computed(amount) => Ok((amount, Some(distance), Some(rate))),
                FuelAmount::NotComputable => Err(RepositoryError::Decode(format!(
                    "fuel seed {} has no computable amount",
                    seed.id
                ))),
            }
        }
        None => Ok((Decimal::new(seed.amount_cents, 2), None, None)),
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub roles_seeded: Vec<String>,
    pub actors_seeded: Vec<String>,
    pub claims_seeded: Vec<String>,
}

#[derive(Debug)]
pub struct VerificationCheck {
    pub name: String,
    pub passed: bool,
}

impl VerificationCheck {
    fn new(name: impl Into<String>, passed: bool) -> Self {
        Self { name: name.into(), passed }
    }
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<VerificationCheck>,
}

impl VerificationResult {
    pub fn failed_checks(&self) -> Vec<&str> {
        self.checks.iter().filter(|check| !check.passed).map(|check| check.name.as_str()).collect()
    }
}
