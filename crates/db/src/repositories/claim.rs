use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use claimdesk_core::domain::actor::ActorId;
use claimdesk_core::domain::claim::{
    AttachmentRef, ClaimId, ClaimOperation, ClaimState, ClaimTransition, ExpenseClaim, NewClaim,
};
use claimdesk_core::store::{ClaimStore, StoreError};

use super::{
    decode_err, parse_date, parse_decimal, parse_optional_decimal, parse_timestamp,
    RepositoryError,
};
use crate::DbPool;

const CLAIM_COLUMNS: &str = "id, category, description, project, claim_date, amount, distance,
     rate_per_unit, attachment_json, state, created_by, assigned_approver, rejection_reason,
     created_at, updated_at";

pub struct SqlClaimRepository {
    pool: DbPool,
}

impl SqlClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Lifecycle history of one claim, oldest first.
    pub async fn list_transitions(
        &self,
        claim_id: &ClaimId,
    ) -> Result<Vec<ClaimTransition>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT claim_id, from_state, to_state, operation, actor_id, reason, occurred_at
             FROM claim_transition WHERE claim_id = ? ORDER BY id ASC",
        )
        .bind(&claim_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transition).collect()
    }

    async fn fetch(&self, id: &ClaimId) -> Result<Option<ExpenseClaim>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {CLAIM_COLUMNS} FROM expense_claim WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_claim).transpose()
    }

    async fn fetch_existing(&self, id: &ClaimId) -> Result<ExpenseClaim, StoreError> {
        self.fetch(id).await?.ok_or_else(|| StoreError::not_found("claim", id.0.clone()))
    }
}

fn parse_operation(raw: &str) -> Result<ClaimOperation, RepositoryError> {
    match raw {
        "create" => Ok(ClaimOperation::Create),
        "view" => Ok(ClaimOperation::View),
        "edit" => Ok(ClaimOperation::Edit),
        "delete" => Ok(ClaimOperation::Delete),
        "approve" => Ok(ClaimOperation::Approve),
        "reject" => Ok(ClaimOperation::Reject),
        "mark_paid" => Ok(ClaimOperation::MarkPaid),
        other => Err(RepositoryError::Decode(format!("unknown claim operation `{other}`"))),
    }
}

fn row_to_claim(row: &SqliteRow) -> Result<ExpenseClaim, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let category: String = row.try_get("category").map_err(decode_err)?;
    let description: String = row.try_get("description").map_err(decode_err)?;
    let project: String = row.try_get("project").map_err(decode_err)?;
    let claim_date: String = row.try_get("claim_date").map_err(decode_err)?;
    let amount: String = row.try_get("amount").map_err(decode_err)?;
    let distance: Option<String> = row.try_get("distance").map_err(decode_err)?;
    let rate_per_unit: Option<String> = row.try_get("rate_per_unit").map_err(decode_err)?;
    let attachment_json: Option<String> = row.try_get("attachment_json").map_err(decode_err)?;
    let state: String = row.try_get("state").map_err(decode_err)?;
    let created_by: String = row.try_get("created_by").map_err(decode_err)?;
    let assigned_approver: Option<String> =
        row.try_get("assigned_approver").map_err(decode_err)?;
    let rejection_reason: Option<String> = row.try_get("rejection_reason").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    let attachment = attachment_json
        .map(|raw| serde_json::from_str::<AttachmentRef>(&raw))
        .transpose()
        .map_err(decode_err)?;

    Ok(ExpenseClaim {
        id: ClaimId(id),
        category: category.parse().map_err(decode_err)?,
        description,
        project,
        date: parse_date("claim_date", &claim_date)?,
        amount: parse_decimal("amount", &amount)?,
        distance: parse_optional_decimal("distance", distance)?,
        rate_per_unit: parse_optional_decimal("rate_per_unit", rate_per_unit)?,
        attachment,
        state: state.parse().map_err(decode_err)?,
        created_by: ActorId(created_by),
        assigned_approver: assigned_approver.map(ActorId),
        rejection_reason,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn row_to_transition(row: &SqliteRow) -> Result<ClaimTransition, RepositoryError> {
    let claim_id: String = row.try_get("claim_id").map_err(decode_err)?;
    let from_state: String = row.try_get("from_state").map_err(decode_err)?;
    let to_state: String = row.try_get("to_state").map_err(decode_err)?;
    let operation: String = row.try_get("operation").map_err(decode_err)?;
    let actor_id: String = row.try_get("actor_id").map_err(decode_err)?;
    let reason: Option<String> = row.try_get("reason").map_err(decode_err)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode_err)?;

    Ok(ClaimTransition {
        claim_id: ClaimId(claim_id),
        from: from_state.parse::<ClaimState>().map_err(decode_err)?,
        to: to_state.parse::<ClaimState>().map_err(decode_err)?,
        operation: parse_operation(&operation)?,
        actor: ActorId(actor_id),
        reason,
        occurred_at: parse_timestamp("occurred_at", &occurred_at)?,
    })
}

fn attachment_json(attachment: Option<&AttachmentRef>) -> Result<Option<String>, RepositoryError> {
    attachment.map(serde_json::to_string).transpose().map_err(decode_err)
}

#[async_trait::async_trait]
impl ClaimStore for SqlClaimRepository {
    async fn list_claims(&self) -> Result<Vec<ExpenseClaim>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CLAIM_COLUMNS} FROM expense_claim ORDER BY claim_date DESC, created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(row_to_claim).collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_claim(&self, id: &ClaimId) -> Result<Option<ExpenseClaim>, StoreError> {
        Ok(self.fetch(id).await?)
    }

    async fn create_claim(&self, claim: NewClaim) -> Result<ExpenseClaim, StoreError> {
        let id = ClaimId(format!("GST-{}", uuid::Uuid::new_v4().simple()));
        let claim = claim.into_claim(id);
        let attachment = attachment_json(claim.attachment.as_ref())?;

        sqlx::query(
            "INSERT INTO expense_claim (id, category, description, project, claim_date, amount,
                                        distance, rate_per_unit, attachment_json, state,
                                        created_by, assigned_approver, rejection_reason,
                                        created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&claim.id.0)
        .bind(claim.category.as_str())
        .bind(&claim.description)
        .bind(&claim.project)
        .bind(claim.date.format("%Y-%m-%d").to_string())
        .bind(claim.amount.to_string())
        .bind(claim.distance.map(|value| value.to_string()))
        .bind(claim.rate_per_unit.map(|value| value.to_string()))
        .bind(attachment)
        .bind(claim.state.as_str())
        .bind(&claim.created_by.0)
        .bind(claim.assigned_approver.as_ref().map(|actor| actor.0.clone()))
        .bind(&claim.rejection_reason)
        .bind(claim.created_at.to_rfc3339())
        .bind(claim.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        debug!(event_name = "db.claim_created", claim_id = %claim.id, "claim row inserted");
        Ok(claim)
    }

    async fn update_claim(&self, claim: &ExpenseClaim) -> Result<ExpenseClaim, StoreError> {
        let attachment = attachment_json(claim.attachment.as_ref())?;
        let result = sqlx::query(
            "UPDATE expense_claim SET
                 category = ?, description = ?, project = ?, claim_date = ?, amount = ?,
                 distance = ?, rate_per_unit = ?, attachment_json = ?, assigned_approver = ?,
                 updated_at = ?
             WHERE id = ? AND state = 'pending'",
        )
        .bind(claim.category.as_str())
        .bind(&claim.description)
        .bind(&claim.project)
        .bind(claim.date.format("%Y-%m-%d").to_string())
        .bind(claim.amount.to_string())
        .bind(claim.distance.map(|value| value.to_string()))
        .bind(claim.rate_per_unit.map(|value| value.to_string()))
        .bind(attachment)
        .bind(claim.assigned_approver.as_ref().map(|actor| actor.0.clone()))
        .bind(claim.updated_at.to_rfc3339())
        .bind(&claim.id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            let current = self.fetch_existing(&claim.id).await?;
            return Err(StoreError::StaleState {
                claim: current.id,
                current: current.state,
                operation: ClaimOperation::Edit,
            });
        }

        self.fetch_existing(&claim.id).await
    }

    async fn apply_transition(
        &self,
        claim: &ExpenseClaim,
        transition: &ClaimTransition,
    ) -> Result<ExpenseClaim, StoreError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let result = sqlx::query(
            "UPDATE expense_claim SET state = ?, rejection_reason = ?, amount = ?, updated_at = ?
             WHERE id = ? AND state = ?",
        )
        .bind(transition.to.as_str())
        .bind(&claim.rejection_reason)
        .bind(claim.amount.to_string())
        .bind(claim.updated_at.to_rfc3339())
        .bind(&claim.id.0)
        .bind(transition.from.as_str())
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(RepositoryError::from)?;
            let current = self.fetch_existing(&claim.id).await?;
            return Err(StoreError::StaleState {
                claim: current.id,
                current: current.state,
                operation: transition.operation,
            });
        }

        sqlx::query(
            "INSERT INTO claim_transition (claim_id, from_state, to_state, operation, actor_id,
                                           reason, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transition.claim_id.0)
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(transition.operation.as_str())
        .bind(&transition.actor.0)
        .bind(&transition.reason)
        .bind(transition.occurred_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        tx.commit().await.map_err(RepositoryError::from)?;
        debug!(
            event_name = "db.claim_transition_recorded",
            claim_id = %claim.id,
            to = transition.to.as_str(),
            "claim transition persisted"
        );

        self.fetch_existing(&claim.id).await
    }

    async fn delete_claim(&self, id: &ClaimId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM expense_claim WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("claim", id.0.clone()));
        }
        debug!(event_name = "db.claim_deleted", claim_id = %id, "claim row removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use claimdesk_core::domain::actor::ActorId;
    use claimdesk_core::domain::claim::{
        AttachmentRef, ClaimOperation, ClaimState, ClaimTransition, ExpenseCategory, NewClaim,
    };
    use claimdesk_core::store::{ClaimStore, StoreError};

    use super::SqlClaimRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlClaimRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlClaimRepository::new(pool)
    }

    fn meal_claim() -> NewClaim {
        NewClaim {
            category: ExpenseCategory::Meal,
            description: "Client lunch".to_string(),
            project: "ACME-42".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 14).expect("date"),
            amount: Decimal::new(4550, 2),
            distance: None,
            rate_per_unit: None,
            attachment: Some(AttachmentRef {
                file_name: "receipt.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                size_bytes: 2048,
                uri: "files/receipt.pdf".to_string(),
            }),
            created_by: ActorId("emp-1".to_string()),
            assigned_approver: Some(ActorId("sup-1".to_string())),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn created_claims_are_pending_and_readable() {
        let repo = setup().await;
        let created = repo.create_claim(meal_claim()).await.expect("create");

        assert!(created.id.0.starts_with("GST-"));
        assert_eq!(created.state, ClaimState::Pending);

        let found = repo.find_claim(&created.id).await.expect("find").expect("present");
        assert_eq!(found.amount, Decimal::new(4550, 2));
        assert_eq!(found.attachment.as_ref().map(|a| a.file_name.as_str()), Some("receipt.pdf"));
        assert_eq!(repo.list_claims().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn transitions_update_state_and_append_history() {
        let repo = setup().await;
        let mut claim = repo.create_claim(meal_claim()).await.expect("create");

        claim.state = ClaimState::Rejected;
        claim.rejection_reason = Some("duplicate receipt".to_string());
        claim.updated_at = Utc::now();
        let transition = ClaimTransition {
            claim_id: claim.id.clone(),
            from: ClaimState::Pending,
            to: ClaimState::Rejected,
            operation: ClaimOperation::Reject,
            actor: ActorId("sup-1".to_string()),
            reason: claim.rejection_reason.clone(),
            occurred_at: claim.updated_at,
        };

        let stored = repo.apply_transition(&claim, &transition).await.expect("transition");
        assert_eq!(stored.state, ClaimState::Rejected);
        assert_eq!(stored.rejection_reason.as_deref(), Some("duplicate receipt"));

        let history = repo.list_transitions(&claim.id).await.expect("history");
        assert_eq!(history, vec![transition.clone()]);

        let replay = repo.apply_transition(&claim, &transition).await;
        assert!(
            matches!(
                replay,
                Err(StoreError::StaleState {
                    current: ClaimState::Rejected,
                    operation: ClaimOperation::Reject,
                    ..
                })
            ),
            "stale `from` state must not apply"
        );
    }

    #[tokio::test]
    async fn edits_are_refused_once_a_claim_left_pending() {
        let repo = setup().await;
        let mut claim = repo.create_claim(meal_claim()).await.expect("create");
        claim.description = "Team lunch".to_string();
        let edited = repo.update_claim(&claim).await.expect("edit pending");
        assert_eq!(edited.description, "Team lunch");

        sqlx::query("UPDATE expense_claim SET state = 'approved' WHERE id = ?")
            .bind(&claim.id.0)
            .execute(&repo.pool)
            .await
            .expect("force approve");

        claim.description = "Late edit".to_string();
        assert!(matches!(
            repo.update_claim(&claim).await,
            Err(StoreError::StaleState {
                current: ClaimState::Approved,
                operation: ClaimOperation::Edit,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn deleting_a_missing_claim_reports_not_found() {
        let repo = setup().await;
        let created = repo.create_claim(meal_claim()).await.expect("create");

        repo.delete_claim(&created.id).await.expect("delete");
        assert_eq!(repo.find_claim(&created.id).await.expect("find"), None);
        assert!(matches!(
            repo.delete_claim(&created.id).await,
            Err(StoreError::NotFound { entity: "claim", .. })
        ));
    }
}
