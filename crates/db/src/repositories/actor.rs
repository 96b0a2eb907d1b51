use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use claimdesk_core::domain::actor::{Actor, ActorId, ActorRecord, ActorRole};
use claimdesk_core::domain::role::RoleId;
use claimdesk_core::store::{ActorDirectory, StoreError};

use super::{decode_err, RepositoryError};
use crate::DbPool;

pub struct SqlActorRepository {
    pool: DbPool,
}

impl SqlActorRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn supervision_map(&self) -> Result<HashMap<String, BTreeSet<ActorId>>, RepositoryError> {
        let rows = sqlx::query("SELECT supervisor_id, employee_id FROM actor_supervision")
            .fetch_all(&self.pool)
            .await?;

        let mut map: HashMap<String, BTreeSet<ActorId>> = HashMap::new();
        for row in rows {
            let supervisor: String = row.try_get("supervisor_id").map_err(decode_err)?;
            let employee: String = row.try_get("employee_id").map_err(decode_err)?;
            map.entry(supervisor).or_default().insert(ActorId(employee));
        }
        Ok(map)
    }
}

fn row_to_record(
    row: &SqliteRow,
    supervision: &mut HashMap<String, BTreeSet<ActorId>>,
) -> Result<ActorRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let display_name: String = row.try_get("display_name").map_err(decode_err)?;
    let email: String = row.try_get("email").map_err(decode_err)?;
    let role: String = row.try_get("role").map_err(decode_err)?;
    let role_id: Option<String> = row.try_get("role_id").map_err(decode_err)?;
    let active: bool = row.try_get("active").map_err(decode_err)?;

    let role: ActorRole = role.parse().map_err(decode_err)?;
    let supervisor_of = supervision.remove(&id).unwrap_or_default();

    Ok(ActorRecord {
        actor: Actor { id: ActorId(id), role, role_id: role_id.map(RoleId), supervisor_of },
        display_name,
        email,
        active,
    })
}

#[async_trait::async_trait]
impl ActorDirectory for SqlActorRepository {
    async fn list_actors(&self) -> Result<Vec<ActorRecord>, StoreError> {
        let mut supervision = self.supervision_map().await?;
        let rows = sqlx::query(
            "SELECT id, display_name, email, role, role_id, active FROM actor ORDER BY display_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows
            .iter()
            .map(|row| row_to_record(row, &mut supervision))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_actor(&self, id: &ActorId) -> Result<Option<ActorRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, display_name, email, role, role_id, active FROM actor WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut supervision = self.supervision_map().await?;
        Ok(Some(row_to_record(&row, &mut supervision)?))
    }

    async fn save_actor(&self, record: ActorRecord) -> Result<ActorRecord, StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        sqlx::query(
            "INSERT INTO actor (id, display_name, email, role, role_id, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 display_name = excluded.display_name,
                 email = excluded.email,
                 role = excluded.role,
                 role_id = excluded.role_id,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&record.actor.id.0)
        .bind(&record.display_name)
        .bind(&record.email)
        .bind(record.actor.role.as_str())
        .bind(record.actor.role_id.as_ref().map(|role| role.0.clone()))
        .bind(record.active)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        sqlx::query("DELETE FROM actor_supervision WHERE supervisor_id = ?")
            .bind(&record.actor.id.0)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

        for employee in &record.actor.supervisor_of {
            sqlx::query("INSERT INTO actor_supervision (supervisor_id, employee_id) VALUES (?, ?)")
                .bind(&record.actor.id.0)
                .bind(&employee.0)
                .execute(&mut *tx)
                .await
                .map_err(RepositoryError::from)?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(record)
    }

    async fn delete_actor(&self, id: &ActorId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM actor WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("actor", id.0.clone()));
        }
        Ok(())
    }
}
