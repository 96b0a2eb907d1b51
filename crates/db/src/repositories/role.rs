use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use claimdesk_core::domain::role::{RoleDefinition, RoleId};
use claimdesk_core::permissions::parse_permission_keys;
use claimdesk_core::store::{RoleStore, StoreError};

use super::{decode_err, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Assigned-actor count is derived on read: an actor counts toward its explicit `role_id`,
/// or toward the system role of its coarse role when none is set.
const ROLE_SELECT: &str = "SELECT r.id, r.name, r.description, r.level, r.permissions_json,
            r.is_system_role, r.created_at, r.updated_at,
            (SELECT COUNT(*) FROM actor a WHERE COALESCE(a.role_id, a.role) = r.id)
                AS assigned_actor_count
     FROM role r";

pub struct SqlRoleRepository {
    pool: DbPool,
}

impl SqlRoleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &RoleId) -> Result<Option<RoleDefinition>, RepositoryError> {
        let row = sqlx::query(&format!("{ROLE_SELECT} WHERE r.id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_role).transpose()
    }
}

fn row_to_role(row: &SqliteRow) -> Result<RoleDefinition, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let name: String = row.try_get("name").map_err(decode_err)?;
    let description: String = row.try_get("description").map_err(decode_err)?;
    let level: i64 = row.try_get("level").map_err(decode_err)?;
    let permissions_json: String = row.try_get("permissions_json").map_err(decode_err)?;
    let is_system_role: bool = row.try_get("is_system_role").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;
    let assigned: i64 = row.try_get("assigned_actor_count").map_err(decode_err)?;

    let keys: Vec<String> = serde_json::from_str(&permissions_json).map_err(decode_err)?;

    Ok(RoleDefinition {
        id: RoleId(id),
        name,
        description,
        level: u8::try_from(level).map_err(decode_err)?,
        permissions: parse_permission_keys(&keys).map_err(decode_err)?,
        is_system_role,
        assigned_actor_count: u32::try_from(assigned).map_err(decode_err)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn permissions_json(role: &RoleDefinition) -> Result<String, RepositoryError> {
    let keys: Vec<&str> = role.permissions.iter().map(|permission| permission.key()).collect();
    serde_json::to_string(&keys).map_err(decode_err)
}

#[async_trait::async_trait]
impl RoleStore for SqlRoleRepository {
    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, StoreError> {
        let rows = sqlx::query(&format!("{ROLE_SELECT} ORDER BY r.level DESC, r.name ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(row_to_role).collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_role(&self, id: &RoleId) -> Result<Option<RoleDefinition>, StoreError> {
        Ok(self.fetch(id).await?)
    }

    async fn insert_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError> {
        sqlx::query(
            "INSERT INTO role (id, name, description, level, permissions_json, is_system_role,
                               created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&role.id.0)
        .bind(&role.name)
        .bind(&role.description)
        .bind(i64::from(role.level))
        .bind(permissions_json(&role)?)
        .bind(role.is_system_role)
        .bind(role.created_at.to_rfc3339())
        .bind(role.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        self.fetch(&role.id).await?.ok_or_else(|| StoreError::not_found("role", role.id.0.clone()))
    }

    async fn update_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError> {
        let result = sqlx::query(
            "UPDATE role SET name = ?, description = ?, level = ?, permissions_json = ?,
                             updated_at = ?
             WHERE id = ?",
        )
        .bind(&role.name)
        .bind(&role.description)
        .bind(i64::from(role.level))
        .bind(permissions_json(&role)?)
        .bind(role.updated_at.to_rfc3339())
        .bind(&role.id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("role", role.id.0.clone()));
        }
        self.fetch(&role.id).await?.ok_or_else(|| StoreError::not_found("role", role.id.0.clone()))
    }

    async fn delete_role(&self, id: &RoleId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM role
             WHERE id = ?
               AND NOT EXISTS (SELECT 1 FROM actor a WHERE COALESCE(a.role_id, a.role) = role.id)",
        )
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return match self.fetch(id).await? {
                Some(role) => {
                    Err(StoreError::RoleInUse { role: role.id, assigned: role.assigned_actor_count })
                }
                None => Err(StoreError::not_found("role", id.0.clone())),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use claimdesk_core::domain::actor::{Actor, ActorId, ActorRecord, ActorRole};
    use claimdesk_core::domain::role::RoleId;
    use claimdesk_core::permissions::{system_roles, Permission};
    use claimdesk_core::store::{ActorDirectory, RoleStore, StoreError};

    use super::SqlRoleRepository;
    use crate::repositories::SqlActorRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn assigned_counts_follow_explicit_and_implicit_roles() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let roles = SqlRoleRepository::new(pool.clone());
        let actors = SqlActorRepository::new(pool);

        for role in system_roles(Utc::now()) {
            roles.insert_role(role).await.expect("insert system role");
        }
        for (id, role) in [("emp-1", ActorRole::Employee), ("emp-2", ActorRole::Employee)] {
            actors
                .save_actor(ActorRecord {
                    actor: Actor::new(id, role),
                    display_name: id.to_string(),
                    email: format!("{id}@example.com"),
                    active: true,
                })
                .await
                .expect("save actor");
        }
        actors
            .save_actor(ActorRecord {
                actor: Actor::new("emp-3", ActorRole::Employee)
                    .with_role_id(RoleId("accounting".to_string())),
                display_name: "emp-3".to_string(),
                email: "emp-3@example.com".to_string(),
                active: true,
            })
            .await
            .expect("save actor");

        let employee = roles
            .find_role(&RoleId("employee".to_string()))
            .await
            .expect("find")
            .expect("employee role");
        let accounting = roles
            .find_role(&RoleId("accounting".to_string()))
            .await
            .expect("find")
            .expect("accounting role");

        assert_eq!(employee.assigned_actor_count, 2);
        assert_eq!(accounting.assigned_actor_count, 1);
        assert!(accounting.grants(Permission::ClaimsProcessPayments));
    }

    #[tokio::test]
    async fn listing_orders_by_level_then_name() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let roles = SqlRoleRepository::new(pool);
        for role in system_roles(Utc::now()) {
            roles.insert_role(role).await.expect("insert");
        }

        let ids: Vec<String> =
            roles.list_roles().await.expect("list").into_iter().map(|role| role.id.0).collect();
        assert_eq!(ids, vec!["administrator", "accounting", "supervisor", "employee"]);
    }

    #[tokio::test]
    async fn delete_is_refused_while_an_actor_holds_the_role() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let roles = SqlRoleRepository::new(pool.clone());
        let actors = SqlActorRepository::new(pool);

        let mut custom = system_roles(Utc::now()).remove(0);
        custom.id = RoleId("regional-lead".to_string());
        custom.name = "Regional Lead".to_string();
        custom.is_system_role = false;
        roles.insert_role(custom).await.expect("insert custom role");
        actors
            .save_actor(ActorRecord {
                actor: Actor::new("sup-9", ActorRole::Supervisor)
                    .with_role_id(RoleId("regional-lead".to_string())),
                display_name: "sup-9".to_string(),
                email: "sup-9@example.com".to_string(),
                active: true,
            })
            .await
            .expect("save actor");

        let refused = roles.delete_role(&RoleId("regional-lead".to_string())).await;
        assert_eq!(
            refused,
            Err(StoreError::RoleInUse { role: RoleId("regional-lead".to_string()), assigned: 1 })
        );

        actors.delete_actor(&ActorId("sup-9".to_string())).await.expect("delete actor");
        roles.delete_role(&RoleId("regional-lead".to_string())).await.expect("delete role");
        assert_eq!(
            roles.delete_role(&RoleId("regional-lead".to_string())).await,
            Err(StoreError::not_found("role", "regional-lead"))
        );
    }
}
