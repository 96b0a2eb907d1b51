use std::sync::Arc;
use std::time::Duration;

use claimdesk_core::audit::TracingAuditSink;
use claimdesk_core::config::{AppConfig, StoreBackend};
use claimdesk_core::permissions::RoleRegistry;
use claimdesk_core::service::ClaimService;
use claimdesk_core::store::{ActorDirectory, ClaimStore};
use claimdesk_db::{
    connect_with_config, migrations, DbPool, SqlActorRepository, SqlClaimRepository,
    SqlRoleRepository,
};
use claimdesk_remote::{ApiClient, HttpActorDirectory, HttpClaimStore};
use tracing::info;

use crate::commands::{Failure, EXIT_DB_CONNECTIVITY, EXIT_MIGRATION, EXIT_REMOTE_SETUP};

/// Services wired to the configured backend. The role registry always lives in the local
/// database; claims and actors follow `store.backend`.
pub struct Stores {
    pub pool: DbPool,
    pub service: ClaimService,
    pub registry: RoleRegistry,
}

impl Stores {
    pub async fn open(config: &AppConfig) -> Result<Self, Failure> {
        let pool = open_pool(config).await?;
        let roles = Arc::new(SqlRoleRepository::new(pool.clone()));

        let (claims, actors, timeout): (Arc<dyn ClaimStore>, Arc<dyn ActorDirectory>, Duration) =
            match config.store.backend {
                StoreBackend::Sqlite => (
                    Arc::new(SqlClaimRepository::new(pool.clone())),
                    Arc::new(SqlActorRepository::new(pool.clone())),
                    Duration::from_secs(config.database.timeout_secs),
                ),
                StoreBackend::Remote => {
                    let client = ApiClient::from_config(&config.api).map_err(|error| {
                        Failure::new("remote_setup", error.to_string(), EXIT_REMOTE_SETUP)
                    })?;
                    (
                        Arc::new(HttpClaimStore::new(client.clone())),
                        Arc::new(HttpActorDirectory::new(client)),
                        config.api.request_timeout(),
                    )
                }
            };

        info!(
            event_name = "cli.stores_opened",
            backend = ?config.store.backend,
            timeout_secs = timeout.as_secs(),
            "stores ready"
        );

        let service = ClaimService::new(claims, actors, roles.clone(), Arc::new(TracingAuditSink))
            .with_request_timeout(timeout);
        Ok(Self { pool, service, registry: RoleRegistry::new(roles) })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Connects and applies pending migrations.
pub async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| Failure::new("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| Failure::new("migration", error.to_string(), EXIT_MIGRATION))?;
    Ok(pool)
}
