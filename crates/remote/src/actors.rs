use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use claimdesk_core::domain::actor::{ActorId, ActorRecord};
use claimdesk_core::store::{ActorDirectory, StoreError};

use crate::client::ApiClient;
use crate::wire::ActorDto;

const USERS: &str = "usuarios";
const ENTITY: &str = "actor";

/// [`ActorDirectory`] backed by the `/usuarios` endpoints.
#[derive(Clone, Debug)]
pub struct HttpActorDirectory {
    client: ApiClient,
}

impl HttpActorDirectory {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActorDirectory for HttpActorDirectory {
    async fn list_actors(&self) -> Result<Vec<ActorRecord>, StoreError> {
        let payload: Vec<ActorDto> = self.client.get(ENTITY, &[USERS]).await?;
        payload.into_iter().map(ActorDto::into_domain).collect()
    }

    async fn find_actor(&self, id: &ActorId) -> Result<Option<ActorRecord>, StoreError> {
        match self.client.get::<ActorDto>(ENTITY, &[USERS, id.0.as_str()]).await {
            Ok(dto) => dto.into_domain().map(Some),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn save_actor(&self, record: ActorRecord) -> Result<ActorRecord, StoreError> {
        let body = ActorDto::from(&record);
        let saved: Result<ActorDto, StoreError> = self
            .client
            .send_json(Method::PUT, ENTITY, &[USERS, record.actor.id.0.as_str()], &body)
            .await;

        let saved = match saved {
            Err(StoreError::NotFound { .. }) => {
                debug!(
                    event_name = "remote.actor_created",
                    actor_id = %record.actor.id,
                    "actor unknown to the collaborator; creating"
                );
                self.client.send_json(Method::POST, ENTITY, &[USERS], &body).await?
            }
            other => other?,
        };
        saved.into_domain()
    }

    async fn delete_actor(&self, id: &ActorId) -> Result<(), StoreError> {
        self.client.delete(ENTITY, &[USERS, id.0.as_str()]).await
    }
}
