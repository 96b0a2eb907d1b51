use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::{info, warn};

use claimdesk_core::domain::claim::{
    ClaimId, ClaimOperation, ClaimTransition, ExpenseClaim, NewClaim,
};
use claimdesk_core::store::{ClaimStore, StoreError};

use crate::client::ApiClient;
use crate::wire::{ClaimDto, NewClaimDto, RejectDto, UpdateClaimDto};

const CLAIMS: &str = "gastos";
const ENTITY: &str = "claim";

/// [`ClaimStore`] backed by the `/gastos` endpoints.
///
/// The collaborator owns id assignment and the stored amount; whatever it returns wins over
/// the value computed locally.
#[derive(Clone, Debug)]
pub struct HttpClaimStore {
    client: ApiClient,
}

impl HttpClaimStore {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl ClaimStore for HttpClaimStore {
    async fn list_claims(&self) -> Result<Vec<ExpenseClaim>, StoreError> {
        let payload: Vec<ClaimDto> = self.client.get(ENTITY, &[CLAIMS]).await?;
        payload.into_iter().map(ClaimDto::into_domain).collect()
    }

    async fn find_claim(&self, id: &ClaimId) -> Result<Option<ExpenseClaim>, StoreError> {
        match self.client.get::<ClaimDto>(ENTITY, &[CLAIMS, id.0.as_str()]).await {
            Ok(dto) => dto.into_domain().map(Some),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn create_claim(&self, claim: NewClaim) -> Result<ExpenseClaim, StoreError> {
        let body = NewClaimDto::from(&claim);
        let created: ClaimDto =
            self.client.send_json(Method::POST, ENTITY, &[CLAIMS], &body).await?;
        let created = created.into_domain()?;

        if created.amount != claim.amount {
            info!(
                event_name = "remote.claim_amount_adjusted",
                claim_id = %created.id,
                category = %created.category,
                local_amount = %claim.amount,
                stored_amount = %created.amount,
                "collaborator stored a different amount than computed locally"
            );
        }
        Ok(created)
    }

    async fn update_claim(&self, claim: &ExpenseClaim) -> Result<ExpenseClaim, StoreError> {
        let body = UpdateClaimDto::from(claim);
        let updated: ClaimDto =
            self.client.send_json(Method::PUT, ENTITY, &[CLAIMS, claim.id.0.as_str()], &body).await?;
        updated.into_domain()
    }

    async fn apply_transition(
        &self,
        claim: &ExpenseClaim,
        transition: &ClaimTransition,
    ) -> Result<ExpenseClaim, StoreError> {
        let id = claim.id.0.as_str();
        let stored: ClaimDto = match transition.operation {
            ClaimOperation::Approve => {
                self.client
                    .send_json(Method::PATCH, ENTITY, &[CLAIMS, id, "aprobar"], &json!({}))
                    .await?
            }
            ClaimOperation::Reject => {
                let body = RejectDto { reason: transition.reason.clone().unwrap_or_default() };
                self.client.send_json(Method::PATCH, ENTITY, &[CLAIMS, id, "rechazar"], &body).await?
            }
            ClaimOperation::MarkPaid => {
                self.client
                    .send_json(Method::PATCH, ENTITY, &[CLAIMS, id, "pagar"], &json!({}))
                    .await?
            }
            other => {
                return Err(StoreError::Backend(format!(
                    "`{other}` is not a lifecycle transition"
                )));
            }
        };

        let stored = stored.into_domain()?;
        if stored.state != transition.to {
            warn!(
                event_name = "remote.transition_mismatch",
                claim_id = %stored.id,
                expected = %transition.to,
                actual = %stored.state,
                "collaborator reported an unexpected state after the transition"
            );
            return Err(StoreError::Backend(format!(
                "claim `{}` is {} after {}, expected {}",
                stored.id, stored.state, transition.operation, transition.to
            )));
        }
        Ok(stored)
    }

    async fn delete_claim(&self, id: &ClaimId) -> Result<(), StoreError> {
        self.client.delete(ENTITY, &[CLAIMS, id.0.as_str()]).await
    }
}
