use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use claimdesk_core::domain::actor::{ActorId, ActorRecord};
use claimdesk_core::domain::claim::{
    ClaimId, ClaimOperation, ClaimState, ClaimTransition, ExpenseClaim, NewClaim,
};
use claimdesk_core::domain::role::{RoleDefinition, RoleId};
use claimdesk_core::store::{ActorDirectory, ClaimStore, RoleStore, StoreError};

/// Claim store backed by a map. `with_latency` delays every call, which lets callers
/// exercise timeouts and overlapping transitions.
#[derive(Default)]
pub struct InMemoryClaimStore {
    claims: RwLock<BTreeMap<String, ExpenseClaim>>,
    transitions: RwLock<Vec<ClaimTransition>>,
    next_id: AtomicU64,
    latency: Option<Duration>,
}

impl InMemoryClaimStore {
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency), ..Self::default() }
    }

    /// Inserts a claim as-is, keeping its id and state.
    pub async fn insert(&self, claim: ExpenseClaim) {
        self.claims.write().await.insert(claim.id.0.clone(), claim);
    }

    pub async fn transitions(&self) -> Vec<ClaimTransition> {
        self.transitions.read().await.clone()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait::async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn list_claims(&self) -> Result<Vec<ExpenseClaim>, StoreError> {
        self.pause().await;
        Ok(self.claims.read().await.values().cloned().collect())
    }

    async fn find_claim(&self, id: &ClaimId) -> Result<Option<ExpenseClaim>, StoreError> {
        self.pause().await;
        Ok(self.claims.read().await.get(&id.0).cloned())
    }

    async fn create_claim(&self, claim: NewClaim) -> Result<ExpenseClaim, StoreError> {
        self.pause().await;
        let sequence = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let claim = claim.into_claim(ClaimId(format!("GST-{sequence:04}")));
        self.claims.write().await.insert(claim.id.0.clone(), claim.clone());
        Ok(claim)
    }

    async fn update_claim(&self, claim: &ExpenseClaim) -> Result<ExpenseClaim, StoreError> {
        self.pause().await;
        let mut claims = self.claims.write().await;
        let stored = claims
            .get_mut(&claim.id.0)
            .ok_or_else(|| StoreError::not_found("claim", claim.id.0.clone()))?;
        if stored.state != ClaimState::Pending {
            return Err(StoreError::StaleState {
                claim: stored.id.clone(),
                current: stored.state,
                operation: ClaimOperation::Edit,
            });
        }
        *stored = claim.clone();
        Ok(claim.clone())
    }

    async fn apply_transition(
        &self,
        claim: &ExpenseClaim,
        transition: &ClaimTransition,
    ) -> Result<ExpenseClaim, StoreError> {
        self.pause().await;
        let mut claims = self.claims.write().await;
        let stored = claims
            .get_mut(&claim.id.0)
            .ok_or_else(|| StoreError::not_found("claim", claim.id.0.clone()))?;
        if stored.state != transition.from {
            return Err(StoreError::StaleState {
                claim: stored.id.clone(),
                current: stored.state,
                operation: transition.operation,
            });
        }
        *stored = claim.clone();
        self.transitions.write().await.push(transition.clone());
        Ok(claim.clone())
    }

    async fn delete_claim(&self, id: &ClaimId) -> Result<(), StoreError> {
        self.pause().await;
        match self.claims.write().await.remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found("claim", id.0.clone())),
        }
    }
}

#[derive(Default)]
pub struct InMemoryActorDirectory {
    actors: RwLock<BTreeMap<String, ActorRecord>>,
}

impl InMemoryActorDirectory {
    pub async fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ActorRecord>,
    {
        let directory = Self::default();
        {
            let mut actors = directory.actors.write().await;
            for record in records {
                actors.insert(record.actor.id.0.clone(), record);
            }
        }
        directory
    }

    async fn count_assigned(&self, role: &RoleId) -> u32 {
        let actors = self.actors.read().await;
        let count =
            actors.values().filter(|record| &record.actor.effective_role_id() == role).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

#[async_trait::async_trait]
impl ActorDirectory for InMemoryActorDirectory {
    async fn list_actors(&self) -> Result<Vec<ActorRecord>, StoreError> {
        Ok(self.actors.read().await.values().cloned().collect())
    }

    async fn find_actor(&self, id: &ActorId) -> Result<Option<ActorRecord>, StoreError> {
        Ok(self.actors.read().await.get(&id.0).cloned())
    }

    async fn save_actor(&self, record: ActorRecord) -> Result<ActorRecord, StoreError> {
        self.actors.write().await.insert(record.actor.id.0.clone(), record.clone());
        Ok(record)
    }

    async fn delete_actor(&self, id: &ActorId) -> Result<(), StoreError> {
        match self.actors.write().await.remove(&id.0) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found("actor", id.0.clone())),
        }
    }
}

/// Role store backed by a map. When linked to an actor directory, assigned counts are
/// derived from it on every read; otherwise the stored count is returned unchanged.
#[derive(Default)]
pub struct InMemoryRoleStore {
    roles: RwLock<HashMap<String, RoleDefinition>>,
    actors: Option<Arc<InMemoryActorDirectory>>,
}

impl InMemoryRoleStore {
    pub async fn with_roles<I>(roles: I) -> Self
    where
        I: IntoIterator<Item = RoleDefinition>,
    {
        let store = Self::default();
        {
            let mut map = store.roles.write().await;
            for role in roles {
                map.insert(role.id.0.clone(), role);
            }
        }
        store
    }

    pub fn linked_to(mut self, actors: Arc<InMemoryActorDirectory>) -> Self {
        self.actors = Some(actors);
        self
    }

    async fn with_count(&self, mut role: RoleDefinition) -> RoleDefinition {
        if let Some(actors) = &self.actors {
            role.assigned_actor_count = actors.count_assigned(&role.id).await;
        }
        role
    }
}

#[async_trait::async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn list_roles(&self) -> Result<Vec<RoleDefinition>, StoreError> {
        let roles: Vec<RoleDefinition> = self.roles.read().await.values().cloned().collect();
        let mut counted = Vec::with_capacity(roles.len());
        for role in roles {
            counted.push(self.with_count(role).await);
        }
        Ok(counted)
    }

    async fn find_role(&self, id: &RoleId) -> Result<Option<RoleDefinition>, StoreError> {
        let role = self.roles.read().await.get(&id.0).cloned();
        match role {
            Some(role) => Ok(Some(self.with_count(role).await)),
            None => Ok(None),
        }
    }

    async fn insert_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError> {
        {
            let mut roles = self.roles.write().await;
            if roles.contains_key(&role.id.0) {
                return Err(StoreError::Backend(format!("role `{}` already exists", role.id)));
            }
            roles.insert(role.id.0.clone(), role.clone());
        }
        Ok(self.with_count(role).await)
    }

    async fn update_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError> {
        {
            let mut roles = self.roles.write().await;
            match roles.get_mut(&role.id.0) {
                Some(stored) => *stored = role.clone(),
                None => return Err(StoreError::not_found("role", role.id.0.clone())),
            }
        }
        Ok(self.with_count(role).await)
    }

    async fn delete_role(&self, id: &RoleId) -> Result<(), StoreError> {
        let mut roles = self.roles.write().await;
        if !roles.contains_key(&id.0) {
            return Err(StoreError::not_found("role", id.0.clone()));
        }
        // Held until the role is gone so no assignment can land in between.
        let directory = match &self.actors {
            Some(actors) => Some(actors.actors.read().await),
            None => None,
        };
        if let Some(directory) = &directory {
            let assigned = directory
                .values()
                .filter(|record| &record.actor.effective_role_id() == id)
                .count();
            if assigned > 0 {
                return Err(StoreError::RoleInUse {
                    role: id.clone(),
                    assigned: u32::try_from(assigned).unwrap_or(u32::MAX),
                });
            }
        }
        roles.remove(&id.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use claimdesk_core::domain::actor::{Actor, ActorId, ActorRecord, ActorRole};
    use claimdesk_core::domain::claim::{
        ClaimOperation, ClaimState, ClaimTransition, ExpenseCategory, NewClaim,
    };
    use claimdesk_core::domain::role::RoleId;
    use claimdesk_core::permissions::system_roles;
    use claimdesk_core::store::{ClaimStore, RoleStore, StoreError};

    use super::{InMemoryActorDirectory, InMemoryClaimStore, InMemoryRoleStore};

    fn new_claim() -> NewClaim {
        NewClaim {
            category: ExpenseCategory::Other,
            description: "Printer toner".to_string(),
            project: "OPS".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 2, 2).expect("date"),
            amount: Decimal::new(1999, 2),
            distance: None,
            rate_per_unit: None,
            attachment: None,
            created_by: ActorId("emp-1".to_string()),
            assigned_approver: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn claim_ids_are_sequential() {
        let store = InMemoryClaimStore::default();
        let first = store.create_claim(new_claim()).await.expect("create");
        let second = store.create_claim(new_claim()).await.expect("create");

        assert_eq!(first.id.0, "GST-0001");
        assert_eq!(second.id.0, "GST-0002");
        assert_eq!(store.list_claims().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn stale_transition_is_refused() {
        let store = InMemoryClaimStore::default();
        let mut claim = store.create_claim(new_claim()).await.expect("create");
        claim.state = ClaimState::Approved;
        let transition = ClaimTransition {
            claim_id: claim.id.clone(),
            from: ClaimState::Pending,
            to: ClaimState::Approved,
            operation: ClaimOperation::Approve,
            actor: ActorId("admin-1".to_string()),
            reason: None,
            occurred_at: Utc::now(),
        };

        store.apply_transition(&claim, &transition).await.expect("first transition");
        assert!(matches!(
            store.apply_transition(&claim, &transition).await,
            Err(StoreError::StaleState { current: ClaimState::Approved, .. })
        ));
        assert_eq!(store.transitions().await.len(), 1);
    }

    #[tokio::test]
    async fn edits_are_refused_once_a_claim_left_pending() {
        let store = InMemoryClaimStore::default();
        let mut claim = store.create_claim(new_claim()).await.expect("create");
        let mut approved = claim.clone();
        approved.state = ClaimState::Approved;
        let transition = ClaimTransition {
            claim_id: claim.id.clone(),
            from: ClaimState::Pending,
            to: ClaimState::Approved,
            operation: ClaimOperation::Approve,
            actor: ActorId("sup-1".to_string()),
            reason: None,
            occurred_at: Utc::now(),
        };
        store.apply_transition(&approved, &transition).await.expect("approve");

        claim.description = "Late edit".to_string();
        assert!(matches!(
            store.update_claim(&claim).await,
            Err(StoreError::StaleState {
                current: ClaimState::Approved,
                operation: ClaimOperation::Edit,
                ..
            })
        ));
        let stored = store.find_claim(&claim.id).await.expect("find").expect("claim");
        assert_eq!(stored.state, ClaimState::Approved);
        assert_eq!(stored.description, "Printer toner");
    }

    #[tokio::test]
    async fn linked_role_store_counts_assignments() {
        let actors = Arc::new(
            InMemoryActorDirectory::with_records([ActorRecord {
                actor: Actor::new("sup-1", ActorRole::Supervisor),
                display_name: "Sup".to_string(),
                email: "sup@example.com".to_string(),
                active: true,
            }])
            .await,
        );
        let roles = InMemoryRoleStore::with_roles(system_roles(Utc::now())).await.linked_to(actors);

        let supervisor = roles
            .find_role(&RoleId("supervisor".to_string()))
            .await
            .expect("find")
            .expect("supervisor");
        assert_eq!(supervisor.assigned_actor_count, 1);
    }

    #[tokio::test]
    async fn linked_role_store_refuses_deleting_an_assigned_role() {
        let actors = Arc::new(
            InMemoryActorDirectory::with_records([ActorRecord {
                actor: Actor::new("acct-1", ActorRole::Accounting),
                display_name: "Acct".to_string(),
                email: "acct@example.com".to_string(),
                active: true,
            }])
            .await,
        );
        let roles = InMemoryRoleStore::with_roles(system_roles(Utc::now())).await.linked_to(actors);

        assert_eq!(
            roles.delete_role(&RoleId("accounting".to_string())).await,
            Err(StoreError::RoleInUse { role: RoleId("accounting".to_string()), assigned: 1 })
        );
        roles.delete_role(&RoleId("employee".to_string())).await.expect("unassigned role");
        assert!(roles.find_role(&RoleId("employee".to_string())).await.expect("find").is_none());
    }
}
