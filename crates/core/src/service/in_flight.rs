use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::domain::claim::ClaimId;
use crate::errors::ConflictError;

/// Tracks claims with a mutation in progress. A second request for the same claim fails
/// fast until the guard of the first one is dropped.
#[derive(Clone, Debug, Default)]
pub struct InFlightClaims {
    active: Arc<Mutex<HashSet<ClaimId>>>,
}

impl InFlightClaims {
    pub fn try_acquire(&self, claim_id: &ClaimId) -> Result<InFlightGuard, ConflictError> {
        let inserted = match self.active.lock() {
            Ok(mut active) => active.insert(claim_id.clone()),
            Err(poisoned) => poisoned.into_inner().insert(claim_id.clone()),
        };
        if !inserted {
            return Err(ConflictError::TransitionInFlight { claim: claim_id.clone() });
        }
        Ok(InFlightGuard { active: Arc::clone(&self.active), claim_id: claim_id.clone() })
    }

    pub fn is_in_flight(&self, claim_id: &ClaimId) -> bool {
        match self.active.lock() {
            Ok(active) => active.contains(claim_id),
            Err(poisoned) => poisoned.into_inner().contains(claim_id),
        }
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<ClaimId>>>,
    claim_id: ClaimId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        match self.active.lock() {
            Ok(mut active) => active.remove(&self.claim_id),
            Err(poisoned) => poisoned.into_inner().remove(&self.claim_id),
        };
    }
}
