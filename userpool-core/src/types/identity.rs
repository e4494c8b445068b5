use serde::{Deserialize, Serialize};

use super::{DomainType, Environment, IdentityId, LockState};

/// One test account that at most one test run may hold at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub login: String,
    /// Secret the test runner logs in with
    pub credential: String,
    pub project_id: String,
    pub env: Environment,
    pub domain: DomainType,
    /// When the identity was provisioned (ms since epoch)
    pub created_at: u64,
    /// When the identity last became free; orders candidates for acquire
    pub free_since: u64,
    pub lock_state: LockState,
}

impl Identity {
    /// Builds a fresh, free identity from a provisioning request.
    pub fn provisioned(new: NewIdentity, now: u64) -> Self {
        Self {
            id: IdentityId::generate(),
            login: new.login,
            credential: new.credential,
            project_id: new.project_id,
            env: new.env,
            domain: new.domain,
            created_at: now,
            free_since: now,
            lock_state: LockState::Free,
        }
    }

    pub fn is_free(&self) -> bool {
        self.lock_state.is_free()
    }

    /// Oldest-free-first, ties broken by id.
    pub fn precedes(&self, other: &Identity) -> bool {
        (self.free_since, &self.id) < (other.free_since, &other.id)
    }
}

/// Attributes needed to provision an identity into the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIdentity {
    pub login: String,
    pub credential: String,
    pub project_id: String,
    pub env: Environment,
    pub domain: DomainType,
}
