use std::sync::Arc;

use tracing::debug;

use crate::auth::Caller;
use crate::clock::Clock;
use crate::config::PoolConfig;
use crate::error::LeaseError;
use crate::infrastructure::IdentityStore;
use crate::ledger::Ledger;
use crate::types::{Criteria, HolderToken, Identity, IdentityId, LeaseGrant};

/// Hands out identities under exclusive leases.
///
/// Selection is oldest-free-first with ties broken by id. Each attempt reads
/// the best candidate and then compare-and-sets it from `Free` to `Locked`;
/// losing that race to another caller costs one attempt, never a wait.
pub struct Allocator {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    config: PoolConfig,
}

impl Allocator {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>, config: PoolConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn acquire(&self, criteria: &Criteria, holder: &Caller) -> Result<LeaseGrant, LeaseError> {
        if let Some(id) = &criteria.identity_id {
            if self.store.get(id)?.is_none() {
                return Err(LeaseError::NotFound { id: id.clone() });
            }
        }

        let lease_timeout_ms = self.config.lease_timeout_ms();
        for attempt in 1..=self.config.max_acquire_attempts {
            let Some(candidate) = self.store.find_one_free_matching(criteria)? else {
                return Err(LeaseError::NoAvailableIdentity);
            };

            let now = self.clock.now_ms();
            let token = HolderToken::generate();
            let Ok(next) = Ledger::acquire(&candidate.lock_state, now, token.clone(), holder.as_str()) else {
                continue;
            };

            if self
                .store
                .compare_and_set_state(&candidate.id, &candidate.lock_state, &next, now)?
            {
                return Ok(LeaseGrant {
                    identity: Identity {
                        lock_state: next,
                        ..candidate
                    },
                    holder_token: token,
                    locked_at: now,
                    expires_at: Ledger::expires_at(now, lease_timeout_ms),
                });
            }

            debug!(
                identity_id = %candidate.id,
                attempt,
                "Lost race for identity, retrying"
            );
        }

        debug!(
            attempts = self.config.max_acquire_attempts,
            "Acquire gave up after repeated conflicts"
        );
        Err(LeaseError::NoAvailableIdentity)
    }

    /// Returns the identity as it is after the release.
    pub fn release(&self, id: &IdentityId, token: &HolderToken) -> Result<Identity, LeaseError> {
        let Some(current) = self.store.get(id)? else {
            return Err(LeaseError::NotFound { id: id.clone() });
        };

        let next = Ledger::release(&current.lock_state, token)
            .map_err(|_| LeaseError::NotHeldByCaller { id: id.clone() })?;

        let now = self.clock.now_ms();
        if !self
            .store
            .compare_and_set_state(id, &current.lock_state, &next, now)?
        {
            // Reclaimed (or otherwise transitioned) between our read and write.
            return Err(LeaseError::NotHeldByCaller { id: id.clone() });
        }

        Ok(Identity {
            lock_state: next,
            free_since: now,
            ..current
        })
    }
}
