//! High-level lease API that wraps the allocator, the reclaimer and a
//! pluggable identity store. The HTTP server delegates to this.

use std::sync::Arc;

use tracing::{info, warn};

use crate::allocator::Allocator;
use crate::auth::Caller;
use crate::clock::{Clock, SystemClock};
use crate::config::PoolConfig;
use crate::error::{LeaseError, StoreError};
use crate::infrastructure::IdentityStore;
use crate::infrastructure_in_memory::InMemoryIdentityStore;
use crate::reclaimer::{Reclaimer, ReclaimerHandle, SweepReport};
use crate::types::*;

/// The main entry point: acquire, release and list leases over one pool of
/// identities.
pub struct LeasePool {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    config: PoolConfig,
    allocator: Allocator,
    reclaimer: Reclaimer,
}

impl LeasePool {
    pub fn new(store: Arc<dyn IdentityStore>, config: PoolConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn IdentityStore>, config: PoolConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            allocator: Allocator::new(store.clone(), clock.clone(), config),
            reclaimer: Reclaimer::new(store.clone(), clock.clone(), config.lease_timeout),
            store,
            clock,
            config,
        }
    }

    /// A pool over an empty in-memory store. Leases do not survive restarts.
    pub fn in_memory(config: PoolConfig) -> Self {
        Self::new(Arc::new(InMemoryIdentityStore::new()), config)
    }

    /// A pool backed by SQLite at the given path.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite(path: &str, config: PoolConfig) -> Result<Self, StoreError> {
        let store = crate::infrastructure_sqlite::SqliteIdentityStore::open(path)?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Add a new, free identity to the pool.
    pub fn provision(&self, new: NewIdentity) -> Result<Identity, LeaseError> {
        let identity = Identity::provisioned(new, self.clock.now_ms());
        self.store.insert(identity.clone())?;
        info!(
            identity_id = %identity.id,
            login = %identity.login,
            env = %identity.env,
            domain = %identity.domain,
            "Identity provisioned"
        );
        Ok(identity)
    }

    /// Lease one free identity matching `criteria`. Never waits: an exhausted
    /// pool fails with `NoAvailableIdentity`.
    pub fn acquire(&self, criteria: &Criteria, caller: &Caller) -> Result<LeaseGrant, LeaseError> {
        match self.allocator.acquire(criteria, caller) {
            Ok(grant) => {
                info!(
                    identity_id = %grant.identity.id,
                    login = %grant.identity.login,
                    caller = %caller,
                    expires_at = grant.expires_at,
                    "Lease acquired"
                );
                Ok(grant)
            }
            Err(LeaseError::NoAvailableIdentity) => {
                info!(caller = %caller, ?criteria, "No available identity");
                Err(LeaseError::NoAvailableIdentity)
            }
            Err(e) => Err(e),
        }
    }

    /// Give a lease back. The token must be the one handed out by `acquire`.
    pub fn release(&self, id: &IdentityId, token: &HolderToken, caller: &Caller) -> Result<Identity, LeaseError> {
        match self.allocator.release(id, token) {
            Ok(identity) => {
                info!(identity_id = %id, caller = %caller, "Lease released");
                Ok(identity)
            }
            Err(e @ LeaseError::NotHeldByCaller { .. }) => {
                warn!(identity_id = %id, caller = %caller, "Release rejected: identity not held by caller");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn get(&self, id: &IdentityId) -> Result<Option<Identity>, LeaseError> {
        Ok(self.store.get(id)?)
    }

    /// Snapshot of identities and their lock states.
    pub fn list(&self, criteria: &Criteria) -> Result<Vec<Identity>, LeaseError> {
        Ok(self.store.list(criteria)?)
    }

    /// Run one reclaim sweep now.
    pub fn reclaim_expired(&self) -> SweepReport {
        self.reclaimer.sweep()
    }

    /// Start the periodic reclaimer at the configured interval.
    pub fn start_reclaimer(&self) -> ReclaimerHandle {
        self.reclaimer.clone().spawn(self.config.reclaim_interval)
    }
}
