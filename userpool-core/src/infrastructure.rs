use crate::error::StoreError;
use crate::types::{Criteria, Identity, IdentityId, LockState};

/// Contract for identity record backends.
///
/// The store is the single source of truth for lock state. Every state change
/// goes through [`IdentityStore::compare_and_set_state`], which must read and
/// write one identity's row with no other writer touching that row in between.
/// Implementations must not serialize operations on unrelated identities.
pub trait IdentityStore: Send + Sync {
    /// Provision a new identity. Fails with `Duplicate` if the login is taken.
    fn insert(&self, identity: Identity) -> Result<(), StoreError>;

    fn get(&self, id: &IdentityId) -> Result<Option<Identity>, StoreError>;

    /// The free identity matching `criteria` that has been free the longest
    /// (ties broken by id), or `None`.
    fn find_one_free_matching(&self, criteria: &Criteria) -> Result<Option<Identity>, StoreError>;

    /// Atomically replace the lock state of `id` with `new` if it currently
    /// equals `expected`. `at` is the transition time; a transition into
    /// `Free` records it as the identity's `free_since`.
    ///
    /// Returns `false` if the identity is missing or its state differs.
    fn compare_and_set_state(
        &self,
        id: &IdentityId,
        expected: &LockState,
        new: &LockState,
        at: u64,
    ) -> Result<bool, StoreError>;

    /// Snapshot of identities matching `criteria`, ordered by id.
    fn list(&self, criteria: &Criteria) -> Result<Vec<Identity>, StoreError>;

    /// Locked identities whose `locked_at` is strictly before `cutoff`.
    fn list_locked_before(&self, cutoff: u64) -> Result<Vec<Identity>, StoreError>;
}
