use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::error::StoreError;
use crate::infrastructure::IdentityStore;
use crate::types::{Criteria, Identity, IdentityId, LockState};

type Row = Arc<Mutex<Identity>>;

#[derive(Default)]
struct Index {
    rows: BTreeMap<IdentityId, Row>,
    logins: HashSet<String>,
}

/// Arena of identity rows, each guarded by its own mutex.
///
/// The index lock is only taken for writing when provisioning; lock state
/// transitions lock exactly one row.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    index: RwLock<Index>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, id: &IdentityId) -> Result<Option<Row>, StoreError> {
        let index = self.index.read().map_err(|_| StoreError::Poisoned)?;
        Ok(index.rows.get(id).cloned())
    }

    /// Clones the row handles so the index lock is released before any row is locked.
    fn rows(&self) -> Result<Vec<Row>, StoreError> {
        let index = self.index.read().map_err(|_| StoreError::Poisoned)?;
        Ok(index.rows.values().cloned().collect())
    }

    fn lock(row: &Row) -> Result<MutexGuard<'_, Identity>, StoreError> {
        row.lock().map_err(|_| StoreError::Poisoned)
    }

    fn collect(&self, mut keep: impl FnMut(&Identity) -> bool) -> Result<Vec<Identity>, StoreError> {
        let mut out = Vec::new();
        for row in self.rows()? {
            let identity = Self::lock(&row)?;
            if keep(&identity) {
                out.push(identity.clone());
            }
        }
        Ok(out)
    }
}

impl IdentityStore for InMemoryIdentityStore {
    fn insert(&self, identity: Identity) -> Result<(), StoreError> {
        let mut index = self.index.write().map_err(|_| StoreError::Poisoned)?;
        if !index.logins.insert(identity.login.clone()) {
            return Err(StoreError::Duplicate(identity.login));
        }
        index
            .rows
            .insert(identity.id.clone(), Arc::new(Mutex::new(identity)));
        Ok(())
    }

    fn get(&self, id: &IdentityId) -> Result<Option<Identity>, StoreError> {
        let Some(row) = self.row(id)? else {
            return Ok(None);
        };
        let identity = Self::lock(&row)?.clone();
        Ok(Some(identity))
    }

    fn find_one_free_matching(&self, criteria: &Criteria) -> Result<Option<Identity>, StoreError> {
        let candidates: Vec<Row> = match &criteria.identity_id {
            Some(id) => self.row(id)?.into_iter().collect(),
            None => self.rows()?,
        };

        let mut best: Option<Identity> = None;
        for row in candidates {
            let identity = Self::lock(&row)?;
            if !identity.is_free() || !criteria.matches(&identity) {
                continue;
            }
            if best.as_ref().is_none_or(|b| identity.precedes(b)) {
                best = Some(identity.clone());
            }
        }
        Ok(best)
    }

    fn compare_and_set_state(
        &self,
        id: &IdentityId,
        expected: &LockState,
        new: &LockState,
        at: u64,
    ) -> Result<bool, StoreError> {
        let Some(row) = self.row(id)? else {
            return Ok(false);
        };
        let mut identity = Self::lock(&row)?;
        if identity.lock_state != *expected {
            return Ok(false);
        }
        identity.lock_state = new.clone();
        if new.is_free() {
            identity.free_since = at;
        }
        Ok(true)
    }

    fn list(&self, criteria: &Criteria) -> Result<Vec<Identity>, StoreError> {
        self.collect(|identity| criteria.matches(identity))
    }

    fn list_locked_before(&self, cutoff: u64) -> Result<Vec<Identity>, StoreError> {
        self.collect(|identity| {
            identity
                .lock_state
                .locked_at()
                .is_some_and(|locked_at| locked_at < cutoff)
        })
    }
}
