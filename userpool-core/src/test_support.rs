use std::sync::Arc;

use crate::clock::ManualClock;
use crate::infrastructure::IdentityStore;
use crate::types::{DomainType, Environment, Identity, NewIdentity};

pub fn new_identity(login: &str, env: Environment, domain: DomainType) -> NewIdentity {
    NewIdentity {
        login: login.to_string(),
        credential: format!("secret-{}", login),
        project_id: "project-a".to_string(),
        env,
        domain,
    }
}

/// Inserts a free identity provisioned at `now` and returns it.
pub fn seed(store: &dyn IdentityStore, login: &str, env: Environment, domain: DomainType, now: u64) -> Identity {
    let identity = Identity::provisioned(new_identity(login, env, domain), now);
    store.insert(identity.clone()).unwrap();
    identity
}

pub fn clock(start: u64) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start))
}
