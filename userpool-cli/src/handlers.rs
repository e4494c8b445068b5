use serde::{Deserialize, Serialize};

use userpool_core::types::{
    Criteria, DomainType, Environment, Identity, IdentityId, LeaseGrant, LockState, NewIdentity,
};

// ─── Validation Helpers ─────────────────────────────────────────────────────

fn required(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}

/// Builds selection criteria from optional textual filters.
pub fn build_criteria(
    env: Option<&str>,
    domain: Option<&str>,
    project_id: Option<&str>,
    identity_id: Option<&str>,
) -> Result<Criteria, String> {
    fn non_empty(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|v| !v.is_empty())
    }

    let mut criteria = Criteria::any();
    if let Some(env) = non_empty(env) {
        criteria = criteria.env(env.parse::<Environment>().map_err(|e| e.to_string())?);
    }
    if let Some(domain) = non_empty(domain) {
        criteria = criteria.domain(domain.parse::<DomainType>().map_err(|e| e.to_string())?);
    }
    if let Some(project_id) = non_empty(project_id) {
        criteria = criteria.project(project_id);
    }
    if let Some(id) = non_empty(identity_id) {
        criteria = criteria.identity(IdentityId::from(id));
    }
    Ok(criteria)
}

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct AcquireRequest {
    pub env: Option<String>,
    pub domain: Option<String>,
    pub project_id: Option<String>,
    pub identity_id: Option<String>,
}

impl AcquireRequest {
    pub fn criteria(&self) -> Result<Criteria, String> {
        build_criteria(
            self.env.as_deref(),
            self.domain.as_deref(),
            self.project_id.as_deref(),
            self.identity_id.as_deref(),
        )
    }
}

#[derive(Deserialize)]
pub struct ReleaseRequest {
    pub identity_id: String,
    pub holder_token: String,
}

impl ReleaseRequest {
    pub fn validate(&self) -> Result<(), String> {
        required("identity_id", &self.identity_id)?;
        required("holder_token", &self.holder_token)
    }
}

#[derive(Deserialize, Default)]
pub struct ListQuery {
    pub env: Option<String>,
    pub domain: Option<String>,
    pub project_id: Option<String>,
}

impl ListQuery {
    pub fn criteria(&self) -> Result<Criteria, String> {
        build_criteria(
            self.env.as_deref(),
            self.domain.as_deref(),
            self.project_id.as_deref(),
            None,
        )
    }
}

#[derive(Deserialize)]
pub struct ProvisionRequest {
    pub login: String,
    pub credential: String,
    pub project_id: String,
    pub env: String,
    pub domain: String,
}

impl ProvisionRequest {
    pub fn into_new_identity(self) -> Result<NewIdentity, String> {
        required("login", &self.login)?;
        required("credential", &self.credential)?;
        required("project_id", &self.project_id)?;
        Ok(NewIdentity {
            env: self.env.parse::<Environment>().map_err(|e| e.to_string())?,
            domain: self.domain.parse::<DomainType>().map_err(|e| e.to_string())?,
            login: self.login,
            credential: self.credential,
            project_id: self.project_id,
        })
    }
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            reason: None,
            error: None,
        }
    }

    pub fn err(reason: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            reason: Some(reason.into()),
            error: Some(msg.into()),
        }
    }
}

/// Lock state as shown to callers; never includes the holder token.
#[derive(Serialize)]
pub struct LockInfo {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl LockInfo {
    pub fn new(state: &LockState, lease_timeout_ms: u64) -> Self {
        match state {
            LockState::Free => Self {
                state: "free",
                locked_at: None,
                holder: None,
                expires_at: None,
            },
            LockState::Locked { locked_at, holder, .. } => Self {
                state: "locked",
                locked_at: Some(*locked_at),
                holder: Some(holder.clone()),
                expires_at: Some(locked_at.saturating_add(lease_timeout_ms)),
            },
        }
    }
}

/// Identity without its credential.
#[derive(Serialize)]
pub struct IdentityInfo {
    pub id: String,
    pub login: String,
    pub project_id: String,
    pub env: Environment,
    pub domain: DomainType,
    pub created_at: u64,
    pub lock_state: LockInfo,
}

impl IdentityInfo {
    pub fn new(identity: &Identity, lease_timeout_ms: u64) -> Self {
        Self {
            id: identity.id.to_string(),
            login: identity.login.clone(),
            project_id: identity.project_id.clone(),
            env: identity.env,
            domain: identity.domain,
            created_at: identity.created_at,
            lock_state: LockInfo::new(&identity.lock_state, lease_timeout_ms),
        }
    }
}

#[derive(Serialize)]
pub struct GrantResponse {
    pub identity: IdentityInfo,
    pub credential: String,
    pub holder_token: String,
    pub locked_at: u64,
    pub expires_at: u64,
}

impl GrantResponse {
    pub fn new(grant: &LeaseGrant, lease_timeout_ms: u64) -> Self {
        Self {
            identity: IdentityInfo::new(&grant.identity, lease_timeout_ms),
            credential: grant.identity.credential.clone(),
            holder_token: grant.holder_token.as_str().to_string(),
            locked_at: grant.locked_at,
            expires_at: grant.expires_at,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub free: usize,
    pub locked: usize,
    pub lease_timeout_secs: u64,
    pub version: String,
}
