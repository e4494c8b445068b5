use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Identity;

/// Deployment environment a test account lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Prod,
    Preprod,
    Stage,
}

impl Environment {
    const VALID: &'static str = "prod, preprod, stage";

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Preprod => "preprod",
            Environment::Stage => "stage",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ParseAttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prod" => Ok(Environment::Prod),
            "preprod" => Ok(Environment::Preprod),
            "stage" => Ok(Environment::Stage),
            _ => Err(ParseAttributeError::new("env", s, Self::VALID)),
        }
    }
}

/// Which kind of domain the account is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainType {
    Canary,
    Regular,
}

impl DomainType {
    const VALID: &'static str = "canary, regular";

    pub fn as_str(self) -> &'static str {
        match self {
            DomainType::Canary => "canary",
            DomainType::Regular => "regular",
        }
    }
}

impl fmt::Display for DomainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainType {
    type Err = ParseAttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "canary" => Ok(DomainType::Canary),
            "regular" => Ok(DomainType::Regular),
            _ => Err(ParseAttributeError::new("domain", s, Self::VALID)),
        }
    }
}

/// Returned when a textual attribute does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind} '{value}'. Must be one of: {expected}")]
pub struct ParseAttributeError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ParseAttributeError {
    pub fn new(kind: &'static str, value: impl Into<String>, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.into(),
            expected,
        }
    }
}

/// Opaque, store-assigned identifier of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn generate() -> Self {
        Self(nanoid::nanoid!())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IdentityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for IdentityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof of ownership handed out on acquire and required on release.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolderToken(String);

impl HolderToken {
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(32))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for HolderToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for HolderToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// Tokens grant release rights, keep them out of Debug output and logs.
impl fmt::Debug for HolderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HolderToken(..)")
    }
}

/// Selection filter for acquire and list. Absent fields match any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    pub env: Option<Environment>,
    pub domain: Option<DomainType>,
    pub project_id: Option<String>,
    /// Pin one specific identity.
    pub identity_id: Option<IdentityId>,
}

impl Criteria {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn env(mut self, env: Environment) -> Self {
        self.env = Some(env);
        self
    }

    pub fn domain(mut self, domain: DomainType) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn identity(mut self, id: IdentityId) -> Self {
        self.identity_id = Some(id);
        self
    }

    pub fn matches(&self, identity: &Identity) -> bool {
        self.env.is_none_or(|env| identity.env == env)
            && self.domain.is_none_or(|domain| identity.domain == domain)
            && self
                .project_id
                .as_deref()
                .is_none_or(|project| identity.project_id == project)
            && self
                .identity_id
                .as_ref()
                .is_none_or(|id| &identity.id == id)
    }
}
