//! Caller verification in front of the lease API.
//!
//! The verified caller is recorded on leases and in logs for audit only; it
//! never influences which identity is selected or who may release it.

use serde::Serialize;
use std::fmt;

/// Environment variable holding the shared API key
pub const API_KEY_ENV: &str = "USERPOOL_API_KEY";

/// Name of an authenticated caller (a test runner, a CI job).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Caller(String);

impl Caller {
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn anonymous() -> Self {
        Self::new(Self::ANONYMOUS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Invalid bearer token")]
    InvalidToken,
}

/// Verifies callers before they may touch leases.
pub trait AuthGateway: Send + Sync {
    /// `bearer` is the presented credential, `claimed_name` an optional
    /// self-reported caller name used for audit.
    fn verify(&self, bearer: Option<&str>, claimed_name: Option<&str>) -> Result<Caller, AuthError>;
}

/// Single shared API key. Without a key every request is accepted (dev mode).
#[derive(Debug, Clone, Default)]
pub struct ApiKeyGateway {
    key: Option<String>,
}

impl ApiKeyGateway {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var(API_KEY_ENV).ok())
    }

    pub fn is_open(&self) -> bool {
        self.key.is_none()
    }
}

impl AuthGateway for ApiKeyGateway {
    fn verify(&self, bearer: Option<&str>, claimed_name: Option<&str>) -> Result<Caller, AuthError> {
        if let Some(expected) = &self.key {
            match bearer {
                None | Some("") => return Err(AuthError::MissingToken),
                Some(token) if token != expected => return Err(AuthError::InvalidToken),
                Some(_) => {}
            }
        }

        Ok(match claimed_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Caller::new(name),
            None => Caller::anonymous(),
        })
    }
}
