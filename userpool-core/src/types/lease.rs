use serde::{Deserialize, Serialize};

use super::{HolderToken, Identity};

/// Lock states of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockState {
    /// Nobody holds the identity
    Free,
    /// Held by exactly one lease
    Locked {
        /// When the lease was granted (ms since epoch)
        locked_at: u64,
        holder_token: HolderToken,
        /// Caller name reported by the auth gateway, for audit only
        holder: String,
    },
}

impl LockState {
    pub const FREE: &'static str = "Free";
    pub const LOCKED: &'static str = "Locked";

    pub fn is_free(&self) -> bool {
        matches!(self, LockState::Free)
    }

    pub fn locked_at(&self) -> Option<u64> {
        match self {
            LockState::Free => None,
            LockState::Locked { locked_at, .. } => Some(*locked_at),
        }
    }

    pub fn holder_token(&self) -> Option<&HolderToken> {
        match self {
            LockState::Free => None,
            LockState::Locked { holder_token, .. } => Some(holder_token),
        }
    }

    pub fn holder(&self) -> Option<&str> {
        match self {
            LockState::Free => None,
            LockState::Locked { holder, .. } => Some(holder),
        }
    }

    /// Persisted label of the state column.
    pub fn label(&self) -> &'static str {
        match self {
            LockState::Free => Self::FREE,
            LockState::Locked { .. } => Self::LOCKED,
        }
    }
}

/// A successful acquire: the identity plus what the caller needs to give it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseGrant {
    pub identity: Identity,
    pub holder_token: HolderToken,
    pub locked_at: u64,
    /// Earliest moment after which the reclaimer may take the identity back
    pub expires_at: u64,
}
