//! Pure state machine for an identity's lock state.
//!
//! `Free --acquire--> Locked`, `Locked --release(token)--> Free` and
//! `Locked --reclaim(expired)--> Free` are the only transitions. Stores never
//! compute transitions; they compare-and-set the states produced here.

use crate::types::{HolderToken, LockState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("identity is already locked")]
    AlreadyLocked,
    #[error("identity is not locked")]
    NotLocked,
    #[error("holder token does not match the lease")]
    TokenMismatch,
    #[error("lease has not exceeded its timeout")]
    NotExpired,
}

pub struct Ledger;

impl Ledger {
    pub fn acquire(
        current: &LockState,
        now: u64,
        holder_token: HolderToken,
        holder: &str,
    ) -> Result<LockState, TransitionError> {
        match current {
            LockState::Free => Ok(LockState::Locked {
                locked_at: now,
                holder_token,
                holder: holder.to_string(),
            }),
            LockState::Locked { .. } => Err(TransitionError::AlreadyLocked),
        }
    }

    pub fn release(current: &LockState, token: &HolderToken) -> Result<LockState, TransitionError> {
        match current {
            LockState::Free => Err(TransitionError::NotLocked),
            LockState::Locked { holder_token, .. } if holder_token == token => Ok(LockState::Free),
            LockState::Locked { .. } => Err(TransitionError::TokenMismatch),
        }
    }

    /// Forced release; ignores the token but requires the lease to be past its timeout.
    pub fn reclaim(current: &LockState, now: u64, lease_timeout_ms: u64) -> Result<LockState, TransitionError> {
        match current {
            LockState::Free => Err(TransitionError::NotLocked),
            LockState::Locked { locked_at, .. } if Self::is_expired(*locked_at, now, lease_timeout_ms) => {
                Ok(LockState::Free)
            }
            LockState::Locked { .. } => Err(TransitionError::NotExpired),
        }
    }

    pub fn is_expired(locked_at: u64, now: u64, lease_timeout_ms: u64) -> bool {
        now.saturating_sub(locked_at) > lease_timeout_ms
    }

    pub fn expires_at(locked_at: u64, lease_timeout_ms: u64) -> u64 {
        locked_at.saturating_add(lease_timeout_ms)
    }

    /// Leases locked strictly before this instant are expired at `now`.
    pub fn reclaim_cutoff(now: u64, lease_timeout_ms: u64) -> u64 {
        now.saturating_sub(lease_timeout_ms)
    }
}
