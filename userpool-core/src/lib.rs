//! # userpool-core
//!
//! Lease-pool allocator for shared end-to-end test accounts.
//! Hands out exclusive, token-guarded leases on identities, releases them,
//! and reclaims leases whose holders disappeared.

pub mod allocator;
pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "sqlite")]
#[path = "infrastructure_sqlite.rs"]
pub mod infrastructure_sqlite;
pub mod ledger;
pub mod reclaimer;
pub mod types;

#[cfg(test)]
mod test_support;
