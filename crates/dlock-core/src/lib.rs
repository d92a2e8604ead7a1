//! dlock Core - distributed mutual exclusion over a coordination service
//!
//! This crate provides:
//! - Claim-node naming and sequence ordering
//! - Watch bindings that never outlive-reference their lock
//! - `DistributedLock`: the acquire / wait / re-check / release state machine
//! - `ScopedLockHandle`: acquire on construction, release on every exit path

pub mod config;
pub mod error;
pub mod lock;
pub mod metrics;

pub use config::LockConfig;
pub use error::LockError;

// Re-export lock types
pub use lock::{
    ClaimNode, DistributedLock, LockSignal, LockState, ScopedLockHandle, WatchBinding,
};
