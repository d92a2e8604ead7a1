//! Distributed lock over ephemeral sequential claim nodes
//!
//! This module provides:
//! - Claim node data model and lock state
//! - Sequence ordering of competing claims
//! - Weak watch bindings for change notifications
//! - The acquire / release state machine
//! - A scoped handle releasing on every exit path

mod guard;
mod model;
pub mod ordering;
mod service;
mod watch;

pub use guard::ScopedLockHandle;
pub use model::*;
pub use service::DistributedLock;
pub use watch::{LockSignal, WatchBinding};
