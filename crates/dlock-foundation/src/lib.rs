//! dlock Foundation - coordination service contract
//!
//! This crate provides:
//! - `CoordinationClient`: the operations the lock protocol consumes
//! - `CreateMode`: persistence and sequencing flags for node creation
//! - `WatchedEvent` / `Watcher`: one-shot change notifications
//! - `CoordinationError`: service-side failures

pub mod client;
pub mod error;
pub mod path;
pub mod watch;

pub use client::{CoordinationClient, CreateMode, SessionId};
pub use error::CoordinationError;
pub use watch::{WatchEventKind, WatchedEvent, Watcher};
