//! dlock Coordination - in-memory coordination service
//!
//! A single-process stand-in for a ZooKeeper-style service:
//! - hierarchical nodes with persistent / ephemeral / sequential modes
//! - client sessions whose ephemeral nodes vanish when the session ends
//! - one-shot child watches delivered from a dedicated event thread

mod config;
mod service;
mod session;
mod tree;

pub use config::MemoryServiceConfig;
pub use service::MemoryCoordinationService;
pub use session::MemorySession;
