//! Coordination client contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoordinationError;
use crate::watch::Watcher;

/// Identifier of a client session with the coordination service.
pub type SessionId = u64;

/// CreateMode determines how a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// The node survives the creating session.
    Persistent,
    /// The node is deleted when the creating session ends.
    Ephemeral,
    /// Persistent, and the name is suffixed with the parent's next sequence number.
    PersistentSequential,
    /// Ephemeral, and the name is suffixed with the parent's next sequence number.
    EphemeralSequential,
}

impl CreateMode {
    pub fn new(ephemeral: bool, sequential: bool) -> Self {
        match (ephemeral, sequential) {
            (false, false) => Self::Persistent,
            (true, false) => Self::Ephemeral,
            (false, true) => Self::PersistentSequential,
            (true, true) => Self::EphemeralSequential,
        }
    }

    pub fn is_ephemeral(self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(self, Self::PersistentSequential | Self::EphemeralSequential)
    }
}

/// Operations the lock protocol needs from a coordination service session.
///
/// Implementations own their event delivery: watchers are invoked from the
/// service's own thread, never from inside one of these calls.
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Session this client operates under
    fn session_id(&self) -> SessionId;

    /// Create a node, returning the actual path (with the sequence suffix
    /// for sequential modes).
    async fn create_node(&self, path: &str, mode: CreateMode) -> Result<String, CoordinationError>;

    /// List the names (not full paths) of a node's children
    async fn list_children(&self, path: &str) -> Result<Vec<String>, CoordinationError>;

    /// List a node's children and register a one-shot watch on them in the
    /// same request, so no change between the two can go unnoticed.
    async fn list_children_and_watch(
        &self,
        path: &str,
        watcher: Watcher,
    ) -> Result<Vec<String>, CoordinationError>;

    /// Delete a node
    async fn delete_node(&self, path: &str) -> Result<(), CoordinationError>;
}
