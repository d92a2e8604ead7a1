//! Coordination service error types

/// Failures reported by a coordination service.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinationError {
    #[error("node '{0}' does not exist")]
    NoNode(String),

    #[error("node '{0}' already exists")]
    NodeExists(String),

    #[error("node '{0}' still has children")]
    NotEmpty(String),

    #[error("ephemeral node '{0}' cannot have children")]
    NoChildrenForEphemerals(String),

    #[error("invalid path '{0}'")]
    BadPath(String),

    #[error("session {0} has expired")]
    SessionExpired(u64),

    #[error("coordination service unavailable: {0}")]
    Unavailable(String),
}

impl CoordinationError {
    /// True when the error only says the target node is already gone.
    pub fn is_no_node(&self) -> bool {
        matches!(self, Self::NoNode(_))
    }
}
