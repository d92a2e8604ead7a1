//! Lock error types

use std::time::Duration;

use dlock_foundation::CoordinationError;

/// Errors raised by the lock protocol
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("failed to create claim node under '{path}': {source}")]
    Create {
        path: String,
        #[source]
        source: CoordinationError,
    },

    #[error("failed to list children of '{path}': {source}")]
    List {
        path: String,
        #[source]
        source: CoordinationError,
    },

    /// Non-fatal: the claim node is ephemeral and goes away with its session
    #[error("failed to delete claim node '{path}': {source}")]
    Delete {
        path: String,
        #[source]
        source: CoordinationError,
    },

    #[error("malformed claim node name '{0}'")]
    MalformedNodeName(String),

    #[error("timed out after {waited:?} waiting for lock '{path}'")]
    Timeout { path: String, waited: Duration },

    #[error("invalid claim identity '{0}': must be non-empty and must not contain '/'")]
    InvalidIdentity(String),

    #[error("claim node '{0}' disappeared before the lock was acquired")]
    ClaimLost(String),

    #[error("lock has been released; create a new lock to acquire again")]
    AlreadyReleased,

    #[error("lock is claimed under '{claimed}', cannot acquire '{requested}'")]
    PathMismatch { claimed: String, requested: String },

    #[error("lock is claimed by '{claimed}', cannot acquire as '{requested}'")]
    IdentityMismatch { claimed: String, requested: String },
}

impl LockError {
    /// Errors that leave the lock in a usable or self-healing state
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Delete { .. } | Self::MalformedNodeName(_))
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::List { .. } => "list",
            Self::Delete { .. } => "delete",
            Self::MalformedNodeName(_) => "malformed_node_name",
            Self::Timeout { .. } => "timeout",
            Self::InvalidIdentity(_) => "invalid_identity",
            Self::ClaimLost(_) => "claim_lost",
            Self::AlreadyReleased => "already_released",
            Self::PathMismatch { .. } => "path_mismatch",
            Self::IdentityMismatch { .. } => "identity_mismatch",
        }
    }
}
