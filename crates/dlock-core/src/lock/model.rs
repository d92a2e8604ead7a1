//! Claim node and lock state data model

use dlock_foundation::path;
use serde::{Deserialize, Serialize};

use super::ordering;
use crate::error::LockError;

/// An ephemeral sequential child of a lock path, named
/// `lock_<identity>_<sequence>`, representing one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimNode {
    /// Parent node of the protected resource
    pub lock_path: String,
    /// Node name under the lock path
    pub name: String,
    /// Identity embedded in the name
    pub identity: String,
    /// Sequence number assigned by the coordination service
    pub sequence: u64,
}

impl ClaimNode {
    /// Build from a child name listed under `lock_path`
    pub fn from_child(lock_path: &str, name: &str) -> Result<Self, LockError> {
        let parsed = ordering::parse_claim_name(name)?;
        Ok(Self {
            lock_path: lock_path.to_string(),
            name: name.to_string(),
            identity: parsed.identity.to_string(),
            sequence: parsed.sequence,
        })
    }

    /// Build from the full path returned by node creation
    pub fn from_path(full_path: &str) -> Result<Self, LockError> {
        let (lock_path, name) =
            path::split(full_path).ok_or_else(|| LockError::MalformedNodeName(full_path.to_string()))?;
        Self::from_child(lock_path, name)
    }

    /// Full path of the node
    pub fn path(&self) -> String {
        path::join(&self.lock_path, &self.name)
    }
}

impl std::fmt::Display for ClaimNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Lock state of one `DistributedLock` instance
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "claim", rename_all = "snake_case")]
pub enum LockState {
    /// No claim node yet
    #[default]
    Unclaimed,
    /// Claim node exists, waiting to become lowest
    Pending(ClaimNode),
    /// Claim node is the lowest sequence: lock is held
    Held(ClaimNode),
    /// Released; the instance cannot acquire again
    Released,
}

impl LockState {
    pub fn claim(&self) -> Option<&ClaimNode> {
        match self {
            Self::Pending(node) | Self::Held(node) => Some(node),
            Self::Unclaimed | Self::Released => None,
        }
    }

    /// True while a claim node exists on behalf of this lock
    pub fn is_claimed(&self) -> bool {
        self.claim().is_some()
    }

    pub fn is_held(&self) -> bool {
        matches!(self, Self::Held(_))
    }
}
