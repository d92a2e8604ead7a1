//! Lock configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-lock settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Give up on `acquire` after this many milliseconds (None = wait forever)
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

impl LockConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}
