//! Watch notifications

use serde::{Deserialize, Serialize};

/// What kind of change triggered a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEventKind {
    /// A child of the watched node was created or deleted
    ChildrenChanged,
    /// The watched node itself was deleted
    NodeDeleted,
}

/// A single watch firing. Carries no detail about which child changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEvent {
    /// The watched node
    pub path: String,
    pub kind: WatchEventKind,
}

impl WatchedEvent {
    pub fn children_changed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::ChildrenChanged,
        }
    }

    pub fn node_deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: WatchEventKind::NodeDeleted,
        }
    }
}

/// One-shot watch callback.
///
/// Invoked at most once, from the coordination service's event-delivery
/// thread, at an arbitrary time after registration.
pub type Watcher = Box<dyn FnOnce(WatchedEvent) + Send + 'static>;
