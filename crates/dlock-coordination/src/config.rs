use serde::{Deserialize, Serialize};

/// Configuration of the in-memory coordination service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryServiceConfig {
    /// Zero-padded width of sequence suffixes (0 = no padding)
    #[serde(default = "default_sequence_width")]
    pub sequence_width: usize,
    /// Name of the event-delivery thread
    #[serde(default = "default_event_thread_name")]
    pub event_thread_name: String,
}

fn default_sequence_width() -> usize {
    10 // ZooKeeper's fixed width
}

fn default_event_thread_name() -> String {
    "coordination-events".to_string()
}

impl Default for MemoryServiceConfig {
    fn default() -> Self {
        Self {
            sequence_width: default_sequence_width(),
            event_thread_name: default_event_thread_name(),
        }
    }
}

impl MemoryServiceConfig {
    /// Sequence numbers rendered without padding ("9", "10", ...)
    pub fn unpadded() -> Self {
        Self {
            sequence_width: 0,
            ..Default::default()
        }
    }
}
