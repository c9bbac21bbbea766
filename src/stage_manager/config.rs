use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Requests queued behind the one in flight.
    pub queue_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { queue_capacity: 32 }
    }
}
