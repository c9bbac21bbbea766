use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wait after arrival for mechanical vibration to decay.
    pub settle_ms: u64,
    pub readings_to_average: usize,
    pub measurement_timeout_ms: u64,
    pub sample_buffer: usize,
}

impl SessionConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn measurement_timeout(&self) -> Duration {
        Duration::from_millis(self.measurement_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_ms: 1_000,
            readings_to_average: 100,
            measurement_timeout_ms: 10_000,
            sample_buffer: 256,
        }
    }
}
