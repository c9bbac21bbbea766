use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing policy of the controller state machine. All values in
/// milliseconds so the TOML stays readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerTiming {
    /// Pause between writing a frame and reading its reply.
    pub command_delay_ms: u64,
    /// How long to wait for a reply line.
    pub read_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub move_timeout_ms: u64,
    pub home_timeout_ms: u64,
    pub tolerance_poll_interval_ms: u64,
    pub tolerance_mm: f64,
    /// `None` polls until arrival with no deadline.
    pub tolerance_timeout_ms: Option<u64>,
}

impl ControllerTiming {
    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.move_timeout_ms)
    }

    pub fn home_timeout(&self) -> Duration {
        Duration::from_millis(self.home_timeout_ms)
    }

    pub fn tolerance_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tolerance_poll_interval_ms)
    }

    pub fn tolerance_timeout(&self) -> Option<Duration> {
        self.tolerance_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ControllerTiming {
    fn default() -> Self {
        Self {
            command_delay_ms: 20,
            read_timeout_ms: 100,
            poll_interval_ms: 100,
            move_timeout_ms: 30_000,
            home_timeout_ms: 60_000,
            tolerance_poll_interval_ms: 200,
            tolerance_mm: 0.005,
            tolerance_timeout_ms: Some(30_000),
        }
    }
}
